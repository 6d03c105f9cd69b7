use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cubemerch_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use cubemerch_events::Event;

/// Lane identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaneId(pub AggregateId);

impl LaneId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LaneId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Learning-content category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneCategory {
    Programming,
    Frontend,
    Backend,
    Mobile,
    #[serde(rename = "AI/ML")]
    AiMl,
    DevOps,
    Design,
}

/// Curation state shown on the impact console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneState {
    Ok,
    Watchlist,
    Save,
    Archive,
}

impl core::str::FromStr for LaneState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(LaneState::Ok),
            "watchlist" => Ok(LaneState::Watchlist),
            "save" => Ok(LaneState::Save),
            "archive" => Ok(LaneState::Archive),
            other => Err(DomainError::validation(format!("unknown lane state '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

/// Aggregate root: Lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lane {
    id: LaneId,
    name: String,
    category: Option<LaneCategory>,
    impact_score: u8,
    state: LaneState,
    difficulty: Difficulty,
    views: u64,
    completions: u64,
    version: u64,
    created: bool,
}

impl Lane {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: LaneId) -> Self {
        Self {
            id,
            name: String::new(),
            category: None,
            impact_score: 0,
            state: LaneState::Ok,
            difficulty: Difficulty::Beginner,
            views: 0,
            completions: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LaneId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LaneState {
        self.state
    }

    pub fn impact_score(&self) -> u8 {
        self.impact_score
    }
}

impl AggregateRoot for Lane {
    type Id = LaneId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateLane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLane {
    pub lane_id: LaneId,
    pub name: String,
    pub category: LaneCategory,
    pub impact_score: u8,
    pub difficulty: Difficulty,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetLaneState.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLaneState {
    pub lane_id: LaneId,
    pub state: LaneState,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordLaneMetrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLaneMetrics {
    pub lane_id: LaneId,
    pub views: u64,
    pub completions: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaneCommand {
    CreateLane(CreateLane),
    SetLaneState(SetLaneState),
    RecordLaneMetrics(RecordLaneMetrics),
}

/// Event: LaneCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneCreated {
    pub lane_id: LaneId,
    pub name: String,
    pub category: LaneCategory,
    pub impact_score: u8,
    pub difficulty: Difficulty,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LaneStateChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneStateChanged {
    pub lane_id: LaneId,
    pub state: LaneState,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LaneMetricsRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneMetricsRecorded {
    pub lane_id: LaneId,
    pub views: u64,
    pub completions: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaneEvent {
    LaneCreated(LaneCreated),
    LaneStateChanged(LaneStateChanged),
    LaneMetricsRecorded(LaneMetricsRecorded),
}

impl Event for LaneEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LaneEvent::LaneCreated(_) => "lanes.lane.created",
            LaneEvent::LaneStateChanged(_) => "lanes.lane.state_changed",
            LaneEvent::LaneMetricsRecorded(_) => "lanes.lane.metrics_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LaneEvent::LaneCreated(e) => e.occurred_at,
            LaneEvent::LaneStateChanged(e) => e.occurred_at,
            LaneEvent::LaneMetricsRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Lane {
    type Command = LaneCommand;
    type Event = LaneEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LaneEvent::LaneCreated(e) => {
                self.id = e.lane_id;
                self.name = e.name.clone();
                self.category = Some(e.category);
                self.impact_score = e.impact_score;
                self.state = LaneState::Ok;
                self.difficulty = e.difficulty;
                self.created = true;
            }
            LaneEvent::LaneStateChanged(e) => {
                self.state = e.state;
            }
            LaneEvent::LaneMetricsRecorded(e) => {
                self.views += e.views;
                self.completions += e.completions;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LaneCommand::CreateLane(cmd) => self.handle_create(cmd),
            LaneCommand::SetLaneState(cmd) => self.handle_set_state(cmd),
            LaneCommand::RecordLaneMetrics(cmd) => self.handle_metrics(cmd),
        }
    }
}

impl Lane {
    fn ensure_lane_id(&self, lane_id: LaneId) -> Result<(), DomainError> {
        if self.id != lane_id {
            return Err(DomainError::invariant("lane_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateLane) -> Result<Vec<LaneEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("lane already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.impact_score > 100 {
            return Err(DomainError::validation("impact score must be within 0-100"));
        }

        Ok(vec![LaneEvent::LaneCreated(LaneCreated {
            lane_id: cmd.lane_id,
            name: cmd.name.clone(),
            category: cmd.category,
            impact_score: cmd.impact_score,
            difficulty: cmd.difficulty,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_state(&self, cmd: &SetLaneState) -> Result<Vec<LaneEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_lane_id(cmd.lane_id)?;

        if self.state == cmd.state {
            return Err(DomainError::conflict("lane is already in that state"));
        }

        Ok(vec![LaneEvent::LaneStateChanged(LaneStateChanged {
            lane_id: cmd.lane_id,
            state: cmd.state,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_metrics(&self, cmd: &RecordLaneMetrics) -> Result<Vec<LaneEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_lane_id(cmd.lane_id)?;

        Ok(vec![LaneEvent::LaneMetricsRecorded(LaneMetricsRecorded {
            lane_id: cmd.lane_id,
            views: cmd.views,
            completions: cmd.completions,
            occurred_at: cmd.occurred_at,
        })])
    }
}
