use serde_json::Value as JsonValue;

use cubemerch_events::EventEnvelope;
use cubemerch_lanes::{Difficulty, LaneCategory, LaneEvent, LaneId, LaneState};

use super::cursors::{CursorDecision, ProjectionCursors};
use super::ProjectionError;
use crate::read_model::ReadModelStore;

pub const AGGREGATE_TYPE: &str = "lanes.lane";

/// Queryable lane row for the impact console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneReadModel {
    pub lane_id: LaneId,
    pub name: String,
    pub category: LaneCategory,
    pub impact_score: u8,
    pub state: LaneState,
    pub difficulty: Difficulty,
    pub views: u64,
    pub completions: u64,
}

#[derive(Debug)]
pub struct LanesProjection<S>
where
    S: ReadModelStore<LaneId, LaneReadModel>,
{
    store: S,
    cursors: ProjectionCursors,
}

impl<S> LanesProjection<S>
where
    S: ReadModelStore<LaneId, LaneReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, lane_id: &LaneId) -> Option<LaneReadModel> {
        self.store.get(lane_id)
    }

    /// Console view: optionally filtered by state, highest impact first.
    pub fn list(&self, state: Option<LaneState>) -> Vec<LaneReadModel> {
        let mut lanes: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|l| state.map_or(true, |s| l.state == s))
            .collect();
        lanes.sort_by(|a, b| b.impact_score.cmp(&a.impact_score));
        lanes
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        match self.cursors.check(aggregate_id, seq)? {
            CursorDecision::Skip => return Ok(()),
            CursorDecision::Apply => {}
        }

        let ev: LaneEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let lane_id = match &ev {
            LaneEvent::LaneCreated(e) => e.lane_id,
            LaneEvent::LaneStateChanged(e) => e.lane_id,
            LaneEvent::LaneMetricsRecorded(e) => e.lane_id,
        };
        if lane_id.0 != aggregate_id {
            return Err(ProjectionError::MismatchedStream(
                "event lane_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            LaneEvent::LaneCreated(e) => {
                self.store.upsert(
                    e.lane_id,
                    LaneReadModel {
                        lane_id: e.lane_id,
                        name: e.name,
                        category: e.category,
                        impact_score: e.impact_score,
                        state: LaneState::Ok,
                        difficulty: e.difficulty,
                        views: 0,
                        completions: 0,
                    },
                );
            }
            LaneEvent::LaneStateChanged(e) => {
                if let Some(mut rm) = self.store.get(&e.lane_id) {
                    rm.state = e.state;
                    self.store.upsert(e.lane_id, rm);
                }
            }
            LaneEvent::LaneMetricsRecorded(e) => {
                if let Some(mut rm) = self.store.get(&e.lane_id) {
                    rm.views += e.views;
                    rm.completions += e.completions;
                    self.store.upsert(e.lane_id, rm);
                }
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }
}
