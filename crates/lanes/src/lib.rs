//! Content lanes domain module (event-sourced).
//!
//! Lanes are the learning-content tracks surfaced on the admin impact
//! console: each carries an impact score and a curation state.

pub mod lane;

pub use lane::{
    CreateLane, Difficulty, Lane, LaneCategory, LaneCommand, LaneCreated, LaneEvent, LaneId,
    LaneMetricsRecorded, LaneState, LaneStateChanged, RecordLaneMetrics, SetLaneState,
};
