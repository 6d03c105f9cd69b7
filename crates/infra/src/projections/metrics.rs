use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value as JsonValue;

use cubemerch_accounts::{AccountEvent, ActivityKind};
use cubemerch_events::EventEnvelope;
use cubemerch_redemption::RedemptionEvent;

use super::cursors::{CursorDecision, ProjectionCursors};
use super::ProjectionError;

/// One day of platform activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyMetrics {
    pub bursts: u64,
    pub wins: u64,
    pub purchases: u64,
    pub referrals: u64,
    pub redemptions: u64,
}

/// Summed totals over a date range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsTotals {
    pub bursts: u64,
    pub wins: u64,
    pub purchases: u64,
    pub referrals: u64,
    pub redemptions: u64,
}

/// Cross-aggregate projection feeding the admin metrics dashboard.
///
/// Folds account activity events and redemption requests into per-day
/// buckets keyed by business time; the route layer sums buckets at/after an
/// optional `since` date. Unlike the per-entity projections this view spans
/// every account and redemption stream, so it keeps its own bucket map
/// rather than a keyed read-model store.
#[derive(Debug, Default)]
pub struct PlatformMetricsProjection {
    buckets: RwLock<BTreeMap<NaiveDate, DailyMetrics>>,
    cursors: ProjectionCursors,
}

impl PlatformMetricsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn totals(&self, since: Option<NaiveDate>) -> MetricsTotals {
        let buckets = match self.buckets.read() {
            Ok(b) => b,
            Err(_) => return MetricsTotals::default(),
        };

        let mut totals = MetricsTotals::default();
        for (date, day) in buckets.iter() {
            if since.map_or(false, |s| *date < s) {
                continue;
            }
            totals.bursts += day.bursts;
            totals.wins += day.wins;
            totals.purchases += day.purchases;
            totals.referrals += day.referrals;
            totals.redemptions += day.redemptions;
        }
        totals
    }

    /// Per-day series (ascending by date) for dashboard charts.
    pub fn series(&self, since: Option<NaiveDate>) -> Vec<(NaiveDate, DailyMetrics)> {
        match self.buckets.read() {
            Ok(buckets) => buckets
                .iter()
                .filter(|(date, _)| since.map_or(true, |s| **date >= s))
                .map(|(date, day)| (*date, *day))
                .collect(),
            Err(_) => vec![],
        }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        match envelope.aggregate_type() {
            super::accounts::AGGREGATE_TYPE => self.apply_account(envelope),
            super::redemptions::AGGREGATE_TYPE => self.apply_redemption(envelope),
            _ => Ok(()),
        }
    }

    fn apply_account(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        match self.cursors.check(aggregate_id, seq)? {
            CursorDecision::Skip => return Ok(()),
            CursorDecision::Apply => {}
        }

        let ev: AccountEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        if let AccountEvent::ActivityRecorded(e) = &ev {
            let date = e.occurred_at.date_naive();
            if let Ok(mut buckets) = self.buckets.write() {
                let day = buckets.entry(date).or_default();
                match e.kind {
                    ActivityKind::Burst => day.bursts += 1,
                    ActivityKind::Win => day.wins += 1,
                    ActivityKind::Purchase => day.purchases += 1,
                    ActivityKind::Referral => day.referrals += 1,
                }
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    fn apply_redemption(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        match self.cursors.check(aggregate_id, seq)? {
            CursorDecision::Skip => return Ok(()),
            CursorDecision::Apply => {}
        }

        let ev: RedemptionEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        if let RedemptionEvent::RedemptionRequested(e) = &ev {
            let date = e.occurred_at.date_naive();
            if let Ok(mut buckets) = self.buckets.write() {
                buckets.entry(date).or_default().redemptions += 1;
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }
}
