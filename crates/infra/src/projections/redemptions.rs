use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use cubemerch_accounts::AccountId;
use cubemerch_catalog::ProductId;
use cubemerch_core::Credits;
use cubemerch_events::EventEnvelope;
use cubemerch_redemption::{RedemptionEvent, RedemptionId, RedemptionStatus, ShippingAddress};

use super::cursors::{CursorDecision, ProjectionCursors};
use super::ProjectionError;
use crate::read_model::ReadModelStore;

pub const AGGREGATE_TYPE: &str = "redemption.record";

/// Queryable redemption record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionReadModel {
    pub redemption_id: RedemptionId,
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub credits_used: Credits,
    pub cash_amount: Decimal,
    pub total_amount: Decimal,
    pub payment_reference: String,
    pub status: RedemptionStatus,
    pub shipping_address: ShippingAddress,
    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RedemptionsProjection<S>
where
    S: ReadModelStore<RedemptionId, RedemptionReadModel>,
{
    store: S,
    cursors: ProjectionCursors,
}

impl<S> RedemptionsProjection<S>
where
    S: ReadModelStore<RedemptionId, RedemptionReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, redemption_id: &RedemptionId) -> Option<RedemptionReadModel> {
        self.store.get(redemption_id)
    }

    pub fn list(&self) -> Vec<RedemptionReadModel> {
        self.store.list()
    }

    pub fn list_for_account(&self, account_id: AccountId) -> Vec<RedemptionReadModel> {
        self.store
            .list()
            .into_iter()
            .filter(|r| r.account_id == account_id)
            .collect()
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

        let ev: RedemptionEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let redemption_id = match &ev {
            RedemptionEvent::RedemptionRequested(e) => e.redemption_id,
            RedemptionEvent::RedemptionCompleted(e) => e.redemption_id,
            RedemptionEvent::RedemptionFailed(e) => e.redemption_id,
            RedemptionEvent::RedemptionRefunded(e) => e.redemption_id,
        };
        if redemption_id.0 != aggregate_id {
            return Err(ProjectionError::MismatchedStream(
                "event redemption_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            RedemptionEvent::RedemptionRequested(e) => {
                self.store.upsert(
                    e.redemption_id,
                    RedemptionReadModel {
                        redemption_id: e.redemption_id,
                        account_id: e.account_id,
                        product_id: e.product_id,
                        credits_used: e.credits_used,
                        cash_amount: e.cash_amount,
                        total_amount: e.total_amount,
                        payment_reference: e.payment_reference,
                        status: RedemptionStatus::Pending,
                        shipping_address: e.shipping_address,
                        requested_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            RedemptionEvent::RedemptionCompleted(e) => {
                if let Some(mut rm) = self.store.get(&e.redemption_id) {
                    rm.status = RedemptionStatus::Completed;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.redemption_id, rm);
                }
            }
            RedemptionEvent::RedemptionFailed(e) => {
                if let Some(mut rm) = self.store.get(&e.redemption_id) {
                    rm.status = RedemptionStatus::Failed;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.redemption_id, rm);
                }
            }
            RedemptionEvent::RedemptionRefunded(e) => {
                if let Some(mut rm) = self.store.get(&e.redemption_id) {
                    rm.status = RedemptionStatus::Refunded;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.redemption_id, rm);
                }
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.store.clear();
        self.cursors.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
