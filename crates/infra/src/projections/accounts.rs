use serde_json::Value as JsonValue;

use cubemerch_accounts::{AccountEvent, AccountId, ActivityStats};
use cubemerch_core::Credits;
use cubemerch_events::EventEnvelope;

use super::cursors::{CursorDecision, ProjectionCursors};
use super::ProjectionError;
use crate::read_model::ReadModelStore;

pub const AGGREGATE_TYPE: &str = "accounts.account";

/// Queryable account snapshot (balance, holds, activity counters).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountReadModel {
    pub account_id: AccountId,
    pub credit_balance: Credits,
    pub pending_credits: Credits,
    pub stats: ActivityStats,
    pub redemptions: u64,
}

#[derive(Debug)]
pub struct AccountsProjection<S>
where
    S: ReadModelStore<AccountId, AccountReadModel>,
{
    store: S,
    cursors: ProjectionCursors,
}

impl<S> AccountsProjection<S>
where
    S: ReadModelStore<AccountId, AccountReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, account_id: &AccountId) -> Option<AccountReadModel> {
        self.store.get(account_id)
    }

    pub fn list(&self) -> Vec<AccountReadModel> {
        self.store.list()
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

        let ev: AccountEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let account_id = match &ev {
            AccountEvent::AccountOpened(e) => e.account_id,
            AccountEvent::CreditsGranted(e) => e.account_id,
            AccountEvent::CreditsHeld(e) => e.account_id,
            AccountEvent::PendingCreditsResolved(e) => e.account_id,
            AccountEvent::CreditsDebited(e) => e.account_id,
            AccountEvent::ActivityRecorded(e) => e.account_id,
        };
        if account_id.0 != aggregate_id {
            return Err(ProjectionError::MismatchedStream(
                "event account_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let mut rm = self.store.get(&account_id).unwrap_or(AccountReadModel {
            account_id,
            credit_balance: 0,
            pending_credits: 0,
            stats: ActivityStats::default(),
            redemptions: 0,
        });

        match ev {
            AccountEvent::AccountOpened(e) => {
                rm.credit_balance = e.initial_credits;
                rm.pending_credits = 0;
                rm.stats = ActivityStats::default();
                rm.redemptions = 0;
            }
            AccountEvent::CreditsGranted(e) => {
                rm.credit_balance += e.amount;
            }
            AccountEvent::CreditsHeld(e) => {
                rm.pending_credits += e.amount;
            }
            AccountEvent::PendingCreditsResolved(e) => {
                rm.pending_credits = rm.pending_credits.saturating_sub(e.amount);
                rm.credit_balance += e.amount;
            }
            AccountEvent::CreditsDebited(e) => {
                rm.credit_balance = rm.credit_balance.saturating_sub(e.amount);
                rm.redemptions += 1;
            }
            AccountEvent::ActivityRecorded(e) => match e.kind {
                cubemerch_accounts::ActivityKind::Burst => rm.stats.bursts += 1,
                cubemerch_accounts::ActivityKind::Win => rm.stats.wins += 1,
                cubemerch_accounts::ActivityKind::Purchase => rm.stats.purchases += 1,
                cubemerch_accounts::ActivityKind::Referral => rm.stats.referrals += 1,
            },
        }

        self.store.upsert(account_id, rm);
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
