use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cubemerch_core::{Aggregate, AggregateId, AggregateRoot, Credits, DomainError};
use cubemerch_events::Event;

/// Account identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub AggregateId);

impl AccountId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Platform activity counted for the admin metrics dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Burst,
    Win,
    Purchase,
    Referral,
}

/// Per-account activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub bursts: u64,
    pub wins: u64,
    pub purchases: u64,
    pub referrals: u64,
}

impl ActivityStats {
    fn record(&mut self, kind: ActivityKind) {
        match kind {
            ActivityKind::Burst => self.bursts += 1,
            ActivityKind::Win => self.wins += 1,
            ActivityKind::Purchase => self.purchases += 1,
            ActivityKind::Referral => self.referrals += 1,
        }
    }
}

/// Aggregate root: Account.
///
/// The balance check inside `handle` and the debit inside `apply` become
/// atomic relative to concurrent debits through the event store's
/// `ExpectedVersion` append; two racing debits can never both pass the
/// check against the same stream version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    id: AccountId,
    credit_balance: Credits,
    pending_credits: Credits,
    stats: ActivityStats,
    redemptions: u64,
    version: u64,
    created: bool,
}

impl Account {
    /// Create an empty, not-yet-opened aggregate instance for rehydration.
    pub fn empty(id: AccountId) -> Self {
        Self {
            id,
            credit_balance: 0,
            pending_credits: 0,
            stats: ActivityStats::default(),
            redemptions: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> AccountId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn credit_balance(&self) -> Credits {
        self.credit_balance
    }

    pub fn pending_credits(&self) -> Credits {
        self.pending_credits
    }

    pub fn stats(&self) -> ActivityStats {
        self.stats
    }

    pub fn redemptions(&self) -> u64 {
        self.redemptions
    }

    /// Redemptions are held while any pending credits remain unresolved.
    pub fn is_redemption_blocked(&self) -> bool {
        self.pending_credits > 0
    }
}

impl AggregateRoot for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenAccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccount {
    pub account_id: AccountId,
    pub initial_credits: Credits,
    pub occurred_at: DateTime<Utc>,
}

/// Command: GrantCredits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantCredits {
    pub account_id: AccountId,
    pub amount: Credits,
    pub occurred_at: DateTime<Utc>,
}

/// Command: HoldCredits (place credits in the unresolved-pending state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldCredits {
    pub account_id: AccountId,
    pub amount: Credits,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResolvePendingCredits (release the hold; pending credits become
/// spendable balance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvePendingCredits {
    pub account_id: AccountId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DebitCredits (redemption spend).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitCredits {
    pub account_id: AccountId,
    pub amount: Credits,
    pub redemption_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordActivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordActivity {
    pub account_id: AccountId,
    pub kind: ActivityKind,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountCommand {
    OpenAccount(OpenAccount),
    GrantCredits(GrantCredits),
    HoldCredits(HoldCredits),
    ResolvePendingCredits(ResolvePendingCredits),
    DebitCredits(DebitCredits),
    RecordActivity(RecordActivity),
}

/// Event: AccountOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOpened {
    pub account_id: AccountId,
    pub initial_credits: Credits,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CreditsGranted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditsGranted {
    pub account_id: AccountId,
    pub amount: Credits,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CreditsHeld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditsHeld {
    pub account_id: AccountId,
    pub amount: Credits,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PendingCreditsResolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCreditsResolved {
    pub account_id: AccountId,
    pub amount: Credits,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CreditsDebited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditsDebited {
    pub account_id: AccountId,
    pub amount: Credits,
    pub redemption_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ActivityRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecorded {
    pub account_id: AccountId,
    pub kind: ActivityKind,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    AccountOpened(AccountOpened),
    CreditsGranted(CreditsGranted),
    CreditsHeld(CreditsHeld),
    PendingCreditsResolved(PendingCreditsResolved),
    CreditsDebited(CreditsDebited),
    ActivityRecorded(ActivityRecorded),
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::AccountOpened(_) => "accounts.account.opened",
            AccountEvent::CreditsGranted(_) => "accounts.account.credits_granted",
            AccountEvent::CreditsHeld(_) => "accounts.account.credits_held",
            AccountEvent::PendingCreditsResolved(_) => "accounts.account.pending_resolved",
            AccountEvent::CreditsDebited(_) => "accounts.account.credits_debited",
            AccountEvent::ActivityRecorded(_) => "accounts.account.activity_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccountEvent::AccountOpened(e) => e.occurred_at,
            AccountEvent::CreditsGranted(e) => e.occurred_at,
            AccountEvent::CreditsHeld(e) => e.occurred_at,
            AccountEvent::PendingCreditsResolved(e) => e.occurred_at,
            AccountEvent::CreditsDebited(e) => e.occurred_at,
            AccountEvent::ActivityRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Account {
    type Command = AccountCommand;
    type Event = AccountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AccountEvent::AccountOpened(e) => {
                self.id = e.account_id;
                self.credit_balance = e.initial_credits;
                self.pending_credits = 0;
                self.stats = ActivityStats::default();
                self.redemptions = 0;
                self.created = true;
            }
            AccountEvent::CreditsGranted(e) => {
                self.credit_balance += e.amount;
            }
            AccountEvent::CreditsHeld(e) => {
                self.pending_credits += e.amount;
            }
            AccountEvent::PendingCreditsResolved(e) => {
                self.pending_credits = self.pending_credits.saturating_sub(e.amount);
                self.credit_balance += e.amount;
            }
            AccountEvent::CreditsDebited(e) => {
                self.credit_balance = self.credit_balance.saturating_sub(e.amount);
                self.redemptions += 1;
            }
            AccountEvent::ActivityRecorded(e) => {
                self.stats.record(e.kind);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AccountCommand::OpenAccount(cmd) => self.handle_open(cmd),
            AccountCommand::GrantCredits(cmd) => self.handle_grant(cmd),
            AccountCommand::HoldCredits(cmd) => self.handle_hold(cmd),
            AccountCommand::ResolvePendingCredits(cmd) => self.handle_resolve(cmd),
            AccountCommand::DebitCredits(cmd) => self.handle_debit(cmd),
            AccountCommand::RecordActivity(cmd) => self.handle_activity(cmd),
        }
    }
}

impl Account {
    fn ensure_account_id(&self, account_id: AccountId) -> Result<(), DomainError> {
        if self.id != account_id {
            return Err(DomainError::invariant("account_id mismatch"));
        }
        Ok(())
    }

    fn ensure_open(&self, account_id: AccountId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_account_id(account_id)
    }

    fn handle_open(&self, cmd: &OpenAccount) -> Result<Vec<AccountEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("account already exists"));
        }

        Ok(vec![AccountEvent::AccountOpened(AccountOpened {
            account_id: cmd.account_id,
            initial_credits: cmd.initial_credits,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_grant(&self, cmd: &GrantCredits) -> Result<Vec<AccountEvent>, DomainError> {
        self.ensure_open(cmd.account_id)?;

        if cmd.amount == 0 {
            return Err(DomainError::validation("grant amount must be positive"));
        }

        Ok(vec![AccountEvent::CreditsGranted(CreditsGranted {
            account_id: cmd.account_id,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_hold(&self, cmd: &HoldCredits) -> Result<Vec<AccountEvent>, DomainError> {
        self.ensure_open(cmd.account_id)?;

        if cmd.amount == 0 {
            return Err(DomainError::validation("hold amount must be positive"));
        }

        Ok(vec![AccountEvent::CreditsHeld(CreditsHeld {
            account_id: cmd.account_id,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_resolve(&self, cmd: &ResolvePendingCredits) -> Result<Vec<AccountEvent>, DomainError> {
        self.ensure_open(cmd.account_id)?;

        if self.pending_credits == 0 {
            return Err(DomainError::conflict("no pending credits to resolve"));
        }

        Ok(vec![AccountEvent::PendingCreditsResolved(
            PendingCreditsResolved {
                account_id: cmd.account_id,
                amount: self.pending_credits,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_debit(&self, cmd: &DebitCredits) -> Result<Vec<AccountEvent>, DomainError> {
        self.ensure_open(cmd.account_id)?;

        if self.is_redemption_blocked() {
            return Err(DomainError::PendingCreditsBlock);
        }

        if cmd.amount > self.credit_balance {
            return Err(DomainError::InsufficientCredits {
                requested: cmd.amount,
                available: self.credit_balance,
            });
        }

        // A zero-credit debit is a valid all-cash redemption; it still counts
        // toward the redemption counter.
        Ok(vec![AccountEvent::CreditsDebited(CreditsDebited {
            account_id: cmd.account_id,
            amount: cmd.amount,
            redemption_id: cmd.redemption_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activity(&self, cmd: &RecordActivity) -> Result<Vec<AccountEvent>, DomainError> {
        self.ensure_open(cmd.account_id)?;

        Ok(vec![AccountEvent::ActivityRecorded(ActivityRecorded {
            account_id: cmd.account_id,
            kind: cmd.kind,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_account_id() -> AccountId {
        AccountId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn opened_account(account_id: AccountId, initial_credits: Credits) -> Account {
        let mut account = Account::empty(account_id);
        let events = account
            .handle(&AccountCommand::OpenAccount(OpenAccount {
                account_id,
                initial_credits,
                occurred_at: test_time(),
            }))
            .unwrap();
        account.apply(&events[0]);
        account
    }

    #[test]
    fn open_account_emits_account_opened_event() {
        let account_id = test_account_id();
        let account = Account::empty(account_id);

        let events = account
            .handle(&AccountCommand::OpenAccount(OpenAccount {
                account_id,
                initial_credits: 2500,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            AccountEvent::AccountOpened(e) => {
                assert_eq!(e.account_id, account_id);
                assert_eq!(e.initial_credits, 2500);
            }
            _ => panic!("Expected AccountOpened event"),
        }
    }

    #[test]
    fn debit_reduces_balance_and_counts_redemption() {
        let account_id = test_account_id();
        let mut account = opened_account(account_id, 1000);

        let events = account
            .handle(&AccountCommand::DebitCredits(DebitCredits {
                account_id,
                amount: 599,
                redemption_id: AggregateId::new(),
                occurred_at: test_time(),
            }))
            .unwrap();
        account.apply(&events[0]);

        assert_eq!(account.credit_balance(), 401);
        assert_eq!(account.redemptions(), 1);
    }

    #[test]
    fn debit_beyond_balance_is_rejected() {
        let account_id = test_account_id();
        let account = opened_account(account_id, 100);

        let err = account
            .handle(&AccountCommand::DebitCredits(DebitCredits {
                account_id,
                amount: 101,
                redemption_id: AggregateId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientCredits {
                requested: 101,
                available: 100
            }
        );
    }

    #[test]
    fn pending_credits_block_debits_of_any_size() {
        let account_id = test_account_id();
        let mut account = opened_account(account_id, 1000);

        let events = account
            .handle(&AccountCommand::HoldCredits(HoldCredits {
                account_id,
                amount: 1,
                occurred_at: test_time(),
            }))
            .unwrap();
        account.apply(&events[0]);

        let err = account
            .handle(&AccountCommand::DebitCredits(DebitCredits {
                account_id,
                amount: 0,
                redemption_id: AggregateId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::PendingCreditsBlock);
    }

    #[test]
    fn resolving_pending_credits_unblocks_and_credits_balance() {
        let account_id = test_account_id();
        let mut account = opened_account(account_id, 500);

        let events = account
            .handle(&AccountCommand::HoldCredits(HoldCredits {
                account_id,
                amount: 50,
                occurred_at: test_time(),
            }))
            .unwrap();
        account.apply(&events[0]);
        assert!(account.is_redemption_blocked());

        let events = account
            .handle(&AccountCommand::ResolvePendingCredits(
                ResolvePendingCredits {
                    account_id,
                    occurred_at: test_time(),
                },
            ))
            .unwrap();
        account.apply(&events[0]);

        assert!(!account.is_redemption_blocked());
        assert_eq!(account.credit_balance(), 550);
        assert_eq!(account.pending_credits(), 0);
    }

    #[test]
    fn zero_credit_debit_still_counts_a_redemption() {
        let account_id = test_account_id();
        let mut account = opened_account(account_id, 0);

        let events = account
            .handle(&AccountCommand::DebitCredits(DebitCredits {
                account_id,
                amount: 0,
                redemption_id: AggregateId::new(),
                occurred_at: test_time(),
            }))
            .unwrap();
        account.apply(&events[0]);

        assert_eq!(account.credit_balance(), 0);
        assert_eq!(account.redemptions(), 1);
    }

    #[test]
    fn activity_updates_stats() {
        let account_id = test_account_id();
        let mut account = opened_account(account_id, 0);

        for kind in [
            ActivityKind::Burst,
            ActivityKind::Burst,
            ActivityKind::Win,
            ActivityKind::Referral,
        ] {
            let events = account
                .handle(&AccountCommand::RecordActivity(RecordActivity {
                    account_id,
                    kind,
                    occurred_at: test_time(),
                }))
                .unwrap();
            account.apply(&events[0]);
        }

        assert_eq!(account.stats().bursts, 2);
        assert_eq!(account.stats().wins, 1);
        assert_eq!(account.stats().referrals, 1);
        assert_eq!(account.stats().purchases, 0);
    }

    #[test]
    fn commands_on_missing_account_return_not_found() {
        let account_id = test_account_id();
        let account = Account::empty(account_id);

        let err = account
            .handle(&AccountCommand::GrantCredits(GrantCredits {
                account_id,
                amount: 10,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let account_id = test_account_id();
        let account = opened_account(account_id, 1000);
        let version_before = account.version();

        let cmd = AccountCommand::DebitCredits(DebitCredits {
            account_id,
            amount: 100,
            redemption_id: AggregateId::new(),
            occurred_at: test_time(),
        });
        let events1 = account.handle(&cmd).unwrap();
        let events2 = account.handle(&cmd).unwrap();

        assert_eq!(account.version(), version_before);
        assert_eq!(account.credit_balance(), 1000);
        assert_eq!(events1, events2);
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for any interleaving of grants and debit attempts, the
        /// balance never goes negative and always equals grants minus the
        /// debits that were accepted.
        #[test]
        fn balance_never_overdrawn(
            ops in prop::collection::vec((any::<bool>(), 1u64..10_000u64), 1..40)
        ) {
            let account_id = test_account_id();
            let mut account = opened_account(account_id, 0);

            let mut granted: u128 = 0;
            let mut debited: u128 = 0;

            for (is_grant, amount) in ops {
                let cmd = if is_grant {
                    AccountCommand::GrantCredits(GrantCredits {
                        account_id,
                        amount,
                        occurred_at: test_time(),
                    })
                } else {
                    AccountCommand::DebitCredits(DebitCredits {
                        account_id,
                        amount,
                        redemption_id: AggregateId::new(),
                        occurred_at: test_time(),
                    })
                };

                match account.handle(&cmd) {
                    Ok(events) => {
                        for e in &events {
                            account.apply(e);
                        }
                        if is_grant {
                            granted += amount as u128;
                        } else {
                            debited += amount as u128;
                        }
                    }
                    Err(DomainError::InsufficientCredits { .. }) if !is_grant => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }

            prop_assert_eq!(account.credit_balance() as u128, granted - debited);
        }
    }

    #[test]
    fn apply_is_deterministic() {
        let account_id = test_account_id();
        let opened = AccountEvent::AccountOpened(AccountOpened {
            account_id,
            initial_credits: 300,
            occurred_at: test_time(),
        });
        let debited = AccountEvent::CreditsDebited(CreditsDebited {
            account_id,
            amount: 120,
            redemption_id: AggregateId::new(),
            occurred_at: test_time(),
        });

        let mut a = Account::empty(account_id);
        a.apply(&opened);
        a.apply(&debited);

        let mut b = Account::empty(account_id);
        b.apply(&opened);
        b.apply(&debited);

        assert_eq!(a.credit_balance(), b.credit_balance());
        assert_eq!(a.version(), b.version());
        assert_eq!(a.credit_balance(), 180);
    }
}
