//! Accounts domain module (event-sourced).
//!
//! Credit balances, pending-credit holds, and activity counters. All
//! mutations flow through the `Account` aggregate so the infrastructure's
//! optimistic append can serialize concurrent debits.

pub mod account;

pub use account::{
    Account, AccountCommand, AccountEvent, AccountId, AccountOpened, ActivityKind,
    ActivityRecorded, ActivityStats, CreditsDebited, CreditsGranted, CreditsHeld, DebitCredits,
    GrantCredits, HoldCredits, OpenAccount, PendingCreditsResolved, RecordActivity,
    ResolvePendingCredits,
};
