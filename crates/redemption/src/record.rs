use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cubemerch_accounts::AccountId;
use cubemerch_catalog::ProductId;
use cubemerch_core::{Aggregate, AggregateId, AggregateRoot, Credits, DomainError, ValueObject};
use cubemerch_events::Event;

/// Redemption identifier.
///
/// Derived deterministically from (account, idempotency key) when the caller
/// supplies a key, so a replayed submission lands on the same stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedemptionId(pub AggregateId);

impl RedemptionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RedemptionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Redemption record lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// Delivery address captured with the redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

impl ValueObject for ShippingAddress {}

impl ShippingAddress {
    pub fn validate(&self) -> Result<(), DomainError> {
        for (field, value) in [
            ("street", &self.street),
            ("city", &self.city),
            ("state", &self.state),
            ("zip_code", &self.zip_code),
            ("country", &self.country),
        ] {
            if value.trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "shipping address {field} cannot be empty"
                )));
            }
        }
        Ok(())
    }
}

/// Aggregate root: Redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    id: RedemptionId,
    account_id: Option<AccountId>,
    product_id: Option<ProductId>,
    credits_used: Credits,
    cash_amount: Decimal,
    total_amount: Decimal,
    payment_reference: String,
    status: RedemptionStatus,
    version: u64,
    created: bool,
}

impl Redemption {
    /// Create an empty, not-yet-requested aggregate instance for rehydration.
    pub fn empty(id: RedemptionId) -> Self {
        Self {
            id,
            account_id: None,
            product_id: None,
            credits_used: 0,
            cash_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            payment_reference: String::new(),
            status: RedemptionStatus::Pending,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RedemptionId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.account_id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn credits_used(&self) -> Credits {
        self.credits_used
    }

    pub fn cash_amount(&self) -> Decimal {
        self.cash_amount
    }

    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    pub fn payment_reference(&self) -> &str {
        &self.payment_reference
    }

    pub fn status(&self) -> RedemptionStatus {
        self.status
    }
}

impl AggregateRoot for Redemption {
    type Id = RedemptionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RequestRedemption (record the authorized attempt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRedemption {
    pub redemption_id: RedemptionId,
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub credits_used: Credits,
    pub cash_amount: Decimal,
    pub total_amount: Decimal,
    pub payment_reference: String,
    pub shipping_address: ShippingAddress,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteRedemption (payment confirmed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRedemption {
    pub redemption_id: RedemptionId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FailRedemption (compensating action; the record stays visible).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailRedemption {
    pub redemption_id: RedemptionId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RefundRedemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRedemption {
    pub redemption_id: RedemptionId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedemptionCommand {
    RequestRedemption(RequestRedemption),
    CompleteRedemption(CompleteRedemption),
    FailRedemption(FailRedemption),
    RefundRedemption(RefundRedemption),
}

/// Event: RedemptionRequested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequested {
    pub redemption_id: RedemptionId,
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub credits_used: Credits,
    pub cash_amount: Decimal,
    pub total_amount: Decimal,
    pub payment_reference: String,
    pub shipping_address: ShippingAddress,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RedemptionCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionCompleted {
    pub redemption_id: RedemptionId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RedemptionFailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionFailed {
    pub redemption_id: RedemptionId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RedemptionRefunded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRefunded {
    pub redemption_id: RedemptionId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedemptionEvent {
    RedemptionRequested(RedemptionRequested),
    RedemptionCompleted(RedemptionCompleted),
    RedemptionFailed(RedemptionFailed),
    RedemptionRefunded(RedemptionRefunded),
}

impl Event for RedemptionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RedemptionEvent::RedemptionRequested(_) => "redemption.record.requested",
            RedemptionEvent::RedemptionCompleted(_) => "redemption.record.completed",
            RedemptionEvent::RedemptionFailed(_) => "redemption.record.failed",
            RedemptionEvent::RedemptionRefunded(_) => "redemption.record.refunded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RedemptionEvent::RedemptionRequested(e) => e.occurred_at,
            RedemptionEvent::RedemptionCompleted(e) => e.occurred_at,
            RedemptionEvent::RedemptionFailed(e) => e.occurred_at,
            RedemptionEvent::RedemptionRefunded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Redemption {
    type Command = RedemptionCommand;
    type Event = RedemptionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RedemptionEvent::RedemptionRequested(e) => {
                self.id = e.redemption_id;
                self.account_id = Some(e.account_id);
                self.product_id = Some(e.product_id);
                self.credits_used = e.credits_used;
                self.cash_amount = e.cash_amount;
                self.total_amount = e.total_amount;
                self.payment_reference = e.payment_reference.clone();
                self.status = RedemptionStatus::Pending;
                self.created = true;
            }
            RedemptionEvent::RedemptionCompleted(_) => {
                self.status = RedemptionStatus::Completed;
            }
            RedemptionEvent::RedemptionFailed(_) => {
                self.status = RedemptionStatus::Failed;
            }
            RedemptionEvent::RedemptionRefunded(_) => {
                self.status = RedemptionStatus::Refunded;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RedemptionCommand::RequestRedemption(cmd) => self.handle_request(cmd),
            RedemptionCommand::CompleteRedemption(cmd) => self.handle_complete(cmd),
            RedemptionCommand::FailRedemption(cmd) => self.handle_fail(cmd),
            RedemptionCommand::RefundRedemption(cmd) => self.handle_refund(cmd),
        }
    }
}

impl Redemption {
    fn ensure_redemption_id(&self, redemption_id: RedemptionId) -> Result<(), DomainError> {
        if self.id != redemption_id {
            return Err(DomainError::invariant("redemption_id mismatch"));
        }
        Ok(())
    }

    fn handle_request(&self, cmd: &RequestRedemption) -> Result<Vec<RedemptionEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("redemption already recorded"));
        }

        cmd.shipping_address.validate()?;

        if cmd.cash_amount < Decimal::ZERO {
            return Err(DomainError::validation("cash amount cannot be negative"));
        }
        if cmd.total_amount < cmd.cash_amount {
            return Err(DomainError::invariant(
                "total cannot be less than the cash portion",
            ));
        }
        if cmd.payment_reference.trim().is_empty() {
            return Err(DomainError::validation("payment reference cannot be empty"));
        }

        Ok(vec![RedemptionEvent::RedemptionRequested(
            RedemptionRequested {
                redemption_id: cmd.redemption_id,
                account_id: cmd.account_id,
                product_id: cmd.product_id,
                credits_used: cmd.credits_used,
                cash_amount: cmd.cash_amount,
                total_amount: cmd.total_amount,
                payment_reference: cmd.payment_reference.clone(),
                shipping_address: cmd.shipping_address.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_complete(&self, cmd: &CompleteRedemption) -> Result<Vec<RedemptionEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_redemption_id(cmd.redemption_id)?;

        if self.status != RedemptionStatus::Pending {
            return Err(DomainError::invariant(
                "only pending redemptions can be completed",
            ));
        }

        Ok(vec![RedemptionEvent::RedemptionCompleted(
            RedemptionCompleted {
                redemption_id: cmd.redemption_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_fail(&self, cmd: &FailRedemption) -> Result<Vec<RedemptionEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_redemption_id(cmd.redemption_id)?;

        if self.status != RedemptionStatus::Pending {
            return Err(DomainError::invariant(
                "only pending redemptions can be failed",
            ));
        }

        Ok(vec![RedemptionEvent::RedemptionFailed(RedemptionFailed {
            redemption_id: cmd.redemption_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_refund(&self, cmd: &RefundRedemption) -> Result<Vec<RedemptionEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_redemption_id(cmd.redemption_id)?;

        if self.status != RedemptionStatus::Completed {
            return Err(DomainError::invariant(
                "only completed redemptions can be refunded",
            ));
        }

        Ok(vec![RedemptionEvent::RedemptionRefunded(
            RedemptionRefunded {
                redemption_id: cmd.redemption_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_redemption_id() -> RedemptionId {
        RedemptionId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_address() -> ShippingAddress {
        ShippingAddress {
            street: "123 Demo Street".to_string(),
            city: "Demo City".to_string(),
            state: "CA".to_string(),
            zip_code: "12345".to_string(),
            country: "US".to_string(),
        }
    }

    fn request_cmd(redemption_id: RedemptionId) -> RequestRedemption {
        RequestRedemption {
            redemption_id,
            account_id: AccountId::new(AggregateId::new()),
            product_id: ProductId::new(AggregateId::new()),
            credits_used: 599,
            cash_amount: Decimal::new(1202, 2),
            total_amount: Decimal::new(204092, 4),
            payment_reference: "pi_demo_001".to_string(),
            shipping_address: test_address(),
            occurred_at: test_time(),
        }
    }

    #[test]
    fn request_creates_pending_record() {
        let redemption_id = test_redemption_id();
        let mut redemption = Redemption::empty(redemption_id);

        let events = redemption
            .handle(&RedemptionCommand::RequestRedemption(request_cmd(
                redemption_id,
            )))
            .unwrap();
        assert_eq!(events.len(), 1);
        redemption.apply(&events[0]);

        assert!(redemption.exists());
        assert_eq!(redemption.status(), RedemptionStatus::Pending);
        assert_eq!(redemption.credits_used(), 599);
        assert_eq!(redemption.payment_reference(), "pi_demo_001");
    }

    #[test]
    fn request_rejects_incomplete_address() {
        let redemption_id = test_redemption_id();
        let redemption = Redemption::empty(redemption_id);
        let mut cmd = request_cmd(redemption_id);
        cmd.shipping_address.city = "  ".to_string();

        let err = redemption
            .handle(&RedemptionCommand::RequestRedemption(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn duplicate_request_conflicts() {
        let redemption_id = test_redemption_id();
        let mut redemption = Redemption::empty(redemption_id);

        let events = redemption
            .handle(&RedemptionCommand::RequestRedemption(request_cmd(
                redemption_id,
            )))
            .unwrap();
        redemption.apply(&events[0]);

        let err = redemption
            .handle(&RedemptionCommand::RequestRedemption(request_cmd(
                redemption_id,
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn lifecycle_pending_to_completed_to_refunded() {
        let redemption_id = test_redemption_id();
        let mut redemption = Redemption::empty(redemption_id);

        let events = redemption
            .handle(&RedemptionCommand::RequestRedemption(request_cmd(
                redemption_id,
            )))
            .unwrap();
        redemption.apply(&events[0]);

        let events = redemption
            .handle(&RedemptionCommand::CompleteRedemption(CompleteRedemption {
                redemption_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        redemption.apply(&events[0]);
        assert_eq!(redemption.status(), RedemptionStatus::Completed);

        let events = redemption
            .handle(&RedemptionCommand::RefundRedemption(RefundRedemption {
                redemption_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        redemption.apply(&events[0]);
        assert_eq!(redemption.status(), RedemptionStatus::Refunded);
        assert_eq!(redemption.version(), 3);
    }

    #[test]
    fn failing_keeps_the_record_visible() {
        let redemption_id = test_redemption_id();
        let mut redemption = Redemption::empty(redemption_id);

        let events = redemption
            .handle(&RedemptionCommand::RequestRedemption(request_cmd(
                redemption_id,
            )))
            .unwrap();
        redemption.apply(&events[0]);

        let events = redemption
            .handle(&RedemptionCommand::FailRedemption(FailRedemption {
                redemption_id,
                reason: "insufficient credits at debit time".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        redemption.apply(&events[0]);

        assert!(redemption.exists());
        assert_eq!(redemption.status(), RedemptionStatus::Failed);
    }

    #[test]
    fn cannot_refund_a_pending_record() {
        let redemption_id = test_redemption_id();
        let mut redemption = Redemption::empty(redemption_id);

        let events = redemption
            .handle(&RedemptionCommand::RequestRedemption(request_cmd(
                redemption_id,
            )))
            .unwrap();
        redemption.apply(&events[0]);

        let err = redemption
            .handle(&RedemptionCommand::RefundRedemption(RefundRedemption {
                redemption_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
