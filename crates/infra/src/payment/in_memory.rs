//! In-memory payment authorizer for tests/dev.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{PaymentAuthorizer, PaymentAuthorization, PaymentError, PaymentRequest};

/// Records every authorization request and mints deterministic references.
///
/// Flip `set_unavailable(true)` to simulate a provider outage; requests made
/// during the outage are rejected without being recorded as authorized.
#[derive(Debug, Default)]
pub struct InMemoryPaymentAuthorizer {
    requests: Mutex<Vec<PaymentRequest>>,
    unavailable: AtomicBool,
    counter: AtomicU64,
}

impl InMemoryPaymentAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All requests that reached the provider (authorized ones only).
    pub fn authorized_requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentAuthorizer for InMemoryPaymentAuthorizer {
    async fn authorize(&self, request: PaymentRequest) -> Result<PaymentAuthorization, PaymentError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PaymentError::Unavailable("simulated outage".to_string()));
        }

        if request.amount_minor_units < 0 {
            return Err(PaymentError::Rejected("negative amount".to_string()));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let payment_id = format!("pi_mock_{n:06}");
        let client_secret = format!("{payment_id}_secret_{n:06}");

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        Ok(PaymentAuthorization {
            payment_id,
            client_secret,
        })
    }
}
