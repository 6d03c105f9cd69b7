//! Stripe-backed payment authorizer (feature `stripe`).
//!
//! Creates a PaymentIntent per redemption. Only the fields the redemption
//! flow needs are modeled; confirmation/webhooks are a separate concern.

use async_trait::async_trait;
use serde::Deserialize;

use super::{PaymentAuthorizer, PaymentAuthorization, PaymentError, PaymentRequest};

const DEFAULT_ENDPOINT: &str = "https://api.stripe.com/v1/payment_intents";

#[derive(Debug, Clone)]
pub struct StripePaymentAuthorizer {
    client: reqwest::Client,
    secret_key: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    id: String,
    client_secret: String,
}

impl StripePaymentAuthorizer {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: secret_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Point at a different endpoint (stripe-mock, test doubles).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl PaymentAuthorizer for StripePaymentAuthorizer {
    async fn authorize(&self, request: PaymentRequest) -> Result<PaymentAuthorization, PaymentError> {
        let amount = request.amount_minor_units.to_string();
        let credits = request.metadata.credits_used.to_string();
        let account = request.metadata.account_id.to_string();
        let product = request.metadata.product_id.to_string();

        let form = [
            ("amount", amount.as_str()),
            ("currency", request.currency.as_str()),
            ("metadata[account_id]", account.as_str()),
            ("metadata[product_id]", product.as_str()),
            ("metadata[credits_used]", credits.as_str()),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(PaymentError::Unavailable(format!("stripe returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Rejected(format!("stripe returned {status}: {body}")));
        }

        let intent: PaymentIntentResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Unavailable(format!("malformed stripe response: {e}")))?;

        Ok(PaymentAuthorization {
            payment_id: intent.id,
            client_secret: intent.client_secret,
        })
    }
}
