use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;

/// One price line of a hosted checkout session. Amounts are in the smallest
/// currency unit (cents for USD).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLineItem {
    pub name: String,
    pub image: String,
    pub unit_amount: i64,
    pub quantity: i64,
}

/// Request to open a hosted payment session with the external processor.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub order_id: Uuid,
    pub customer_email: String,
    pub currency: String,
    pub line_items: Vec<CheckoutLineItem>,
    pub success_url: String,
    pub cancel_url: String,
}

/// A hosted session as returned by the processor.
#[derive(Debug, Clone)]
pub struct HostedSession {
    pub id: String,
    pub url: String,
}

/// Boundary to the external payment processor.
///
/// The HTTP client below talks to the real API; tests substitute their own
/// implementation so no checkout logic depends on the provider being up.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<HostedSession, ServiceError>;
}

/// Stripe-style hosted-checkout client.
///
/// Sessions are created with a form-encoded POST authorized by the secret
/// key; the base URL is configurable so tests can point at a local stub.
pub struct HostedCheckoutClient {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

impl HostedCheckoutClient {
    pub fn new(secret_key: String, api_base: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            client,
            api_base,
            secret_key,
        }
    }

    fn sessions_endpoint(&self) -> String {
        format!(
            "{}/v1/checkout/sessions",
            self.api_base.trim_end_matches('/')
        )
    }

    fn form_params(&self, request: &CreateSessionRequest) -> Vec<(String, String)> {
        let mut params = vec![
            ("mode".to_string(), "payment".to_string()),
            ("customer_email".to_string(), request.customer_email.clone()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            (
                "metadata[orderId]".to_string(),
                request.order_id.to_string(),
            ),
        ];

        for (i, item) in request.line_items.iter().enumerate() {
            params.push((
                format!("line_items[{}][price_data][currency]", i),
                request.currency.clone(),
            ));
            params.push((
                format!("line_items[{}][price_data][product_data][name]", i),
                item.name.clone(),
            ));
            params.push((
                format!("line_items[{}][price_data][product_data][images][0]", i),
                item.image.clone(),
            ));
            params.push((
                format!("line_items[{}][price_data][unit_amount]", i),
                item.unit_amount.to_string(),
            ));
            params.push((
                format!("line_items[{}][quantity]", i),
                item.quantity.to_string(),
            ));
        }

        params
    }
}

#[async_trait]
impl PaymentGateway for HostedCheckoutClient {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<HostedSession, ServiceError> {
        let params = self.form_params(&request);

        let response = self
            .client
            .post(self.sessions_endpoint())
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!("Checkout session request failed: {}", e);
                ServiceError::ExternalServiceError(format!("session request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "Checkout session rejected by processor");
            return Err(ServiceError::ExternalServiceError(format!(
                "processor returned {}: {}",
                status, body
            )));
        }

        let session: SessionResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("invalid session response: {}", e))
        })?;

        let url = session.url.ok_or_else(|| {
            ServiceError::ExternalServiceError("session response carried no URL".to_string())
        })?;

        info!(session_id = %session.id, "Hosted checkout session created");
        Ok(HostedSession {
            id: session.id,
            url,
        })
    }
}
