use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    payments::webhook::{
        self, CompletedSession, WebhookEvent, CHECKOUT_SESSION_COMPLETED,
    },
    services::PaymentConfirmation,
    AppState,
};

/// Inbound payment-processor notifications.
///
/// The only hard rejection on this path is a signature failure; once the
/// payload is authenticated, anything the service is not interested in is
/// logged and acknowledged with 200 so the processor does not redeliver.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let Some(secret) = state.config.payment_webhook_secret.clone() else {
        warn!("Payment webhook received but no endpoint secret is configured; rejecting");
        return Err(ServiceError::WebhookSignatureError(
            "webhook verification unavailable".to_string(),
        ));
    };

    // Verification runs over the raw bytes; the body must not be parsed or
    // re-serialized before this point.
    if !webhook::verify_signature(
        &headers,
        &body,
        &secret,
        state.config.payment_webhook_tolerance_secs,
    ) {
        warn!("Payment webhook signature verification failed");
        return Err(ServiceError::WebhookSignatureError(
            "invalid webhook signature".to_string(),
        ));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid webhook payload: {}", e)))?;

    match event.event_type.as_str() {
        CHECKOUT_SESSION_COMPLETED => {
            match serde_json::from_value::<CompletedSession>(event.data.object) {
                Ok(session) => handle_completed_session(&state, session).await,
                Err(e) => error!("Malformed completed-session payload: {}", e),
            }
        }
        other => {
            info!("Unhandled payment webhook type: {}", other);
        }
    }

    Ok((StatusCode::OK, "ok"))
}

async fn handle_completed_session(state: &AppState, session: CompletedSession) {
    let Some(order_id) = session.metadata.order_id.clone() else {
        error!("Completed session is missing orderId metadata");
        return;
    };

    let Ok(order_id) = Uuid::parse_str(&order_id) else {
        error!("Completed session carries malformed orderId: {}", order_id);
        return;
    };

    if !session.is_paid() {
        info!(%order_id, "Session completed without paid status; ignoring");
        return;
    }

    let confirmation = PaymentConfirmation {
        status: session.payment_status.clone(),
        update_time: Some(Utc::now().to_rfc3339()),
        payer_email: session.payer_email().map(str::to_string),
    };

    // Failures here are logged, not surfaced: redelivery would not make an
    // unknown order appear.
    if let Err(e) = state.services.orders.mark_paid(order_id, confirmation).await {
        warn!(%order_id, "Could not mark order paid from webhook: {}", e);
    }
}
