use axum::http::HeaderMap;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the processor's signature over the raw request body.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Event type announcing a finished hosted-payment flow.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// Payment status value that confirms funds were collected.
pub const PAYMENT_STATUS_PAID: &str = "paid";

/// Processor event envelope. `data.object` stays untyped until the event
/// type is known.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// The slice of a completed checkout session this service acts on.
#[derive(Debug, Deserialize)]
pub struct CompletedSession {
    #[serde(default)]
    pub metadata: SessionMetadata,
    pub payment_status: Option<String>,
    pub customer_details: Option<CustomerDetails>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionMetadata {
    #[serde(rename = "orderId")]
    pub order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
}

impl CompletedSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some(PAYMENT_STATUS_PAID)
    }

    pub fn payer_email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
    }
}

/// Verifies the processor signature over the raw, unparsed body.
///
/// Scheme: `Stripe-Signature: t=<unix ts>,v1=<hex hmac>` where the MAC is
/// HMAC-SHA256 of `"{t}.{body}"` under the endpoint secret. The timestamp
/// must be within `tolerance_secs` of now. Any re-serialization of the body
/// before this point breaks verification, which is why the handler keeps the
/// body as raw bytes.
pub fn verify_signature(
    headers: &HeaderMap,
    payload: &Bytes,
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    let Some(sig) = headers.get(SIGNATURE_HEADER).and_then(|h| h.to_str().ok()) else {
        return false;
    };

    let mut ts = "";
    let mut v1 = "";
    for part in sig.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => ts = val,
            (Some("v1"), Some(val)) => v1 = val,
            _ => {}
        }
    }
    if ts.is_empty() || v1.is_empty() {
        return false;
    }

    if let Ok(ts_i) = ts.parse::<i64>() {
        let now = chrono::Utc::now().timestamp();
        if (now - ts_i).unsigned_abs() > tolerance_secs {
            return false;
        }
    } else {
        return false;
    }

    let expected = compute_signature(ts, payload, secret);
    constant_time_eq(&expected, v1)
}

/// Hex HMAC over `"{timestamp}.{payload}"`; shared by verification and the
/// test helpers that fabricate processor deliveries.
pub fn compute_signature(timestamp: &str, payload: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Builds the full signature header value for a payload, timestamped now.
pub fn signature_header(payload: &[u8], secret: &str) -> String {
    let ts = chrono::Utc::now().timestamp().to_string();
    let sig = compute_signature(&ts, payload, secret);
    format!("t={},v1={}", ts, sig)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
