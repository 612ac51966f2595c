//! Stripe webhook signature verification and event decoding.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;

use crate::error::AppError;
use crate::Result;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: u64 = 300;

fn mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::InternalError(format!("Invalid webhook secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(value.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Builds a `Stripe-Signature` header value for `payload`.
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let digest = mac(secret, timestamp, payload)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex_encode(&digest)))
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) against
/// the raw request body.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<()> {
    let invalid = || AppError::ValidationError("Invalid webhook signature".into());

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(invalid)?;
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS {
        return Err(AppError::ValidationError("Webhook signature timestamp outside tolerance".into()));
    }

    let expected = mac(secret, timestamp, payload)?;
    let matched = signatures
        .iter()
        .filter_map(|s| hex_decode(s))
        .any(|candidate| expected.clone().verify_slice(&candidate).is_ok());

    if matched { Ok(()) } else { Err(invalid()) }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct InvoiceObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub billing_reason: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SubscriptionObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
}

fn default_currency() -> String {
    "usd".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    CheckoutCompleted(CheckoutSessionObject),
    InvoicePaid(InvoiceObject),
    SubscriptionDeleted(SubscriptionObject),
    /// Acknowledged and ignored.
    Other(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> Result<WebhookEvent> {
        let envelope: Envelope = serde_json::from_slice(payload)
            .map_err(|e| AppError::ValidationError(format!("Malformed webhook payload: {}", e)))?;

        let object = envelope.data.object;
        let malformed = |e: serde_json::Error| {
            AppError::ValidationError(format!("Malformed {} object: {}", envelope.kind, e))
        };

        Ok(match envelope.kind.as_str() {
            "checkout.session.completed" => {
                WebhookEvent::CheckoutCompleted(serde_json::from_value(object).map_err(malformed)?)
            }
            "invoice.paid" => WebhookEvent::InvoicePaid(serde_json::from_value(object).map_err(malformed)?),
            "customer.subscription.deleted" => {
                WebhookEvent::SubscriptionDeleted(serde_json::from_value(object).map_err(malformed)?)
            }
            _ => WebhookEvent::Other(envelope.kind.clone()),
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            WebhookEvent::CheckoutCompleted(_) => "checkout.session.completed",
            WebhookEvent::InvoicePaid(_) => "invoice.paid",
            WebhookEvent::SubscriptionDeleted(_) => "customer.subscription.deleted",
            WebhookEvent::Other(kind) => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    #[test]
    fn accepts_a_fresh_valid_signature() {
        let payload = br#"{"type":"invoice.paid"}"#;
        let header = signature_header(payload, SECRET, 1_700_000_000).unwrap();
        assert!(verify_signature(payload, &header, SECRET, 1_700_000_100).is_ok());
    }

    #[test]
    fn rejects_tampered_payload_and_wrong_secret() {
        let header = signature_header(b"original", SECRET, 1_700_000_000).unwrap();
        assert!(verify_signature(b"tampered", &header, SECRET, 1_700_000_000).is_err());
        assert!(verify_signature(b"original", &header, "whsec_other", 1_700_000_000).is_err());
    }

    #[test]
    fn rejects_stale_and_malformed_headers() {
        let header = signature_header(b"body", SECRET, 1_700_000_000).unwrap();
        assert!(verify_signature(b"body", &header, SECRET, 1_700_000_000 + SIGNATURE_TOLERANCE_SECS as i64 + 1).is_err());

        assert!(verify_signature(b"body", "v1=abcd", SECRET, 1_700_000_000).is_err());
        assert!(verify_signature(b"body", "t=1700000000,v1=zz", SECRET, 1_700_000_000).is_err());
    }

    #[test]
    fn extreme_timestamps_are_rejected_without_overflow() {
        for t in [i64::MIN, i64::MAX, -1] {
            let header = format!("t={},v1={}", t, "00".repeat(32));
            assert!(verify_signature(b"{}", &header, SECRET, 1_700_000_000).is_err());
        }
        let header = format!("t=1700000000,v1={}", "00".repeat(32));
        assert!(verify_signature(b"{}", &header, SECRET, i64::MIN).is_err());
    }

    #[test]
    fn any_listed_signature_may_match() {
        let valid = signature_header(b"body", SECRET, 1_700_000_000).unwrap();
        let v1 = valid.split(",v1=").nth(1).unwrap();
        let header = format!("t=1700000000,v1={},v1={}", "00".repeat(32), v1);
        assert!(verify_signature(b"body", &header, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn hex_round_trip() {
        assert_eq!(hex_encode(&[0x00, 0xab, 0xff]), "00abff");
        assert_eq!(hex_decode("00abff"), Some(vec![0x00, 0xab, 0xff]));
        assert_eq!(hex_decode("abc"), None);
    }

    #[test]
    fn parses_known_events() {
        let payload = json!({
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_1",
                "mode": "subscription",
                "customer": "cus_1",
                "subscription": "sub_1",
                "amount_total": 5000,
                "currency": "usd",
                "metadata": {"user_id": "u", "tier": "professional"}
            }}
        });
        let event = WebhookEvent::parse(payload.to_string().as_bytes()).unwrap();
        let WebhookEvent::CheckoutCompleted(session) = event else { panic!("expected checkout") };
        assert_eq!(session.metadata["tier"], "professional");
        assert_eq!(session.amount_total, Some(5000));

        let payload = json!({"type": "customer.subscription.deleted", "data": {"object": {"id": "sub_1", "customer": "cus_1"}}});
        let event = WebhookEvent::parse(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.kind(), "customer.subscription.deleted");
    }

    #[test]
    fn unknown_events_are_passed_through() {
        let payload = json!({"type": "charge.refunded", "data": {"object": {"id": "ch_1"}}});
        let event = WebhookEvent::parse(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event, WebhookEvent::Other("charge.refunded".into()));
    }
}
