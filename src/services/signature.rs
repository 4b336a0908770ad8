//! Payment signature verification.
//!
//! Both inbound payment flows are authenticated here before anything is
//! parsed or persisted. The webhook flow signs the raw body bytes, so the
//! checks in this module must always run against the unmodified payload;
//! the client-confirmed flow signs the concatenation of its two correlation
//! identifiers. All comparisons go through `Mac::verify_slice`, which is
//! constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::OffsetDateTime;

use crate::error::{ApiError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a webhook signature timestamp (seconds)
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Verify a Stripe webhook delivery against the raw, unparsed body bytes.
///
/// The `Stripe-Signature` header carries `t=<unix ts>,v1=<hex hmac>`; the
/// signed message is `"{t}.{raw body}"` keyed with the endpoint's webhook
/// secret.
pub fn verify_stripe_signature(payload: &[u8], header: &str, secret: &str) -> Result<()> {
    verify_stripe_signature_at(payload, header, secret, OffsetDateTime::now_utc())
}

fn verify_stripe_signature_at(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: OffsetDateTime,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<&str> = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => v1_signature = Some(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        ApiError::SignatureVerification("missing timestamp in signature header".to_string())
    })?;

    let v1_signature = v1_signature.ok_or_else(|| {
        ApiError::SignatureVerification("missing v1 signature in signature header".to_string())
    })?;

    // Reject replayed deliveries outside the tolerance window
    if (now.unix_timestamp() - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(ApiError::SignatureVerification(
            "signature timestamp outside tolerance".to_string(),
        ));
    }

    let expected = hex::decode(v1_signature).map_err(|_| {
        ApiError::SignatureVerification("malformed v1 signature".to_string())
    })?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ApiError::SignatureVerification("invalid webhook secret".to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    mac.verify_slice(&expected)
        .map_err(|_| ApiError::SignatureVerification("signature mismatch".to_string()))
}

/// Verify a client-submitted Razorpay payment proof.
///
/// The expected signature is `hex(hmac_sha256(key_secret, "{order_id}|{payment_id}"))`
/// as submitted by the checkout widget.
pub fn verify_razorpay_signature(
    order_id: &str,
    payment_id: &str,
    secret: &str,
    signature: &str,
) -> Result<()> {
    let expected = hex::decode(signature).map_err(|_| {
        ApiError::SignatureVerification("Invalid payment signature".to_string())
    })?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ApiError::SignatureVerification("Invalid payment signature".to_string()))?;
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());

    mac.verify_slice(&expected)
        .map_err(|_| ApiError::SignatureVerification("Invalid payment signature".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign_stripe(payload: &[u8], timestamp: i64, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn sign_razorpay(order_id: &str, payment_id: &str, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_stripe_signature_accepts_valid_header() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = OffsetDateTime::now_utc();
        let header = sign_stripe(payload, now.unix_timestamp(), SECRET);

        assert!(verify_stripe_signature_at(payload, &header, SECRET, now).is_ok());
    }

    #[test]
    fn test_stripe_signature_rejects_tampered_payload() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = OffsetDateTime::now_utc();
        let header = sign_stripe(payload, now.unix_timestamp(), SECRET);

        let tampered = br#"{"type":"customer.subscription.deleted"}"#;
        let result = verify_stripe_signature_at(tampered, &header, SECRET, now);
        assert!(matches!(result, Err(ApiError::SignatureVerification(_))));
    }

    #[test]
    fn test_stripe_signature_rejects_wrong_secret() {
        let payload = b"payload";
        let now = OffsetDateTime::now_utc();
        let header = sign_stripe(payload, now.unix_timestamp(), "other_secret");

        let result = verify_stripe_signature_at(payload, &header, SECRET, now);
        assert!(matches!(result, Err(ApiError::SignatureVerification(_))));
    }

    #[test]
    fn test_stripe_signature_rejects_stale_timestamp() {
        let payload = b"payload";
        let now = OffsetDateTime::now_utc();
        let stale = now.unix_timestamp() - SIGNATURE_TOLERANCE_SECS - 1;
        let header = sign_stripe(payload, stale, SECRET);

        let result = verify_stripe_signature_at(payload, &header, SECRET, now);
        assert!(matches!(result, Err(ApiError::SignatureVerification(_))));
    }

    #[test]
    fn test_stripe_signature_rejects_missing_parts() {
        let now = OffsetDateTime::now_utc();

        for header in ["", "t=123", "v1=abcd", "garbage"] {
            let result = verify_stripe_signature_at(b"payload", header, SECRET, now);
            assert!(
                matches!(result, Err(ApiError::SignatureVerification(_))),
                "header {:?} should be rejected",
                header
            );
        }
    }

    #[test]
    fn test_razorpay_signature_accepts_valid_proof() {
        let signature = sign_razorpay("order_123", "pay_456", SECRET);
        assert!(verify_razorpay_signature("order_123", "pay_456", SECRET, &signature).is_ok());
    }

    #[test]
    fn test_razorpay_signature_rejects_tampered_proof() {
        let signature = sign_razorpay("order_123", "pay_456", SECRET);

        let result = verify_razorpay_signature("order_123", "pay_999", SECRET, &signature);
        assert!(matches!(result, Err(ApiError::SignatureVerification(_))));
    }

    #[test]
    fn test_razorpay_signature_rejects_malformed_hex() {
        let result = verify_razorpay_signature("order_123", "pay_456", SECRET, "not-hex!");
        assert!(matches!(result, Err(ApiError::SignatureVerification(_))));
    }
}
