// app/src/services/webhook_signature.rs

//! Stripe webhook signatures: `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`
//! where each `v1` is HMAC-SHA256 of `"<t>.<raw body>"` under the endpoint secret.

use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
  let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
    .map_err(|e| AppError::Config(format!("webhook secret: {}", e)))?;
  mac.update(timestamp.to_string().as_bytes());
  mac.update(b".");
  mac.update(payload);
  Ok(mac)
}

/// Builds a header value the verifier accepts. Used to sign test payloads and
/// by local tooling replaying provider events.
pub fn stripe_signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String> {
  let mac = mac_for(secret, timestamp, payload)?;
  Ok(format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes())))
}

pub fn verify_stripe_signature(
  payload: &[u8],
  header: Option<&str>,
  secret: &str,
  tolerance_secs: i64,
  now: DateTime<Utc>,
) -> Result<()> {
  let header = header.ok_or_else(|| AppError::InvalidSignature("missing Stripe-Signature header".to_string()))?;

  let mut timestamp: Option<i64> = None;
  let mut candidates: Vec<Vec<u8>> = Vec::new();
  for part in header.split(',') {
    match part.trim().split_once('=') {
      Some(("t", value)) => timestamp = value.parse().ok(),
      Some(("v1", value)) => {
        if let Ok(bytes) = hex::decode(value) {
          candidates.push(bytes);
        }
      }
      _ => {}
    }
  }

  let timestamp = timestamp.ok_or_else(|| AppError::InvalidSignature("no timestamp in header".to_string()))?;
  if candidates.is_empty() {
    return Err(AppError::InvalidSignature("no v1 signature in header".to_string()));
  }
  if now.timestamp().abs_diff(timestamp) > tolerance_secs.unsigned_abs() {
    return Err(AppError::InvalidSignature("timestamp outside tolerance".to_string()));
  }

  for candidate in &candidates {
    // verify_slice compares in constant time.
    if mac_for(secret, timestamp, payload)?.verify_slice(candidate).is_ok() {
      return Ok(());
    }
  }
  Err(AppError::InvalidSignature("no matching v1 signature".to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  const SECRET: &str = "whsec_test";

  #[test]
  fn signed_payload_verifies() {
    let now = Utc::now();
    let body = br#"{"type":"payment_intent.succeeded"}"#;
    let header = stripe_signature_header(SECRET, now.timestamp(), body).unwrap();
    assert!(verify_stripe_signature(body, Some(&header), SECRET, 300, now).is_ok());
  }

  #[test]
  fn any_matching_v1_is_enough() {
    let now = Utc::now();
    let body = b"{}";
    let good = stripe_signature_header(SECRET, now.timestamp(), body).unwrap();
    let good_sig = good.split("v1=").nth(1).unwrap();
    let header = format!("t={},v1={},v1={}", now.timestamp(), "00".repeat(32), good_sig);
    assert!(verify_stripe_signature(body, Some(&header), SECRET, 300, now).is_ok());
  }

  #[test]
  fn tampering_stale_timestamps_and_wrong_secrets_fail() {
    let now = Utc::now();
    let body = b"{\"amount\":100}";
    let header = stripe_signature_header(SECRET, now.timestamp(), body).unwrap();

    let tampered = verify_stripe_signature(b"{\"amount\":999}", Some(&header), SECRET, 300, now);
    assert!(matches!(tampered, Err(AppError::InvalidSignature(_))));

    let late = now + chrono::Duration::seconds(301);
    assert!(verify_stripe_signature(body, Some(&header), SECRET, 300, late).is_err());

    assert!(verify_stripe_signature(body, Some(&header), "whsec_other", 300, now).is_err());
    assert!(verify_stripe_signature(body, None, SECRET, 300, now).is_err());
    assert!(verify_stripe_signature(body, Some("v1=abcd"), SECRET, 300, now).is_err());
  }

  #[test]
  fn extreme_timestamps_are_rejected_without_overflow() {
    let now = Utc::now();
    let body = b"{}";
    for t in [i64::MIN, i64::MAX] {
      let header = format!("t={},v1={}", t, "00".repeat(32));
      let outcome = verify_stripe_signature(body, Some(&header), SECRET, 300, now);
      assert!(matches!(outcome, Err(AppError::InvalidSignature(_))));
    }
  }
}
