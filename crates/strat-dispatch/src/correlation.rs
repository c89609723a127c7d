//! Cross-system correlation and idempotency identifiers.
//!
//! - Correlation ID: `BP-{run_prefix}-{blueprint_prefix}-{unix_ts}`,
//!   generated once per run and echoed back by the production system.
//! - Idempotency key: digest of `{blueprint_id}:{approved_at_unix}`,
//!   immutable across delivery retries of one approval. A redispatch is a
//!   fresh approval attempt and gets a fresh key.
//! - Payload signature: HMAC-SHA256 over the exact raw request body.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::DispatchError;

/// Generate a cross-system correlation ID.
pub fn generate_correlation_id(run_id: &str, blueprint_id: &str) -> String {
    let run_prefix: String = run_id.chars().filter(|c| *c != '-').take(8).collect();
    let bp_prefix: String = blueprint_id.chars().filter(|c| *c != '-').take(8).collect();
    format!("BP-{}-{}-{}", run_prefix, bp_prefix, Utc::now().timestamp())
}

/// Generate the idempotency key for one approval attempt.
///
/// The production system deduplicates on this value, so it must be stable
/// across every retry of the same approval.
pub fn generate_idempotency_key(blueprint_id: &str, approved_at: DateTime<Utc>) -> String {
    let raw = format!("{}:{}", blueprint_id, approved_at.timestamp_millis());
    let digest = Sha256::digest(raw.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Sign a raw request body with HMAC-SHA256 for the `X-Signature-256`
/// header. The production system verifies this before accepting a payload.
pub fn sign_payload(raw_body: &[u8], secret: &str) -> Result<String, DispatchError> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DispatchError::SigningKey(e.to_string()))?;
    mac.update(raw_body);
    let signature = mac.finalize().into_bytes();

    Ok(URL_SAFE_NO_PAD.encode(signature))
}
