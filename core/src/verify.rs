// core/src/verify.rs

use crate::error::VerifyError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct VerifierConfig {
  pub signature_key: String,
  /// The exact URL the processor posts to; it is part of the signed bytes.
  pub notification_url: String,
  pub max_drift_secs: i64,
  pub max_body_bytes: usize,
}

impl Default for VerifierConfig {
  fn default() -> Self {
    Self {
      signature_key: String::new(),
      notification_url: String::new(),
      max_drift_secs: 300,
      max_body_bytes: 64 * 1024,
    }
  }
}

impl std::fmt::Debug for VerifierConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("VerifierConfig")
      .field("signature_key", &"[redacted]")
      .field("notification_url", &self.notification_url)
      .field("max_drift_secs", &self.max_drift_secs)
      .field("max_body_bytes", &self.max_body_bytes)
      .finish()
  }
}

/// Authenticates and freshness-checks pushed notifications, on the raw bytes.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
  config: VerifierConfig,
}

impl SignatureVerifier {
  pub fn new(config: VerifierConfig) -> Self {
    Self { config }
  }

  pub fn max_body_bytes(&self) -> usize {
    self.config.max_body_bytes
  }

  /// Rejects oversized bodies before anything else reads them.
  pub fn check_size(&self, raw_body: &[u8]) -> Result<(), VerifyError> {
    if raw_body.len() > self.config.max_body_bytes {
      return Err(VerifyError::PayloadTooLarge {
        size: raw_body.len(),
        limit: self.config.max_body_bytes,
      });
    }
    Ok(())
  }

  /// base64(HMAC-SHA256(key, notification_url || raw_body)).
  pub fn sign(&self, raw_body: &[u8]) -> Result<String, VerifyError> {
    let mut mac = HmacSha256::new_from_slice(self.config.signature_key.as_bytes()).map_err(|_| VerifyError::InvalidKey)?;
    mac.update(self.config.notification_url.as_bytes());
    mac.update(raw_body);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
  }

  pub fn verify(
    &self,
    raw_body: &[u8],
    signature: Option<&str>,
    timestamp: Option<&str>,
    now: DateTime<Utc>,
  ) -> Result<(), VerifyError> {
    self.check_size(raw_body)?;

    let provided = signature
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .ok_or(VerifyError::MissingSignature)?;
    let expected = self.sign(raw_body)?;
    if !bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
      return Err(VerifyError::SignatureMismatch);
    }

    let raw_ts = timestamp
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .ok_or(VerifyError::MissingTimestamp)?;
    let sent_at = parse_timestamp(raw_ts)?;
    let drift_secs = (now - sent_at).num_seconds().abs();
    if drift_secs > self.config.max_drift_secs {
      return Err(VerifyError::StaleTimestamp {
        drift_secs,
        window_secs: self.config.max_drift_secs,
      });
    }

    Ok(())
  }
}

// Unix seconds, or RFC 3339 as some processors send.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, VerifyError> {
  if let Ok(secs) = raw.parse::<i64>() {
    return DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| VerifyError::MalformedTimestamp(raw.to_string()));
  }
  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|_| VerifyError::MalformedTimestamp(raw.to_string()))
}
