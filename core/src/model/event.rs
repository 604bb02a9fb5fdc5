// core/src/model/event.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique key of an idempotency ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey(String);

impl EventKey {
  /// `<source>:<event_type>:<event_id>` for a pushed notification.
  pub fn webhook(source: &str, event_type: &str, event_id: &str) -> Self {
    EventKey(format!("{}:{}:{}", source, event_type, event_id))
  }

  /// Second gate for the specific sub-resource (payment, refund) an event carries.
  pub fn sub_resource(source: &str, kind: &str, resource_id: &str) -> Self {
    EventKey(format!("{}:{}:{}", source, kind, resource_id))
  }

  /// Per-payment gate shared by every confirmation channel.
  pub fn payment_confirmed(payment_id: &str) -> Self {
    EventKey(format!("confirmed:{}", payment_id))
  }

  pub fn from_raw(raw: impl Into<String>) -> Self {
    EventKey(raw.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for EventKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Idempotency ledger row. Permanent; never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEvent {
  pub event_key: EventKey,
  pub event_type: String,
  pub source: String,
  pub payload: serde_json::Value,
  pub created_at: DateTime<Utc>,
}

/// Result of an insert-only ledger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
  /// This caller owns the key and may perform side effects.
  Reserved,
  /// The key already existed: a successful no-op.
  AlreadyProcessed,
}
