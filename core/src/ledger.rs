// core/src/ledger.rs

use crate::error::StoreError;
use crate::model::{EventKey, ProcessedEvent, Reservation};
use crate::ports::EventLedger;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reserves an event key before any side effect happens.
///
/// `Reserved` means the caller owns the work. `AlreadyProcessed` is a
/// successful no-op. An error means exclusivity could not be proven and the
/// caller must not proceed.
#[derive(Clone)]
pub struct IdempotencyGate {
  ledger: Arc<dyn EventLedger>,
}

impl IdempotencyGate {
  pub fn new(ledger: Arc<dyn EventLedger>) -> Self {
    Self { ledger }
  }

  pub async fn reserve(
    &self,
    key: EventKey,
    event_type: &str,
    source: &str,
    payload: serde_json::Value,
  ) -> Result<Reservation, StoreError> {
    let event = ProcessedEvent {
      event_key: key,
      event_type: event_type.to_string(),
      source: source.to_string(),
      payload,
      created_at: Utc::now(),
    };

    match self.ledger.insert(&event).await {
      Ok(Reservation::Reserved) => {
        debug!(event_key = %event.event_key, "Event key reserved.");
        Ok(Reservation::Reserved)
      }
      Ok(Reservation::AlreadyProcessed) => {
        debug!(event_key = %event.event_key, "Event key already in ledger.");
        Ok(Reservation::AlreadyProcessed)
      }
      // Some adapters surface the conflict as an error instead of a value.
      Err(StoreError::UniqueViolation { .. }) => Ok(Reservation::AlreadyProcessed),
      Err(e) => {
        warn!(event_key = %event.event_key, error = %e, "Ledger write failed; exclusivity unproven.");
        Err(e)
      }
    }
  }
}
