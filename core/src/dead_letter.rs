// core/src/dead_letter.rs

use crate::model::SystemError;
use crate::ports::{AlertSink, DeadLetterSink};
use std::sync::Arc;
use tracing::{error, warn};

pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Durable record of failures no automatic path can recover from.
///
/// Recording is best-effort from the caller's point of view: a failure to
/// persist is logged loudly and never turned into the caller's own error.
#[derive(Clone)]
pub struct DeadLetterRecorder {
  sink: Arc<dyn DeadLetterSink>,
  alerts: Option<Arc<dyn AlertSink>>,
}

impl DeadLetterRecorder {
  pub fn new(sink: Arc<dyn DeadLetterSink>) -> Self {
    Self { sink, alerts: None }
  }

  pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
    self.alerts = Some(alerts);
    self
  }

  /// Persists the entry, then fans it out to the alert sink. Returns whether
  /// the entry reached durable storage.
  pub async fn record(&self, mut entry: SystemError) -> bool {
    if entry.message.chars().count() > MAX_MESSAGE_CHARS {
      entry.message = entry.message.chars().take(MAX_MESSAGE_CHARS).collect();
    }

    error!(
      error_type = %entry.error_type,
      severity = %entry.severity,
      order_id = ?entry.order_id,
      payment_id = ?entry.payment_id,
      amount_cents = ?entry.amount_cents,
      "SYSTEM-ERROR {} | {} | {} | {}",
      entry.severity.as_str().to_uppercase(),
      entry.error_type,
      entry.source_function,
      entry.message
    );

    let persisted = match self.sink.record(&entry).await {
      Ok(()) => true,
      Err(e) => {
        error!(
          error = %e,
          error_type = %entry.error_type,
          payment_id = ?entry.payment_id,
          "Dead letter could not be persisted; the log line above is the only record."
        );
        false
      }
    };

    if let Some(alerts) = &self.alerts {
      if let Err(e) = alerts.alert(&entry).await {
        warn!(error = %e, error_type = %entry.error_type, "Dead-letter alert delivery failed.");
      }
    }

    persisted
  }
}
