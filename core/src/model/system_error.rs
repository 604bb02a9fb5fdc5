// core/src/model/system_error.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Critical,
  High,
  Warning,
  Info,
}

impl Severity {
  pub fn as_str(self) -> &'static str {
    match self {
      Severity::Critical => "critical",
      Severity::High => "high",
      Severity::Warning => "warning",
      Severity::Info => "info",
    }
  }
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemErrorType {
  /// The processor moved money but no local order could be found or updated.
  OrphanPayment,
  /// Money moved for an order that can no longer be fulfilled.
  PaymentOnClosedOrder,
  /// A completed refund references a payment no local order carries.
  OrphanRefund,
  /// A comp was applied but its audit record could not be written.
  CompAuditFailed,
  /// Money was captured in a currency orders cannot settle in.
  InvalidCurrency,
  /// A completed refund whose loyalty reversal did not happen.
  RefundNotApplied,
}

impl SystemErrorType {
  pub fn as_str(self) -> &'static str {
    match self {
      SystemErrorType::OrphanPayment => "orphan_payment",
      SystemErrorType::PaymentOnClosedOrder => "payment_on_closed_order",
      SystemErrorType::OrphanRefund => "orphan_refund",
      SystemErrorType::CompAuditFailed => "comp_audit_failed",
      SystemErrorType::InvalidCurrency => "invalid_currency",
      SystemErrorType::RefundNotApplied => "refund_not_applied",
    }
  }
}

impl fmt::Display for SystemErrorType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Dead-letter record. Append-only; needs a human to triage it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemError {
  pub id: Uuid,
  pub error_type: SystemErrorType,
  pub severity: Severity,
  pub source_function: String,
  pub order_id: Option<Uuid>,
  pub payment_id: Option<String>,
  pub amount_cents: Option<i64>,
  pub message: String,
  pub context: serde_json::Value,
  pub created_at: DateTime<Utc>,
}

impl SystemError {
  pub fn new(error_type: SystemErrorType, source_function: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      id: Uuid::new_v4(),
      error_type,
      severity: Severity::Critical,
      source_function: source_function.into(),
      order_id: None,
      payment_id: None,
      amount_cents: None,
      message: message.into(),
      context: serde_json::Value::Object(Default::default()),
      created_at: Utc::now(),
    }
  }

  pub fn severity(mut self, severity: Severity) -> Self {
    self.severity = severity;
    self
  }

  pub fn order(mut self, order_id: Uuid) -> Self {
    self.order_id = Some(order_id);
    self
  }

  pub fn payment(mut self, payment_id: impl Into<String>) -> Self {
    self.payment_id = Some(payment_id.into());
    self
  }

  pub fn amount(mut self, amount_cents: i64) -> Self {
    self.amount_cents = Some(amount_cents);
    self
  }

  pub fn context(mut self, context: serde_json::Value) -> Self {
    self.context = context;
    self
  }
}
