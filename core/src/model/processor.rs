// core/src/model/processor.rs

//! Shapes consumed from the upstream payment processor. Only the status,
//! amount, currency and payment-id fields matter to the pipeline.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStatus {
  Pending,
  InProgress,
  CancelRequested,
  Canceled,
  Completed,
  #[serde(other)]
  Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
  Approved,
  Pending,
  Completed,
  Canceled,
  Failed,
  #[serde(other)]
  Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalCheckout {
  pub id: String,
  pub status: CheckoutStatus,
  #[serde(default)]
  pub payment_ids: Vec<String>,
  pub reference_id: Option<String>,
  pub amount_cents: i64,
  pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorPayment {
  pub id: String,
  pub status: PaymentState,
  pub amount_cents: i64,
  pub currency: String,
  pub reference_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTerminalCheckout {
  pub idempotency_key: String,
  pub amount_cents: i64,
  pub currency: String,
  pub device_id: String,
  pub reference_id: String,
  pub note: Option<String>,
}
