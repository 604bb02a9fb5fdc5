// core/src/model/order.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Pending,
  Unpaid,
  Paid,
  Preparing,
  Ready,
  Completed,
  Cancelled,
  Refunded,
  Abandoned,
  AmountMismatch,
}

impl OrderStatus {
  pub const ALL: [OrderStatus; 10] = [
    OrderStatus::Pending,
    OrderStatus::Unpaid,
    OrderStatus::Paid,
    OrderStatus::Preparing,
    OrderStatus::Ready,
    OrderStatus::Completed,
    OrderStatus::Cancelled,
    OrderStatus::Refunded,
    OrderStatus::Abandoned,
    OrderStatus::AmountMismatch,
  ];

  /// Statuses that prove money has already been applied to the order.
  pub const MONETIZED: [OrderStatus; 5] = [
    OrderStatus::Paid,
    OrderStatus::Preparing,
    OrderStatus::Ready,
    OrderStatus::Completed,
    OrderStatus::Refunded,
  ];

  /// Statuses a payment confirmation may move out of.
  pub const PAYABLE: [OrderStatus; 3] = [OrderStatus::Pending, OrderStatus::Unpaid, OrderStatus::Abandoned];

  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Unpaid => "unpaid",
      OrderStatus::Paid => "paid",
      OrderStatus::Preparing => "preparing",
      OrderStatus::Ready => "ready",
      OrderStatus::Completed => "completed",
      OrderStatus::Cancelled => "cancelled",
      OrderStatus::Refunded => "refunded",
      OrderStatus::Abandoned => "abandoned",
      OrderStatus::AmountMismatch => "amount_mismatch",
    }
  }

  pub fn is_monetized(self) -> bool {
    Self::MONETIZED.contains(&self)
  }

  pub fn is_payable(self) -> bool {
    Self::PAYABLE.contains(&self)
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded)
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown order status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
  type Err = UnknownStatus;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    OrderStatus::ALL
      .iter()
      .copied()
      .find(|status| status.as_str() == s)
      .ok_or_else(|| UnknownStatus(s.to_string()))
  }
}

/// Tag recorded with a confirmation. Used for logging and audit only, never
/// as a branch condition inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmedVia {
  Webhook,
  Poll,
  Reconciliation,
}

impl ConfirmedVia {
  pub fn as_str(self) -> &'static str {
    match self {
      ConfirmedVia::Webhook => "webhook",
      ConfirmedVia::Poll => "poll",
      ConfirmedVia::Reconciliation => "reconciliation",
    }
  }
}

impl fmt::Display for ConfirmedVia {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
  pub id: Uuid,
  pub user_id: Option<Uuid>,
  pub status: OrderStatus,
  pub payment_id: Option<String>,
  pub checkout_id: Option<String>,
  pub total_amount_cents: i64,
  pub paid_amount_cents: Option<i64>,
  pub paid_at: Option<DateTime<Utc>>,
  pub payment_confirmed_via: Option<String>,
  pub currency: String,
  pub customer_name: Option<String>,
  pub customer_email: Option<String>,
  pub notes: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  /// A freshly checked-out order awaiting payment.
  pub fn pending(total_amount_cents: i64, currency: &str) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4(),
      user_id: None,
      status: OrderStatus::Pending,
      payment_id: None,
      checkout_id: None,
      total_amount_cents,
      paid_amount_cents: None,
      paid_at: None,
      payment_confirmed_via: None,
      currency: currency.to_string(),
      customer_name: None,
      customer_email: None,
      notes: None,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn with_user(mut self, user_id: Uuid) -> Self {
    self.user_id = Some(user_id);
    self
  }

  pub fn with_checkout(mut self, checkout_id: &str) -> Self {
    self.checkout_id = Some(checkout_id.to_string());
    self
  }

  pub fn with_status(mut self, status: OrderStatus) -> Self {
    self.status = status;
    self
  }

  pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
    self.created_at = at;
    self.updated_at = at;
    self
  }

  /// True once money has been applied, judged by status or by an attached payment.
  pub fn is_monetized(&self) -> bool {
    self.status.is_monetized() || self.payment_id.is_some()
  }
}

/// The payment fields written by a confirming compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentStamp {
  pub order_id: Uuid,
  pub payment_id: String,
  pub paid_amount_cents: i64,
  pub paid_at: DateTime<Utc>,
  pub confirmed_via: String,
  /// Status the order moves into when the swap succeeds.
  pub status: OrderStatus,
}

/// Selection window for the reconciliation sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileWindow {
  pub created_before: DateTime<Utc>,
  pub created_after: DateTime<Utc>,
  pub limit: u32,
}
