// core/src/model/confirmation.rs

use super::order::ConfirmedVia;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Input to the confirmation engine, identical for every channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
  pub order_id: Uuid,
  pub payment_id: String,
  pub paid_amount_cents: i64,
  pub currency: String,
  pub confirmed_via: ConfirmedVia,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
  Confirmed,
  ConfirmedGuest,
  AlreadyProcessed,
  AlreadyPaid,
  SelfHeal,
  OrderNotFound,
  PaymentReuse,
  AmountMismatch,
  InvalidCurrency,
  OrderClosed,
  IdempotencyError,
  DbError,
}

impl Reason {
  pub fn as_str(self) -> &'static str {
    match self {
      Reason::Confirmed => "confirmed",
      Reason::ConfirmedGuest => "confirmed_guest",
      Reason::AlreadyProcessed => "already_processed",
      Reason::AlreadyPaid => "already_paid",
      Reason::SelfHeal => "self_heal",
      Reason::OrderNotFound => "order_not_found",
      Reason::PaymentReuse => "payment_reuse",
      Reason::AmountMismatch => "amount_mismatch",
      Reason::InvalidCurrency => "invalid_currency",
      Reason::OrderClosed => "order_closed",
      Reason::IdempotencyError => "idempotency_error",
      Reason::DbError => "db_error",
    }
  }
}

impl fmt::Display for Reason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Outcome of one engine call. Returned as a value; the engine never fails
/// with an error, each channel decides its own transport response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResult {
  pub ok: bool,
  pub reason: Reason,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub already_processed: Option<bool>,
}

impl ConfirmationResult {
  /// This call performed the mutation.
  pub fn confirmed(reason: Reason) -> Self {
    Self {
      ok: true,
      reason,
      already_processed: None,
    }
  }

  /// Another call (or channel) already did the work; nothing was mutated.
  pub fn duplicate(reason: Reason) -> Self {
    Self {
      ok: true,
      reason,
      already_processed: Some(true),
    }
  }

  pub fn refused(reason: Reason) -> Self {
    Self {
      ok: false,
      reason,
      already_processed: None,
    }
  }

  pub fn is_already_processed(&self) -> bool {
    self.already_processed.unwrap_or(false)
  }
}
