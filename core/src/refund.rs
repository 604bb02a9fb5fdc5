// core/src/refund.rs

use crate::dead_letter::DeadLetterRecorder;
use crate::model::{RefundLock, Severity, SystemError, SystemErrorType};
use crate::ports::{LoyaltyLedger, OrderStore, RefundLockStore};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundOutcome {
  LoyaltyReversed,
  GuestOrder,
  OrderNotFound,
  /// Another refund for this payment holds the lock.
  LockBusy,
  ReversalFailed,
  DbError,
}

impl RefundOutcome {
  pub fn as_str(self) -> &'static str {
    match self {
      RefundOutcome::LoyaltyReversed => "loyalty_reversed",
      RefundOutcome::GuestOrder => "refund_guest",
      RefundOutcome::OrderNotFound => "refund_order_not_found",
      RefundOutcome::LockBusy => "refund_in_progress",
      RefundOutcome::ReversalFailed => "loyalty_reversal_failed",
      RefundOutcome::DbError => "db_error",
    }
  }

  /// Outcomes where a completed refund left loyalty untouched.
  pub fn is_lost(self) -> bool {
    matches!(
      self,
      RefundOutcome::OrderNotFound | RefundOutcome::LockBusy | RefundOutcome::ReversalFailed | RefundOutcome::DbError
    )
  }
}

const SOURCE_FUNCTION: &str = "refund_coordinator";

/// Reverses loyalty for a completed refund while holding the advisory
/// refund lock, so a concurrent confirmation does not credit the same user.
/// The order's status is not touched. The refund's ledger key is spent
/// before this runs, so every lost reversal leaves a dead letter.
#[derive(Clone)]
pub struct RefundCoordinator {
  orders: Arc<dyn OrderStore>,
  locks: Arc<dyn RefundLockStore>,
  loyalty: Arc<dyn LoyaltyLedger>,
  dead_letters: DeadLetterRecorder,
  lock_ttl: Duration,
}

impl RefundCoordinator {
  pub fn new(
    orders: Arc<dyn OrderStore>,
    locks: Arc<dyn RefundLockStore>,
    loyalty: Arc<dyn LoyaltyLedger>,
    dead_letters: DeadLetterRecorder,
    lock_ttl: Duration,
  ) -> Self {
    Self {
      orders,
      locks,
      loyalty,
      dead_letters,
      lock_ttl,
    }
  }

  #[instrument(name = "refund::process", skip(self))]
  pub async fn process(&self, refund_id: &str, payment_id: &str, amount_cents: i64) -> RefundOutcome {
    let (outcome, order_id) = self.apply(payment_id, amount_cents).await;
    if outcome.is_lost() {
      self.escalate(outcome, refund_id, payment_id, amount_cents, order_id).await;
    }
    outcome
  }

  async fn escalate(
    &self,
    outcome: RefundOutcome,
    refund_id: &str,
    payment_id: &str,
    amount_cents: i64,
    order_id: Option<Uuid>,
  ) {
    let (error_type, severity) = match outcome {
      RefundOutcome::OrderNotFound => (SystemErrorType::OrphanRefund, Severity::Warning),
      _ => (SystemErrorType::RefundNotApplied, Severity::High),
    };
    let mut entry = SystemError::new(
      error_type,
      SOURCE_FUNCTION,
      format!("Refund {} completed upstream but loyalty was not reversed: {}", refund_id, outcome.as_str()),
    )
    .severity(severity)
    .payment(payment_id)
    .amount(amount_cents)
    .context(json!({ "refund_id": refund_id, "outcome": outcome.as_str() }));
    if let Some(order_id) = order_id {
      entry = entry.order(order_id);
    }
    self.dead_letters.record(entry).await;
  }

  async fn apply(&self, payment_id: &str, amount_cents: i64) -> (RefundOutcome, Option<Uuid>) {
    let order = match self.orders.find_by_payment_id(payment_id).await {
      Ok(Some(order)) => order,
      Ok(None) => {
        warn!("Refund references a payment no order carries.");
        return (RefundOutcome::OrderNotFound, None);
      }
      Err(e) => {
        error!(error = %e, "Order lookup for refund failed.");
        return (RefundOutcome::DbError, None);
      }
    };
    let Some(user_id) = order.user_id else {
      return (RefundOutcome::GuestOrder, Some(order.id));
    };

    let now = Utc::now();
    let lock = RefundLock {
      payment_id: payment_id.to_string(),
      user_id,
      locked_at: now,
    };
    match self.locks.acquire(&lock, now - self.lock_ttl).await {
      Ok(true) => {}
      Ok(false) => {
        warn!(%user_id, "Refund lock already held.");
        return (RefundOutcome::LockBusy, Some(order.id));
      }
      Err(e) => {
        error!(error = %e, "Refund lock could not be taken.");
        return (RefundOutcome::DbError, Some(order.id));
      }
    }

    let outcome = match self.loyalty.reverse(user_id, amount_cents, payment_id).await {
      Ok(update) => {
        info!(order_id = %order.id, %user_id, points = update.points, "Loyalty reversed for refund.");
        RefundOutcome::LoyaltyReversed
      }
      Err(e) => {
        warn!(order_id = %order.id, %user_id, error = %e, "Loyalty reversal failed.");
        RefundOutcome::ReversalFailed
      }
    };

    // An unreleased lock simply expires after its TTL.
    if let Err(e) = self.locks.release(payment_id).await {
      warn!(error = %e, "Refund lock release failed; it will expire.");
    }
    (outcome, Some(order.id))
  }
}
