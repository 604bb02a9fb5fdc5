// core/src/state_machine.rs

//! The order transition table. Every staff-requested transition is checked
//! here before it reaches storage; the storage write itself is still a
//! compare-and-swap on the status that was checked.

use crate::error::TransitionError;
use crate::model::OrderStatus;
use uuid::Uuid;

use OrderStatus::*;

/// Outbound edges for each status. Terminal statuses have none.
pub fn allowed_targets(from: OrderStatus) -> &'static [OrderStatus] {
  match from {
    // `unpaid` is the walk-in flavour of `pending`.
    Pending | Unpaid => &[Paid, Preparing, Cancelled],
    Paid => &[Preparing, Cancelled],
    // Self-loop: an idempotent re-confirmation.
    Preparing => &[Preparing, Ready, Cancelled],
    Ready => &[Completed, Cancelled],
    Abandoned => &[Preparing, Cancelled],
    AmountMismatch => &[Cancelled],
    Completed | Cancelled | Refunded => &[],
  }
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
  allowed_targets(from).contains(&to)
}

/// Rejects any pair absent from the table, naming both ends.
pub fn check(order_id: Uuid, from: OrderStatus, to: OrderStatus) -> Result<(), TransitionError> {
  if can_transition(from, to) {
    Ok(())
  } else {
    Err(TransitionError::Illegal { order_id, from, to })
  }
}

/// Every status with an edge into `to`; the prior-state set of a conditional update.
pub fn sources_of(to: OrderStatus) -> Vec<OrderStatus> {
  OrderStatus::ALL
    .iter()
    .copied()
    .filter(|from| can_transition(*from, to))
    .collect()
}
