// core/src/sweeper.rs

use crate::engine::ConfirmationEngine;
use crate::error::Result;
use crate::model::{ConfirmationRequest, ConfirmedVia, Order, OrderStatus, ReconcileWindow};
use crate::ports::OrderStore;
use crate::upstream::{payment_belongs_to, CheckoutResolution, UpstreamResolver};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct SweepConfig {
  /// Younger orders are left to the poller.
  pub min_age: Duration,
  /// Older orders belong to stale-order cleanup instead.
  pub max_age: Duration,
  pub batch_limit: u32,
}

impl Default for SweepConfig {
  fn default() -> Self {
    Self {
      min_age: Duration::seconds(60),
      max_age: Duration::minutes(45),
      batch_limit: 20,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
  pub checked: u32,
  pub reconciled: u32,
  pub cancelled: u32,
  pub still_pending: u32,
  pub errors: u32,
  pub timestamp: DateTime<Utc>,
}

impl SweepSummary {
  fn empty() -> Self {
    Self {
      checked: 0,
      reconciled: 0,
      cancelled: 0,
      still_pending: 0,
      errors: 0,
      timestamp: Utc::now(),
    }
  }
}

enum Tally {
  Reconciled,
  Cancelled,
  StillPending,
  Errored,
}

/// Scheduled backstop: re-derives payment state from the processor for
/// orders the push channel and the poller may have missed.
#[derive(Clone)]
pub struct ReconciliationSweeper {
  orders: Arc<dyn OrderStore>,
  resolver: UpstreamResolver,
  engine: ConfirmationEngine,
  config: SweepConfig,
}

impl ReconciliationSweeper {
  pub fn new(
    orders: Arc<dyn OrderStore>,
    resolver: UpstreamResolver,
    engine: ConfirmationEngine,
    config: SweepConfig,
  ) -> Self {
    Self {
      orders,
      resolver,
      engine,
      config,
    }
  }

  /// One sweep over a bounded batch. Only the batch query can fail the run;
  /// per-order failures are tallied and retried next run.
  #[instrument(name = "sweeper::run", skip(self))]
  pub async fn run(&self) -> Result<SweepSummary> {
    let now = Utc::now();
    let window = ReconcileWindow {
      created_before: now - self.config.min_age,
      created_after: now - self.config.max_age,
      limit: self.config.batch_limit,
    };
    let batch = self.orders.list_reconcilable(window).await?;

    let mut summary = SweepSummary::empty();
    summary.checked = batch.len() as u32;
    if batch.is_empty() {
      info!("No pending orders need reconciliation.");
      return Ok(summary);
    }

    for order in &batch {
      match self.reconcile(order).await {
        Tally::Reconciled => summary.reconciled += 1,
        Tally::Cancelled => summary.cancelled += 1,
        Tally::StillPending => summary.still_pending += 1,
        Tally::Errored => summary.errors += 1,
      }
    }

    info!(
      checked = summary.checked,
      reconciled = summary.reconciled,
      cancelled = summary.cancelled,
      still_pending = summary.still_pending,
      errors = summary.errors,
      "Reconciliation sweep finished."
    );
    Ok(summary)
  }

  async fn reconcile(&self, order: &Order) -> Tally {
    let Some(checkout_id) = order.checkout_id.as_deref() else {
      return Tally::StillPending;
    };

    let resolution = match self.resolver.resolve_checkout(checkout_id).await {
      Ok(resolution) => resolution,
      Err(e) => {
        warn!(order_id = %order.id, %checkout_id, error = %e, "Processor lookup failed; retrying next sweep.");
        return Tally::Errored;
      }
    };

    match resolution {
      CheckoutResolution::Completed { payment, reference_id } => {
        if !payment_belongs_to(reference_id.as_deref(), order.id, true) {
          error!(order_id = %order.id, payment_id = %payment.id, ?reference_id, "Checkout payment references another order.");
          return Tally::Errored;
        }
        let request = ConfirmationRequest {
          order_id: order.id,
          payment_id: payment.id,
          paid_amount_cents: payment.amount_cents,
          currency: payment.currency,
          confirmed_via: ConfirmedVia::Reconciliation,
        };
        let result = self.engine.confirm(&request).await;
        if result.ok {
          if !result.is_already_processed() {
            info!(order_id = %order.id, "Rescued order whose payment was never delivered.");
            return Tally::Reconciled;
          }
          // A spent payment key also answers for refused payments, so only
          // money actually on the order counts as reconciled.
          match self.orders.get(order.id).await {
            Ok(Some(current)) if current.is_monetized() => Tally::Reconciled,
            Ok(current) => {
              error!(
                order_id = %order.id,
                status = ?current.map(|o| o.status),
                "Payment already processed but the order holds no payment."
              );
              Tally::Errored
            }
            Err(e) => {
              warn!(order_id = %order.id, error = %e, "Order re-read failed after reconciliation.");
              Tally::Errored
            }
          }
        } else {
          error!(order_id = %order.id, reason = %result.reason, "Reconciliation confirmation refused.");
          Tally::Errored
        }
      }
      CheckoutResolution::Canceled => self.cancel(order).await,
      CheckoutResolution::InFlight(_) | CheckoutResolution::PaymentPending(_) => Tally::StillPending,
      CheckoutResolution::CompletedNoPayment => {
        error!(order_id = %order.id, %checkout_id, "Checkout completed but lists no payment.");
        Tally::Errored
      }
      CheckoutResolution::NotFound => {
        warn!(order_id = %order.id, %checkout_id, "Checkout not found at the processor.");
        Tally::Errored
      }
    }
  }

  // The engine is never involved in a cancellation.
  async fn cancel(&self, order: &Order) -> Tally {
    match self
      .orders
      .transition(
        order.id,
        &[OrderStatus::Pending, OrderStatus::Unpaid],
        OrderStatus::Cancelled,
        Some("Terminal checkout cancelled at the processor"),
      )
      .await
    {
      Ok(Some(_)) => {
        info!(order_id = %order.id, "Order cancelled after processor cancellation.");
        Tally::Cancelled
      }
      Ok(None) => {
        info!(order_id = %order.id, "Order moved on before it could be cancelled.");
        Tally::StillPending
      }
      Err(e) => {
        warn!(order_id = %order.id, error = %e, "Cancellation write failed.");
        Tally::Errored
      }
    }
  }

  /// Moves unpaid orders older than the sweep window into `abandoned`.
  #[instrument(name = "sweeper::abandon_stale", skip(self))]
  pub async fn abandon_stale(&self) -> Result<u64> {
    let cutoff = Utc::now() - self.config.max_age;
    let moved = self.orders.abandon_stale(cutoff).await?;
    info!(abandoned = moved, %cutoff, "Stale-order cleanup finished.");
    Ok(moved)
  }
}
