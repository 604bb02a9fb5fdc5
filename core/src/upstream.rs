// core/src/upstream.rs

//! Reads authoritative payment state from the processor, the same way for
//! the poller and the sweeper. Every call is bounded by a timeout.

use crate::error::UpstreamError;
use crate::model::{CheckoutStatus, PaymentState, ProcessorPayment};
use crate::ports::PaymentProcessor;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutResolution {
  /// The processor reports money captured. Amount and currency are authoritative.
  Completed {
    payment: ProcessorPayment,
    /// Local order id the checkout or payment was created for, if the processor echoes one.
    reference_id: Option<String>,
  },
  /// The checkout finished but lists no payment yet.
  CompletedNoPayment,
  /// A payment exists but has not completed.
  PaymentPending(PaymentState),
  /// Awaiting the customer, in progress or cancel requested.
  InFlight(CheckoutStatus),
  Canceled,
  NotFound,
}

/// Whether a completed payment may be applied to `order_id`. A reference to
/// another order always refuses. A missing reference is accepted only when
/// the payment was reached through the order's own terminal checkout.
pub fn payment_belongs_to(reference_id: Option<&str>, order_id: Uuid, via_order_checkout: bool) -> bool {
  match reference_id {
    Some(reference) => reference == order_id.to_string(),
    None => via_order_checkout,
  }
}

#[derive(Clone)]
pub struct UpstreamResolver {
  processor: Arc<dyn PaymentProcessor>,
  timeout: Duration,
}

impl UpstreamResolver {
  pub fn new(processor: Arc<dyn PaymentProcessor>, timeout: Duration) -> Self {
    Self { processor, timeout }
  }

  pub fn processor(&self) -> &Arc<dyn PaymentProcessor> {
    &self.processor
  }

  pub(crate) async fn bounded<T>(
    &self,
    call: impl Future<Output = Result<T, UpstreamError>>,
  ) -> Result<T, UpstreamError> {
    tokio::time::timeout(self.timeout, call)
      .await
      .map_err(|_| UpstreamError::Timeout(self.timeout))?
  }

  pub async fn resolve_checkout(&self, checkout_id: &str) -> Result<CheckoutResolution, UpstreamError> {
    let Some(checkout) = self.bounded(self.processor.get_checkout(checkout_id)).await? else {
      return Ok(CheckoutResolution::NotFound);
    };
    debug!(%checkout_id, status = ?checkout.status, "Checkout status fetched.");

    match checkout.status {
      CheckoutStatus::Completed => {
        // Terminal checkouts carry exactly one payment.
        let Some(payment_id) = checkout.payment_ids.first() else {
          return Ok(CheckoutResolution::CompletedNoPayment);
        };
        let resolution = self.resolve_payment(payment_id).await?;
        Ok(match resolution {
          CheckoutResolution::Completed { payment, reference_id } => CheckoutResolution::Completed {
            payment,
            reference_id: checkout.reference_id.or(reference_id),
          },
          other => other,
        })
      }
      CheckoutStatus::Canceled => Ok(CheckoutResolution::Canceled),
      other => Ok(CheckoutResolution::InFlight(other)),
    }
  }

  pub async fn resolve_payment(&self, payment_id: &str) -> Result<CheckoutResolution, UpstreamError> {
    let Some(payment) = self.bounded(self.processor.get_payment(payment_id)).await? else {
      return Ok(CheckoutResolution::NotFound);
    };
    debug!(%payment_id, status = ?payment.status, "Payment status fetched.");

    if payment.status == PaymentState::Completed {
      let reference_id = payment.reference_id.clone();
      Ok(CheckoutResolution::Completed { payment, reference_id })
    } else {
      Ok(CheckoutResolution::PaymentPending(payment.status))
    }
  }
}
