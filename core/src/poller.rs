// core/src/poller.rs

//! Client-driven polling channel, run as a pipeline:
//! `load_order -> check_monetized -> query_processor -> confirm -> refresh_status`.
//! Every step that knows the answer writes the response and stops the run.

use crate::engine::ConfirmationEngine;
use crate::error::{Error, Result};
use crate::model::{
  CheckoutStatus, ConfirmationRequest, ConfirmedVia, Order, OrderStatus, ProcessorPayment, Reason,
};
use crate::pipeline::{ContextData, Pipeline, PipelineControl, PipelineResult};
use crate::ports::OrderStore;
use crate::upstream::{payment_belongs_to, CheckoutResolution, UpstreamResolver};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
  pub order_id: Uuid,
  /// Optional hint used when the order has no checkout reference.
  #[serde(default)]
  pub payment_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollStatus {
  AlreadyConfirmed,
  NoCheckout,
  PollError,
  Unknown,
  Pending,
  InProgress,
  CancelRequested,
  Canceled,
  CompletedNoPayment,
  PaymentPending,
  Completed,
  ConfirmationFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
  pub status: PollStatus,
  pub order_status: OrderStatus,
  pub confirmed: bool,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<Reason>,
}

impl PollResponse {
  fn hint(status: PollStatus, order_status: OrderStatus, message: impl Into<String>) -> Self {
    Self {
      status,
      order_status,
      confirmed: false,
      message: message.into(),
      reason: None,
    }
  }
}

#[derive(Debug)]
pub struct PollContext {
  pub request: PollRequest,
  pub order: Option<Order>,
  pub payment: Option<ProcessorPayment>,
  pub response: Option<PollResponse>,
}

impl PollContext {
  fn new(request: PollRequest) -> Self {
    Self {
      request,
      order: None,
      payment: None,
      response: None,
    }
  }

  fn order_status(&self) -> OrderStatus {
    self.order.as_ref().map(|o| o.status).unwrap_or(OrderStatus::Pending)
  }
}

fn in_flight_message(status: CheckoutStatus) -> (PollStatus, &'static str) {
  match status {
    CheckoutStatus::Pending => (PollStatus::Pending, "Waiting for customer to tap or insert card"),
    CheckoutStatus::InProgress => (PollStatus::InProgress, "Customer is interacting with terminal"),
    CheckoutStatus::CancelRequested => (PollStatus::CancelRequested, "Cancellation requested"),
    CheckoutStatus::Canceled => (PollStatus::Canceled, "Terminal checkout was cancelled"),
    CheckoutStatus::Completed | CheckoutStatus::Unknown => (PollStatus::Unknown, "Terminal status unknown"),
  }
}

pub struct ActivePoller {
  pipeline: Pipeline<PollContext, Error>,
}

impl ActivePoller {
  pub fn new(orders: Arc<dyn OrderStore>, resolver: UpstreamResolver, engine: ConfirmationEngine) -> Self {
    let mut pipeline = Pipeline::new(
      "active_poll",
      &[
        ("load_order", false),
        ("check_monetized", false),
        ("query_processor", false),
        ("confirm", false),
        ("refresh_status", false),
      ],
    );

    let store = orders.clone();
    pipeline.on_root("load_order", move |ctx: ContextData<PollContext>| {
      let store = store.clone();
      Box::pin(async move {
        let order_id = ctx.read().request.order_id;
        let order = store.get(order_id).await?.ok_or(Error::OrderNotFound(order_id))?;
        ctx.write().order = Some(order);
        Ok::<_, Error>(PipelineControl::Continue)
      })
    });

    pipeline.on_root("check_monetized", |ctx: ContextData<PollContext>| {
      Box::pin(async move {
        let mut guard = ctx.write();
        let (monetized, status) = match guard.order.as_ref() {
          Some(order) => (order.is_monetized(), order.status),
          None => return Err(Error::Internal("poll context lost its order".into())),
        };
        if monetized {
          // No upstream call once money is on the order.
          guard.response = Some(PollResponse::hint(
            PollStatus::AlreadyConfirmed,
            status,
            "Payment already confirmed",
          ));
          return Ok(PipelineControl::Stop);
        }
        Ok::<_, Error>(PipelineControl::Continue)
      })
    });

    let query_resolver = resolver.clone();
    pipeline.on_root("query_processor", move |ctx: ContextData<PollContext>| {
      let resolver = query_resolver.clone();
      Box::pin(async move {
        let (order_id, status, checkout_id, hint) = {
          let guard = ctx.read();
          let order = guard
            .order
            .as_ref()
            .ok_or_else(|| Error::Internal("poll context lost its order".into()))?;
          (order.id, order.status, order.checkout_id.clone(), guard.request.payment_id.clone())
        };

        let via_order_checkout = checkout_id.is_some();
        let resolved = match (checkout_id, hint) {
          (Some(checkout_id), _) => resolver.resolve_checkout(&checkout_id).await,
          (None, Some(payment_id)) => resolver.resolve_payment(&payment_id).await,
          (None, None) => {
            ctx.write().response = Some(PollResponse::hint(
              PollStatus::NoCheckout,
              status,
              "No terminal checkout found for this order",
            ));
            return Ok(PipelineControl::Stop);
          }
        };

        let response = match resolved {
          Err(e) => {
            warn!(%order_id, error = %e, "Processor unreachable; client should poll again.");
            PollResponse::hint(PollStatus::PollError, status, "Could not reach the processor; will retry")
          }
          Ok(CheckoutResolution::NotFound) => {
            PollResponse::hint(PollStatus::Unknown, status, "Checkout not found at the processor")
          }
          Ok(CheckoutResolution::InFlight(checkout_status)) => {
            let (poll_status, message) = in_flight_message(checkout_status);
            PollResponse::hint(poll_status, status, message)
          }
          Ok(CheckoutResolution::Canceled) => {
            PollResponse::hint(PollStatus::Canceled, status, "Terminal checkout was cancelled")
          }
          Ok(CheckoutResolution::CompletedNoPayment) => {
            error!(%order_id, "Checkout completed but lists no payment.");
            PollResponse::hint(
              PollStatus::CompletedNoPayment,
              status,
              "Checkout completed but payment details missing",
            )
          }
          Ok(CheckoutResolution::PaymentPending(_)) => {
            PollResponse::hint(PollStatus::PaymentPending, status, "Payment processing")
          }
          Ok(CheckoutResolution::Completed { payment, reference_id }) => {
            if !payment_belongs_to(reference_id.as_deref(), order_id, via_order_checkout) {
              warn!(%order_id, payment_id = %payment.id, ?reference_id, "Completed payment references another order.");
              PollResponse {
                status: PollStatus::ConfirmationFailed,
                order_status: status,
                confirmed: false,
                message: "Payment does not belong to this order".to_string(),
                reason: Some(Reason::PaymentReuse),
              }
            } else {
              ctx.write().payment = Some(payment);
              return Ok(PipelineControl::Continue);
            }
          }
        };
        ctx.write().response = Some(response);
        Ok::<_, Error>(PipelineControl::Stop)
      })
    });

    let confirm_engine = engine.clone();
    pipeline.on_root("confirm", move |ctx: ContextData<PollContext>| {
      let engine = confirm_engine.clone();
      Box::pin(async move {
        let request = {
          let guard = ctx.read();
          let payment = guard
            .payment
            .as_ref()
            .ok_or_else(|| Error::Internal("confirm step reached without a payment".into()))?;
          ConfirmationRequest {
            order_id: guard.request.order_id,
            payment_id: payment.id.clone(),
            paid_amount_cents: payment.amount_cents,
            currency: payment.currency.clone(),
            confirmed_via: ConfirmedVia::Poll,
          }
        };

        let result = engine.confirm(&request).await;
        let mut guard = ctx.write();
        let status = guard.order_status();
        guard.response = Some(if result.ok {
          info!(order_id = %request.order_id, reason = %result.reason, "Order confirmed via active polling.");
          PollResponse {
            status: PollStatus::Completed,
            order_status: OrderStatus::Preparing,
            confirmed: true,
            message: if result.is_already_processed() {
              "Payment was already confirmed".to_string()
            } else {
              "Payment confirmed; order is now being prepared".to_string()
            },
            reason: Some(result.reason),
          }
        } else {
          warn!(order_id = %request.order_id, reason = %result.reason, "Poll confirmation refused.");
          PollResponse {
            status: PollStatus::ConfirmationFailed,
            order_status: status,
            confirmed: false,
            message: format!("Payment verification issue: {}", result.reason),
            reason: Some(result.reason),
          }
        });
        Ok::<_, Error>(PipelineControl::Continue)
      })
    });

    // Report the status actually stored, e.g. `amount_mismatch` after a refusal.
    pipeline.on_root("refresh_status", move |ctx: ContextData<PollContext>| {
      let store = orders.clone();
      Box::pin(async move {
        let order_id = ctx.read().request.order_id;
        match store.get(order_id).await {
          Ok(Some(order)) => {
            if let Some(response) = ctx.write().response.as_mut() {
              response.order_status = order.status;
              // A spent payment key on a refused payment reads as "already
              // processed"; only money on the order counts as confirmed.
              if response.confirmed && !order.is_monetized() {
                warn!(%order_id, status = %order.status, "Engine reported a duplicate but the order holds no payment.");
                response.status = PollStatus::ConfirmationFailed;
                response.confirmed = false;
                response.message = format!("Payment was not applied; order is {}", order.status);
              }
            }
          }
          Ok(None) => {}
          Err(e) => warn!(%order_id, error = %e, "Could not refresh order status after confirmation."),
        }
        Ok::<_, Error>(PipelineControl::Continue)
      })
    });

    Self { pipeline }
  }

  #[instrument(name = "poller::poll", skip(self, request), fields(order_id = %request.order_id))]
  pub async fn poll(&self, request: PollRequest) -> Result<PollResponse> {
    let ctx = ContextData::new(PollContext::new(request));
    let outcome: PipelineResult = self.pipeline.run(ctx.clone()).await?;
    let response = ctx.write().response.take();
    response.ok_or_else(|| Error::Internal(format!("poll pipeline ended ({:?}) without a response", outcome)))
  }
}
