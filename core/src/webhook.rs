// core/src/webhook.rs

//! Push-notification channel. Each inbound delivery runs the pipeline
//! `enforce_body_limit -> verify_signature -> parse_event -> reserve_event
//! -> route_event -> acknowledge`. Nothing is written before
//! `reserve_event`, and every step after it acknowledges with 200 even when
//! the confirmation itself is refused.

use crate::engine::ConfirmationEngine;
use crate::error::{Error, Result};
use crate::ledger::IdempotencyGate;
use crate::model::{ConfirmationRequest, ConfirmedVia, EventKey, PaymentState, Reservation};
use crate::pipeline::{ContextData, Pipeline, PipelineControl};
use crate::refund::RefundCoordinator;
use crate::verify::SignatureVerifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// One delivery as seen by the transport: unparsed body plus the two headers.
#[derive(Debug, Clone)]
pub struct InboundWebhook {
  pub source: String,
  pub raw_body: Vec<u8>,
  pub signature: Option<String>,
  pub timestamp: Option<String>,
  pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
  pub received: bool,
  pub duplicate: bool,
  pub outcome: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub skipped: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Money {
  pub amount: i64,
  pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentObject {
  pub id: String,
  pub status: PaymentState,
  #[serde(default)]
  pub amount_money: Option<Money>,
  #[serde(default)]
  pub reference_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundObject {
  pub id: String,
  pub status: String,
  pub payment_id: String,
  #[serde(default)]
  pub amount_money: Option<Money>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventObject {
  #[serde(default)]
  pub payment: Option<PaymentObject>,
  #[serde(default)]
  pub refund: Option<RefundObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventData {
  #[serde(default)]
  pub object: EventObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
  pub event_id: String,
  #[serde(rename = "type")]
  pub event_type: String,
  #[serde(default)]
  pub data: EventData,
}

#[derive(Debug)]
pub struct WebhookContext {
  pub inbound: InboundWebhook,
  pub payload: Option<serde_json::Value>,
  pub event: Option<WebhookEvent>,
  pub duplicate: bool,
  pub outcome: Option<String>,
  pub skipped: Option<String>,
}

impl WebhookContext {
  fn new(inbound: InboundWebhook) -> Self {
    Self {
      inbound,
      payload: None,
      event: None,
      duplicate: false,
      outcome: None,
      skipped: None,
    }
  }

  fn finish(&mut self, outcome: impl Into<String>, duplicate: bool) {
    self.outcome = Some(outcome.into());
    self.duplicate = duplicate;
  }
}

pub struct WebhookReceiver {
  pipeline: Pipeline<WebhookContext, Error>,
}

impl WebhookReceiver {
  pub fn new(
    verifier: SignatureVerifier,
    gate: IdempotencyGate,
    engine: ConfirmationEngine,
    refunds: RefundCoordinator,
  ) -> Self {
    let mut pipeline = Pipeline::new(
      "webhook",
      &[
        ("enforce_body_limit", false),
        ("verify_signature", false),
        ("parse_event", false),
        ("reserve_event", false),
        ("route_event", false),
        ("acknowledge", false),
      ],
    );

    let size_check = verifier.clone();
    pipeline.on_root("enforce_body_limit", move |ctx: ContextData<WebhookContext>| {
      let verifier = size_check.clone();
      Box::pin(async move {
        verifier.check_size(&ctx.read().inbound.raw_body)?;
        Ok::<_, Error>(PipelineControl::Continue)
      })
    });

    pipeline.on_root("verify_signature", move |ctx: ContextData<WebhookContext>| {
      let verifier = verifier.clone();
      Box::pin(async move {
        let guard = ctx.read();
        let inbound = &guard.inbound;
        verifier.verify(
          &inbound.raw_body,
          inbound.signature.as_deref(),
          inbound.timestamp.as_deref(),
          inbound.received_at,
        )?;
        Ok::<_, Error>(PipelineControl::Continue)
      })
    });

    pipeline.on_root("parse_event", |ctx: ContextData<WebhookContext>| {
      Box::pin(async move {
        let mut guard = ctx.write();
        let payload: serde_json::Value =
          serde_json::from_slice(&guard.inbound.raw_body).map_err(|e| Error::Payload(e.to_string()))?;
        let event: WebhookEvent = serde_json::from_value(payload.clone()).map_err(|e| Error::Payload(e.to_string()))?;
        if event.event_id.trim().is_empty() || event.event_type.trim().is_empty() {
          return Err(Error::Payload("event_id and type are required".to_string()));
        }
        guard.payload = Some(payload);
        guard.event = Some(event);
        Ok(PipelineControl::Continue)
      })
    });

    let event_gate = gate.clone();
    pipeline.on_root("reserve_event", move |ctx: ContextData<WebhookContext>| {
      let gate = event_gate.clone();
      Box::pin(async move {
        let (key, event_type, source, payload) = {
          let guard = ctx.read();
          let event = guard.event.as_ref().ok_or_else(|| Error::Internal("event not parsed".into()))?;
          (
            EventKey::webhook(&guard.inbound.source, &event.event_type, &event.event_id),
            event.event_type.clone(),
            guard.inbound.source.clone(),
            guard.payload.clone().unwrap_or_default(),
          )
        };
        match gate.reserve(key, &event_type, &source, payload).await? {
          Reservation::Reserved => Ok(PipelineControl::Continue),
          Reservation::AlreadyProcessed => {
            info!(%event_type, "Duplicate webhook delivery acknowledged.");
            ctx.write().finish("already_processed", true);
            // Duplicates still get acknowledged.
            Ok::<_, Error>(PipelineControl::Continue)
          }
        }
      })
    });

    pipeline.set_skip_condition("route_event", |ctx: &WebhookContext| ctx.duplicate);
    pipeline.on_root("route_event", move |ctx: ContextData<WebhookContext>| {
      let gate = gate.clone();
      let engine = engine.clone();
      let refunds = refunds.clone();
      Box::pin(async move {
        let (source, event) = {
          let guard = ctx.read();
          let event = guard.event.clone().ok_or_else(|| Error::Internal("event not parsed".into()))?;
          (guard.inbound.source.clone(), event)
        };

        match event.event_type.as_str() {
          "payment.created" | "payment.updated" => {
            let (outcome, duplicate) = route_payment(&gate, &engine, &source, &event).await?;
            ctx.write().finish(outcome, duplicate);
          }
          "refund.created" | "refund.updated" => {
            let (outcome, duplicate) = route_refund(&gate, &refunds, &source, &event).await?;
            ctx.write().finish(outcome, duplicate);
          }
          other => {
            info!(event_type = %other, "Unhandled webhook event type acknowledged.");
            let mut guard = ctx.write();
            guard.skipped = Some(other.to_string());
            guard.finish("skipped", false);
          }
        }
        Ok::<_, Error>(PipelineControl::Continue)
      })
    });

    pipeline.on_root("acknowledge", |ctx: ContextData<WebhookContext>| {
      Box::pin(async move {
        let mut guard = ctx.write();
        if guard.outcome.is_none() {
          guard.outcome = Some("ignored".to_string());
        }
        info!(
          outcome = guard.outcome.as_deref().unwrap_or_default(),
          duplicate = guard.duplicate,
          "Webhook acknowledged."
        );
        Ok::<_, Error>(PipelineControl::Continue)
      })
    });

    Self { pipeline }
  }

  /// Runs one delivery. `Err` means reject: verification and payload errors
  /// map to 4xx, ledger failures to 5xx so the processor retries.
  #[instrument(
    name = "webhook::receive",
    skip(self, inbound),
    fields(source = %inbound.source, body_bytes = inbound.raw_body.len())
  )]
  pub async fn receive(&self, inbound: InboundWebhook) -> Result<WebhookAck> {
    let ctx = ContextData::new(WebhookContext::new(inbound));
    self.pipeline.run(ctx.clone()).await?;
    let mut guard = ctx.write();
    Ok(WebhookAck {
      received: true,
      duplicate: guard.duplicate,
      outcome: guard.outcome.take().unwrap_or_else(|| "ignored".to_string()),
      skipped: guard.skipped.take(),
    })
  }
}

async fn route_payment(
  gate: &IdempotencyGate,
  engine: &ConfirmationEngine,
  source: &str,
  event: &WebhookEvent,
) -> Result<(String, bool)> {
  let Some(payment) = event.data.object.payment.as_ref() else {
    return Ok(("ignored_no_payment".to_string(), false));
  };
  if payment.status != PaymentState::Completed {
    return Ok(("ignored_not_completed".to_string(), false));
  }
  // Processor test events carry no reference to a local order.
  let Some(order_id) = payment.reference_id.as_deref().and_then(|r| Uuid::parse_str(r.trim()).ok()) else {
    warn!(payment_id = %payment.id, "Completed payment without a usable order reference; ignoring.");
    return Ok(("ignored_no_reference".to_string(), false));
  };
  let Some(money) = payment.amount_money.as_ref() else {
    warn!(payment_id = %payment.id, "Completed payment without an amount; ignoring.");
    return Ok(("ignored_no_amount".to_string(), false));
  };

  let sub_key = EventKey::sub_resource(source, "payment", &payment.id);
  let payload = serde_json::json!({ "event_id": event.event_id, "order_id": order_id });
  if gate.reserve(sub_key, "payment", source, payload).await? == Reservation::AlreadyProcessed {
    return Ok(("already_processed".to_string(), true));
  }

  let result = engine
    .confirm(&ConfirmationRequest {
      order_id,
      payment_id: payment.id.clone(),
      paid_amount_cents: money.amount,
      currency: money.currency.clone(),
      confirmed_via: ConfirmedVia::Webhook,
    })
    .await;
  if !result.ok {
    warn!(%order_id, reason = %result.reason, "Webhook confirmation refused; acknowledging anyway.");
  }
  Ok((result.reason.as_str().to_string(), result.is_already_processed()))
}

async fn route_refund(
  gate: &IdempotencyGate,
  refunds: &RefundCoordinator,
  source: &str,
  event: &WebhookEvent,
) -> Result<(String, bool)> {
  let Some(refund) = event.data.object.refund.as_ref() else {
    return Ok(("ignored_no_refund".to_string(), false));
  };
  if !refund.status.eq_ignore_ascii_case("COMPLETED") {
    return Ok(("ignored_not_completed".to_string(), false));
  }

  let sub_key = EventKey::sub_resource(source, "refund", &refund.id);
  let payload = serde_json::json!({ "event_id": event.event_id, "payment_id": refund.payment_id });
  if gate.reserve(sub_key, "refund", source, payload).await? == Reservation::AlreadyProcessed {
    return Ok(("already_processed".to_string(), true));
  }

  let amount = refund.amount_money.as_ref().map(|m| m.amount).unwrap_or_default();
  let outcome = refunds.process(&refund.id, &refund.payment_id, amount).await;
  Ok((outcome.as_str().to_string(), false))
}
