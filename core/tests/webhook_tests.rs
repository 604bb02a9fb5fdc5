// tests/webhook_tests.rs
mod common;

use chrono::{Duration, Utc};
use common::*;
use payconfirm::model::{OrderStatus, RefundLock, SystemErrorType};
use payconfirm::{Error, VerifyError};
use serde_json::json;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn completed_payment_confirms_the_order() {
  let h = harness();
  let order = h.pending_order(550, 20);
  let body = payment_event("evt_1", "payment.updated", "pay_1", Some(order.id), 550, "COMPLETED");

  let ack = h.services.webhooks.receive(h.signed(&body)).await.unwrap();

  assert!(ack.received);
  assert!(!ack.duplicate);
  assert_eq!(ack.outcome, "confirmed_guest");
  assert_eq!(h.store.order(order.id).unwrap().status, OrderStatus::Preparing);
  assert_eq!(
    h.store.event_keys(),
    vec![
      "confirmed:pay_1".to_string(),
      "square:payment.updated:evt_1".to_string(),
      "square:payment:pay_1".to_string(),
    ]
  );
}

#[tokio::test]
async fn redelivered_event_is_acknowledged_as_duplicate() {
  let h = harness();
  let order = h.pending_order(550, 20);
  let body = payment_event("evt_dup", "payment.updated", "pay_dup", Some(order.id), 550, "COMPLETED");

  h.services.webhooks.receive(h.signed(&body)).await.unwrap();
  let after_first = h.store.order(order.id).unwrap();
  let ack = h.services.webhooks.receive(h.signed(&body)).await.unwrap();

  assert!(ack.duplicate);
  assert_eq!(ack.outcome, "already_processed");
  assert_eq!(h.store.order(order.id).unwrap(), after_first);
  assert_eq!(h.store.receipts().len(), 1);
}

#[tokio::test]
async fn created_then_updated_for_one_payment_confirms_once() {
  let h = harness();
  let order = h.pending_order(550, 20);
  let created = payment_event("evt_c", "payment.created", "pay_cu", Some(order.id), 550, "COMPLETED");
  let updated = payment_event("evt_u", "payment.updated", "pay_cu", Some(order.id), 550, "COMPLETED");

  let first = h.services.webhooks.receive(h.signed(&created)).await.unwrap();
  let second = h.services.webhooks.receive(h.signed(&updated)).await.unwrap();

  assert_eq!(first.outcome, "confirmed_guest");
  assert!(second.duplicate);
  assert_eq!(second.outcome, "already_processed");
  assert_eq!(h.store.receipts().len(), 1);
}

#[tokio::test]
async fn tampered_body_is_rejected_before_any_write() {
  let h = harness();
  let order = h.pending_order(550, 20);
  let body = payment_event("evt_t", "payment.updated", "pay_t", Some(order.id), 550, "COMPLETED");
  let mut inbound = h.signed(&body);
  let tampered = payment_event("evt_t", "payment.updated", "pay_t", Some(order.id), 1, "COMPLETED");
  inbound.raw_body = serde_json::to_vec(&tampered).unwrap();

  let err = h.services.webhooks.receive(inbound).await.unwrap_err();

  assert!(matches!(err, Error::Verify(VerifyError::SignatureMismatch)));
  assert!(h.store.event_keys().is_empty());
  assert_eq!(h.store.order(order.id).unwrap(), order);
}

#[tokio::test]
async fn missing_signature_is_rejected() {
  let h = harness();
  let body = payment_event("evt_ns", "payment.updated", "pay_ns", None, 550, "COMPLETED");
  let mut inbound = h.signed(&body);
  inbound.signature = None;

  let err = h.services.webhooks.receive(inbound).await.unwrap_err();
  assert!(matches!(err, Error::Verify(VerifyError::MissingSignature)));
}

#[tokio::test]
async fn stale_timestamp_is_rejected() {
  let h = harness();
  let body = payment_event("evt_old", "payment.updated", "pay_old", None, 550, "COMPLETED");
  let mut inbound = h.signed(&body);
  inbound.timestamp = Some((Utc::now() - Duration::minutes(10)).timestamp().to_string());

  let err = h.services.webhooks.receive(inbound).await.unwrap_err();
  assert!(matches!(err, Error::Verify(VerifyError::StaleTimestamp { .. })));
  assert!(h.store.event_keys().is_empty());
}

#[tokio::test]
async fn oversized_body_is_rejected_before_verification() {
  let h = harness();
  let mut inbound = h.signed(&json!({ "event_id": "evt_big", "type": "payment.updated" }));
  inbound.raw_body = vec![b' '; 5000];
  inbound.signature = None;

  let err = h.services.webhooks.receive(inbound).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Verify(VerifyError::PayloadTooLarge { size: 5000, limit: 4096 })
  ));
}

#[tokio::test]
async fn signed_garbage_is_a_payload_error() {
  let h = harness();
  let mut inbound = h.signed(&json!({}));
  inbound.raw_body = b"not json".to_vec();
  let verifier = payconfirm::SignatureVerifier::new(settings().verifier);
  inbound.signature = Some(verifier.sign(&inbound.raw_body).unwrap());

  let err = h.services.webhooks.receive(inbound).await.unwrap_err();
  assert!(matches!(err, Error::Payload(_)));
}

#[tokio::test]
async fn event_without_id_is_a_payload_error() {
  let h = harness();
  let err = h
    .services
    .webhooks
    .receive(h.signed(&json!({ "event_id": "", "type": "payment.updated" })))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Payload(_)));
  assert!(h.store.event_keys().is_empty());
}

#[tokio::test]
async fn payment_without_order_reference_is_acknowledged_and_ignored() {
  let h = harness();
  let body = payment_event("evt_noref", "payment.updated", "pay_noref", None, 550, "COMPLETED");

  let ack = h.services.webhooks.receive(h.signed(&body)).await.unwrap();

  assert_eq!(ack.outcome, "ignored_no_reference");
  assert_eq!(h.store.event_keys(), vec!["square:payment.updated:evt_noref".to_string()]);
}

#[tokio::test]
async fn uncompleted_payment_is_ignored() {
  let h = harness();
  let order = h.pending_order(550, 20);
  let body = payment_event("evt_appr", "payment.updated", "pay_appr", Some(order.id), 550, "APPROVED");

  let ack = h.services.webhooks.receive(h.signed(&body)).await.unwrap();

  assert_eq!(ack.outcome, "ignored_not_completed");
  assert_eq!(h.store.order(order.id).unwrap().status, OrderStatus::Pending);
}

#[tokio::test]
async fn unknown_event_type_is_skipped() {
  let h = harness();
  let body = json!({ "event_id": "evt_inv", "type": "invoice.published", "data": {} });

  let ack = h.services.webhooks.receive(h.signed(&body)).await.unwrap();

  assert_eq!(ack.outcome, "skipped");
  assert_eq!(ack.skipped.as_deref(), Some("invoice.published"));
  assert!(!ack.duplicate);
}

#[tokio::test]
async fn ledger_outage_rejects_so_the_processor_retries() {
  let h = harness();
  let order = h.pending_order(550, 20);
  h.store.fail.ledger.store(true, Ordering::SeqCst);
  let body = payment_event("evt_down", "payment.updated", "pay_down", Some(order.id), 550, "COMPLETED");

  let err = h.services.webhooks.receive(h.signed(&body)).await.unwrap_err();

  assert!(matches!(err, Error::Store(_)));
  assert_eq!(h.store.order(order.id).unwrap(), order);
}

#[tokio::test]
async fn refused_confirmation_is_still_acknowledged() {
  let h = harness();
  let order = h.pending_order(550, 20);
  let body = payment_event("evt_short", "payment.updated", "pay_short", Some(order.id), 100, "COMPLETED");

  let ack = h.services.webhooks.receive(h.signed(&body)).await.unwrap();

  assert!(ack.received);
  assert_eq!(ack.outcome, "amount_mismatch");
  assert_eq!(h.store.order(order.id).unwrap().status, OrderStatus::AmountMismatch);
}

#[tokio::test]
async fn completed_refund_reverses_loyalty_once() {
  let h = harness();
  let order = h.member_order(600);
  let user_id = order.user_id.unwrap();
  let paid = payment_event("evt_p", "payment.updated", "pay_r", Some(order.id), 600, "COMPLETED");
  h.services.webhooks.receive(h.signed(&paid)).await.unwrap();
  assert_eq!(h.store.loyalty_points(user_id), 1);

  let refund = refund_event("evt_r1", "ref_1", "pay_r", 600);
  let ack = h.services.webhooks.receive(h.signed(&refund)).await.unwrap();
  assert_eq!(ack.outcome, "loyalty_reversed");
  assert_eq!(h.store.loyalty_points(user_id), 0);
  assert!(h.store.refund_lock("pay_r").is_none());

  // Same refund, new event id: the refund sub-key stops it.
  let again = refund_event("evt_r2", "ref_1", "pay_r", 600);
  let ack = h.services.webhooks.receive(h.signed(&again)).await.unwrap();
  assert!(ack.duplicate);
  assert_eq!(h.store.loyalty_points(user_id), 0);
  // Refunds never move the order.
  assert_eq!(h.store.order(order.id).unwrap().status, OrderStatus::Preparing);
}

#[tokio::test]
async fn refund_for_guest_order_has_nothing_to_reverse() {
  let h = harness();
  let order = h.pending_order(600, 20);
  let paid = payment_event("evt_gp", "payment.updated", "pay_g", Some(order.id), 600, "COMPLETED");
  h.services.webhooks.receive(h.signed(&paid)).await.unwrap();

  let ack = h
    .services
    .webhooks
    .receive(h.signed(&refund_event("evt_gr", "ref_g", "pay_g", 600)))
    .await
    .unwrap();
  assert_eq!(ack.outcome, "refund_guest");
}

#[tokio::test]
async fn refund_blocked_by_a_held_lock_is_dead_lettered() {
  let h = harness();
  let order = h.member_order(600);
  let user_id = order.user_id.unwrap();
  let paid = payment_event("evt_lp", "payment.updated", "pay_locked", Some(order.id), 600, "COMPLETED");
  h.services.webhooks.receive(h.signed(&paid)).await.unwrap();
  h.store.put_refund_lock(RefundLock {
    payment_id: "pay_locked".to_string(),
    user_id,
    locked_at: Utc::now(),
  });

  let refund = refund_event("evt_lr", "ref_locked", "pay_locked", 600);
  let ack = h.services.webhooks.receive(h.signed(&refund)).await.unwrap();

  assert_eq!(ack.outcome, "refund_in_progress");
  assert_eq!(h.store.loyalty_points(user_id), 1);
  let errors = h.store.system_errors();
  assert_eq!(errors.len(), 1);
  assert_eq!(errors[0].error_type, SystemErrorType::RefundNotApplied);
  assert_eq!(errors[0].order_id, Some(order.id));
  assert_eq!(errors[0].payment_id.as_deref(), Some("pay_locked"));
  assert_eq!(errors[0].amount_cents, Some(600));
  assert_eq!(errors[0].context["refund_id"], "ref_locked");

  // Redelivery stops at the refund key; the dead letter is the record.
  let again = h.services.webhooks.receive(h.signed(&refund)).await.unwrap();
  assert!(again.duplicate);
  assert_eq!(h.store.system_errors().len(), 1);
}

#[tokio::test]
async fn refund_for_unknown_payment_is_dead_lettered() {
  let h = harness();

  let ack = h
    .services
    .webhooks
    .receive(h.signed(&refund_event("evt_or", "ref_orphan", "pay_nowhere", 450)))
    .await
    .unwrap();

  assert_eq!(ack.outcome, "refund_order_not_found");
  let errors = h.store.system_errors();
  assert_eq!(errors.len(), 1);
  assert_eq!(errors[0].error_type, SystemErrorType::OrphanRefund);
  assert_eq!(errors[0].order_id, None);
}
