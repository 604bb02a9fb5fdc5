// tests/staff_tests.rs
mod common;

use common::*;
use payconfirm::model::{
  CheckoutStatus, OrderStatus, PaymentMethod, Severity, StaffRole, StatusChangeRequest, SystemErrorType,
};
use payconfirm::{Error, TransitionError};
use std::sync::atomic::Ordering;
use uuid::Uuid;

fn change(order_id: Uuid, status: OrderStatus) -> StatusChangeRequest {
  StatusChangeRequest {
    order_id,
    status,
    payment_method: None,
    reason: None,
  }
}

fn comp(order_id: Uuid, reason: &str) -> StatusChangeRequest {
  StatusChangeRequest {
    order_id,
    status: OrderStatus::Preparing,
    payment_method: Some(PaymentMethod::Comp),
    reason: Some(reason.to_string()),
  }
}

#[tokio::test]
async fn staff_walks_a_paid_order_to_completion() {
  let h = harness();
  let barista = staff(StaffRole::Staff);
  let order = h.order_in(OrderStatus::Preparing, 550);

  let ready = h.services.statuses.change_status(&barista, change(order.id, OrderStatus::Ready)).await.unwrap();
  assert_eq!(ready.status, OrderStatus::Ready);
  let done = h
    .services
    .statuses
    .change_status(&barista, change(order.id, OrderStatus::Completed))
    .await
    .unwrap();
  assert_eq!(done.status, OrderStatus::Completed);
}

#[tokio::test]
async fn illegal_transition_names_both_ends() {
  let h = harness();
  let barista = staff(StaffRole::Staff);
  let order = h.order_in(OrderStatus::Completed, 550);

  let err = h
    .services
    .statuses
    .change_status(&barista, change(order.id, OrderStatus::Preparing))
    .await
    .unwrap_err();

  match err {
    TransitionError::Illegal { from, to, .. } => {
      assert_eq!(from, OrderStatus::Completed);
      assert_eq!(to, OrderStatus::Preparing);
    }
    other => panic!("expected illegal transition, got {:?}", other),
  }
  assert_eq!(h.store.order(order.id).unwrap(), order);
}

#[tokio::test]
async fn frozen_order_can_only_be_cancelled() {
  let h = harness();
  let manager = staff(StaffRole::Manager);
  let order = h.order_in(OrderStatus::AmountMismatch, 550);

  let err = h
    .services
    .statuses
    .change_status(&manager, change(order.id, OrderStatus::Ready))
    .await
    .unwrap_err();
  assert!(matches!(err, TransitionError::Illegal { .. }));

  let cancelled = h
    .services
    .statuses
    .change_status(&manager, change(order.id, OrderStatus::Cancelled))
    .await
    .unwrap();
  assert_eq!(cancelled.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
  let h = harness();
  let err = h
    .services
    .statuses
    .change_status(&staff(StaffRole::Admin), change(Uuid::new_v4(), OrderStatus::Ready))
    .await
    .unwrap_err();
  assert!(matches!(err, TransitionError::OrderNotFound(_)));
}

#[tokio::test]
async fn settling_an_unpaid_order_requires_a_method() {
  let h = harness();
  let order = h.order_in(OrderStatus::Unpaid, 550);

  let err = h
    .services
    .statuses
    .change_status(&staff(StaffRole::Staff), change(order.id, OrderStatus::Preparing))
    .await
    .unwrap_err();

  assert!(matches!(err, TransitionError::Validation(_)));
  assert_eq!(h.store.order(order.id).unwrap().status, OrderStatus::Unpaid);
}

#[tokio::test]
async fn cash_settlement_stamps_a_unique_reference() {
  let h = harness();
  let barista = staff(StaffRole::Staff);
  let first = h.order_in(OrderStatus::Unpaid, 550);
  let second = h.order_in(OrderStatus::Unpaid, 450);
  let mut request = change(first.id, OrderStatus::Preparing);
  request.payment_method = Some(PaymentMethod::Cash);

  let settled = h.services.statuses.change_status(&barista, request.clone()).await.unwrap();
  request.order_id = second.id;
  let other = h.services.statuses.change_status(&barista, request).await.unwrap();

  assert_eq!(settled.status, OrderStatus::Preparing);
  assert_eq!(settled.paid_amount_cents, Some(550));
  assert_eq!(settled.payment_confirmed_via.as_deref(), Some("staff_cash"));
  let reference = settled.payment_id.unwrap();
  assert!(reference.starts_with("cash-"));
  assert_ne!(Some(reference), other.payment_id);
}

#[tokio::test]
async fn staff_may_comp_small_orders_with_a_reason() {
  let h = harness();
  let barista = staff(StaffRole::Staff);
  let order = h.order_in(OrderStatus::Pending, 1500);

  let comped = h
    .services
    .statuses
    .change_status(&barista, comp(order.id, "  spilled drink "))
    .await
    .unwrap();

  assert_eq!(comped.status, OrderStatus::Preparing);
  assert_eq!(comped.paid_amount_cents, Some(0));
  assert!(comped.payment_id.unwrap().starts_with("comp-"));
  let audits = h.store.comp_audits();
  assert_eq!(audits.len(), 1);
  assert_eq!(audits[0].reason, "spilled drink");
  assert_eq!(audits[0].staff_id, barista.id);
  assert_eq!(audits[0].amount_cents, 1500);
}

#[tokio::test]
async fn comps_above_the_cap_need_a_manager() {
  let h = harness();
  let order = h.order_in(OrderStatus::Pending, 1501);

  let err = h
    .services
    .statuses
    .change_status(&staff(StaffRole::Staff), comp(order.id, "regular"))
    .await
    .unwrap_err();
  assert!(matches!(err, TransitionError::Forbidden(_)));
  assert_eq!(h.store.order(order.id).unwrap(), order);
  assert!(h.store.comp_audits().is_empty());

  let comped = h
    .services
    .statuses
    .change_status(&staff(StaffRole::Manager), comp(order.id, "regular"))
    .await
    .unwrap();
  assert_eq!(comped.status, OrderStatus::Preparing);
}

#[tokio::test]
async fn comp_without_reason_is_rejected() {
  let h = harness();
  let order = h.order_in(OrderStatus::Pending, 500);

  let err = h
    .services
    .statuses
    .change_status(&staff(StaffRole::Admin), comp(order.id, " x "))
    .await
    .unwrap_err();

  assert!(matches!(err, TransitionError::Validation(_)));
}

#[tokio::test]
async fn failed_comp_audit_keeps_the_comp_and_escalates() {
  let h = harness();
  let order = h.order_in(OrderStatus::Pending, 800);
  h.store.fail.comp_audit.store(true, Ordering::SeqCst);

  let comped = h
    .services
    .statuses
    .change_status(&staff(StaffRole::Staff), comp(order.id, "birthday"))
    .await
    .unwrap();

  assert_eq!(comped.status, OrderStatus::Preparing);
  let letters = h.store.system_errors();
  assert_eq!(letters.len(), 1);
  assert_eq!(letters[0].error_type, SystemErrorType::CompAuditFailed);
  assert_eq!(letters[0].severity, Severity::High);
  assert_eq!(letters[0].order_id, Some(order.id));
}

#[tokio::test]
async fn staff_settlement_blocks_a_later_card_payment() {
  let h = harness();
  let order = h.order_in(OrderStatus::Unpaid, 550);
  let mut request = change(order.id, OrderStatus::Paid);
  request.payment_method = Some(PaymentMethod::Other);
  h.services.statuses.change_status(&staff(StaffRole::Staff), request).await.unwrap();

  let late = h
    .services
    .engine
    .confirm(&confirm_request(&order, "pay_card", 550, payconfirm::model::ConfirmedVia::Webhook))
    .await;

  assert!(late.is_already_processed());
  assert_eq!(h.store.order(order.id).unwrap().status, OrderStatus::Paid);
}

#[tokio::test]
async fn collect_creates_and_attaches_a_terminal_checkout() {
  let h = harness();
  let order = h.order_in(OrderStatus::Unpaid, 725);
  let barista = staff(StaffRole::Staff);

  let armed = h.services.collector.collect(&barista, order.id, "device-1").await.unwrap();

  let checkout_id = armed.checkout_id.clone().unwrap();
  let checkout = h.processor.checkout(&checkout_id).unwrap();
  assert_eq!(checkout.amount_cents, 725);
  assert_eq!(checkout.reference_id, Some(order.id.to_string()));
  assert_eq!(checkout.status, CheckoutStatus::Pending);

  // A second tap returns the same checkout.
  let again = h.services.collector.collect(&barista, order.id, "device-1").await.unwrap();
  assert_eq!(again.checkout_id, Some(checkout_id));
  assert_eq!(h.processor.call_count(), 1);
}

#[tokio::test]
async fn collect_rejects_bad_requests() {
  let h = harness();
  let barista = staff(StaffRole::Staff);
  let pending = h.order_in(OrderStatus::Pending, 500);
  let paid = h.order_in(OrderStatus::Preparing, 500);

  let err = h.services.collector.collect(&barista, pending.id, "  ").await.unwrap_err();
  assert!(matches!(err, Error::Validation(_)));

  let err = h.services.collector.collect(&barista, Uuid::new_v4(), "device-1").await.unwrap_err();
  assert!(matches!(err, Error::OrderNotFound(_)));

  let err = h.services.collector.collect(&barista, paid.id, "device-1").await.unwrap_err();
  assert!(matches!(err, Error::Transition(TransitionError::Conflict { .. })));
}

#[tokio::test]
async fn collect_surfaces_processor_failures() {
  let h = harness();
  let order = h.order_in(OrderStatus::Pending, 500);
  h.processor.unavailable.store(true, Ordering::SeqCst);

  let err = h
    .services
    .collector
    .collect(&staff(StaffRole::Staff), order.id, "device-1")
    .await
    .unwrap_err();

  assert!(matches!(err, Error::Upstream(_)));
  assert!(h.store.order(order.id).unwrap().checkout_id.is_none());
}
