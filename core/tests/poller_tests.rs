// tests/poller_tests.rs
mod common;

use common::*;
use payconfirm::model::{CheckoutStatus, OrderStatus, PaymentState, ProcessorPayment, Reason};
use payconfirm::{Error, PollRequest, PollStatus};
use std::sync::atomic::Ordering;
use std::time::Duration;
use uuid::Uuid;

fn poll_for(order_id: Uuid) -> PollRequest {
  PollRequest {
    order_id,
    payment_id: None,
  }
}

#[tokio::test]
async fn monetized_order_short_circuits_without_upstream_call() {
  let h = harness();
  let order = h.order_in(OrderStatus::Preparing, 550);

  let response = h.services.poller.poll(poll_for(order.id)).await.unwrap();

  assert_eq!(response.status, PollStatus::AlreadyConfirmed);
  assert_eq!(response.order_status, OrderStatus::Preparing);
  assert_eq!(h.processor.call_count(), 0);
}

#[tokio::test]
async fn order_without_checkout_or_hint_has_nothing_to_poll() {
  let h = harness();
  let order = h.pending_order(550, 10);

  let response = h.services.poller.poll(poll_for(order.id)).await.unwrap();

  assert_eq!(response.status, PollStatus::NoCheckout);
  assert!(!response.confirmed);
  assert_eq!(h.processor.call_count(), 0);
}

#[tokio::test]
async fn in_flight_checkouts_are_reported_verbatim() {
  let h = harness();
  let cases = [
    (CheckoutStatus::Pending, PollStatus::Pending, "Waiting for customer to tap or insert card"),
    (CheckoutStatus::InProgress, PollStatus::InProgress, "Customer is interacting with terminal"),
    (CheckoutStatus::CancelRequested, PollStatus::CancelRequested, "Cancellation requested"),
    (CheckoutStatus::Canceled, PollStatus::Canceled, "Terminal checkout was cancelled"),
  ];
  for (checkout_status, expected, message) in cases {
    let order = h.pending_order(550, 10);
    let order = h.checkout_for(&order, checkout_status, 10);

    let response = h.services.poller.poll(poll_for(order.id)).await.unwrap();

    assert_eq!(response.status, expected);
    assert_eq!(response.message, message);
    assert_eq!(response.order_status, OrderStatus::Pending);
    assert!(!response.confirmed);
  }
}

#[tokio::test]
async fn completed_checkout_confirms_through_the_engine() {
  let h = harness();
  let order = h.pending_order(550, 10);
  let order = h.checkout_for(&order, CheckoutStatus::Pending, 10);
  h.complete_checkout(&order, "pay_poll", 550);

  let response = h.services.poller.poll(poll_for(order.id)).await.unwrap();

  assert_eq!(response.status, PollStatus::Completed);
  assert!(response.confirmed);
  assert_eq!(response.order_status, OrderStatus::Preparing);
  assert_eq!(response.reason, Some(Reason::ConfirmedGuest));
  let stored = h.store.order(order.id).unwrap();
  assert_eq!(stored.payment_confirmed_via.as_deref(), Some("poll"));

  // Next poll: already confirmed, no processor call.
  let calls = h.processor.call_count();
  let again = h.services.poller.poll(poll_for(order.id)).await.unwrap();
  assert_eq!(again.status, PollStatus::AlreadyConfirmed);
  assert_eq!(h.processor.call_count(), calls);
}

#[tokio::test]
async fn processor_outage_is_a_retryable_poll_error() {
  let h = harness();
  let order = h.pending_order(550, 10);
  let order = h.checkout_for(&order, CheckoutStatus::Pending, 10);
  h.processor.unavailable.store(true, Ordering::SeqCst);

  let response = h.services.poller.poll(poll_for(order.id)).await.unwrap();

  assert_eq!(response.status, PollStatus::PollError);
  assert_eq!(h.store.order(order.id).unwrap(), order);
}

#[tokio::test]
async fn slow_processor_times_out_into_poll_error() {
  let h = harness();
  let order = h.pending_order(550, 10);
  let order = h.checkout_for(&order, CheckoutStatus::Pending, 10);
  *h.processor.delay.lock() = Some(Duration::from_millis(600));

  let response = h.services.poller.poll(poll_for(order.id)).await.unwrap();

  assert_eq!(response.status, PollStatus::PollError);
}

#[tokio::test]
async fn completed_checkout_without_payment_is_flagged() {
  let h = harness();
  let order = h.pending_order(550, 10);
  let order = h.checkout_for(&order, CheckoutStatus::Completed, 10);

  let response = h.services.poller.poll(poll_for(order.id)).await.unwrap();

  assert_eq!(response.status, PollStatus::CompletedNoPayment);
  assert_eq!(response.message, "Checkout completed but payment details missing");
}

#[tokio::test]
async fn approved_but_uncaptured_payment_is_still_processing() {
  let h = harness();
  let order = h.pending_order(550, 10);
  let order = h.checkout_for(&order, CheckoutStatus::Pending, 10);
  h.complete_checkout(&order, "pay_approved", 550);
  h.processor.put_payment(ProcessorPayment {
    id: "pay_approved".to_string(),
    status: PaymentState::Approved,
    amount_cents: 550,
    currency: "USD".to_string(),
    reference_id: Some(order.id.to_string()),
  });

  let response = h.services.poller.poll(poll_for(order.id)).await.unwrap();

  assert_eq!(response.status, PollStatus::PaymentPending);
  assert_eq!(h.store.order(order.id).unwrap().status, OrderStatus::Pending);
}

#[tokio::test]
async fn amount_mismatch_reports_the_frozen_status() {
  let h = harness();
  let order = h.pending_order(550, 10);
  let order = h.checkout_for(&order, CheckoutStatus::Pending, 10);
  h.complete_checkout(&order, "pay_under", 300);

  let response = h.services.poller.poll(poll_for(order.id)).await.unwrap();

  assert_eq!(response.status, PollStatus::ConfirmationFailed);
  assert_eq!(response.reason, Some(Reason::AmountMismatch));
  assert_eq!(response.order_status, OrderStatus::AmountMismatch);
  assert!(response.message.contains("amount_mismatch"));
}

#[tokio::test]
async fn repeated_poll_on_a_frozen_order_never_reports_confirmed() {
  let h = harness();
  let order = h.pending_order(550, 10);
  let order = h.checkout_for(&order, CheckoutStatus::Pending, 10);
  h.complete_checkout(&order, "pay_frozen", 300);

  let first = h.services.poller.poll(poll_for(order.id)).await.unwrap();
  assert_eq!(first.reason, Some(Reason::AmountMismatch));

  // The payment key is spent; the engine now answers "already processed".
  let second = h.services.poller.poll(poll_for(order.id)).await.unwrap();
  assert!(!second.confirmed);
  assert_eq!(second.status, PollStatus::ConfirmationFailed);
  assert_eq!(second.order_status, OrderStatus::AmountMismatch);
  assert!(second.message.contains("amount_mismatch"));
  assert!(h.store.order(order.id).unwrap().payment_id.is_none());
}

#[tokio::test]
async fn checkout_payment_without_reference_belongs_to_the_checkout_order() {
  let h = harness();
  let order = h.pending_order(550, 10);
  let order = h.checkout_for(&order, CheckoutStatus::Pending, 10);
  h.complete_checkout(&order, "pay_unlabelled", 550);
  let checkout_id = order.checkout_id.clone().unwrap();
  let mut checkout = h.processor.checkout(&checkout_id).unwrap();
  checkout.reference_id = None;
  h.processor.put_checkout(checkout);
  h.processor.put_payment(ProcessorPayment {
    id: "pay_unlabelled".to_string(),
    status: PaymentState::Completed,
    amount_cents: 550,
    currency: "USD".to_string(),
    reference_id: None,
  });

  let response = h.services.poller.poll(poll_for(order.id)).await.unwrap();

  assert!(response.confirmed);
  assert_eq!(h.store.order(order.id).unwrap().payment_id.as_deref(), Some("pay_unlabelled"));
}

#[tokio::test]
async fn unknown_order_is_an_error() {
  let h = harness();
  let missing = Uuid::new_v4();

  let err = h.services.poller.poll(poll_for(missing)).await.unwrap_err();

  assert!(matches!(err, Error::OrderNotFound(id) if id == missing));
}

#[tokio::test]
async fn payment_hint_is_used_when_no_checkout_exists() {
  let h = harness();
  let order = h.pending_order(420, 10);
  h.processor.put_payment(ProcessorPayment {
    id: "pay_hint".to_string(),
    status: PaymentState::Completed,
    amount_cents: 420,
    currency: "USD".to_string(),
    reference_id: Some(order.id.to_string()),
  });

  let response = h
    .services
    .poller
    .poll(PollRequest {
      order_id: order.id,
      payment_id: Some("pay_hint".to_string()),
    })
    .await
    .unwrap();

  assert_eq!(response.status, PollStatus::Completed);
  assert_eq!(h.store.order(order.id).unwrap().payment_id.as_deref(), Some("pay_hint"));
}

#[tokio::test]
async fn payment_hint_for_another_order_is_refused() {
  let h = harness();
  let order = h.pending_order(420, 10);
  h.processor.put_payment(ProcessorPayment {
    id: "pay_elsewhere".to_string(),
    status: PaymentState::Completed,
    amount_cents: 420,
    currency: "USD".to_string(),
    reference_id: Some(Uuid::new_v4().to_string()),
  });

  let response = h
    .services
    .poller
    .poll(PollRequest {
      order_id: order.id,
      payment_id: Some("pay_elsewhere".to_string()),
    })
    .await
    .unwrap();

  assert_eq!(response.status, PollStatus::ConfirmationFailed);
  assert_eq!(response.reason, Some(Reason::PaymentReuse));
  assert_eq!(h.store.order(order.id).unwrap(), order);
  assert!(h.store.event_keys().is_empty());
}

#[tokio::test]
async fn response_serializes_in_client_shape() {
  let h = harness();
  let order = h.order_in(OrderStatus::Ready, 550);

  let response = h.services.poller.poll(poll_for(order.id)).await.unwrap();
  let body = serde_json::to_value(&response).unwrap();

  assert_eq!(body["status"], "ALREADY_CONFIRMED");
  assert_eq!(body["orderStatus"], "ready");
  assert_eq!(body["confirmed"], false);
  assert!(body.get("reason").is_none());
}
