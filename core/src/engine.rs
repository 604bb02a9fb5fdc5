// core/src/engine.rs

//! The single authoritative confirmation function. The webhook receiver,
//! the active poller and the reconciliation sweeper all end up here with
//! the same request shape; `confirmed_via` is only ever logged.

use crate::dead_letter::DeadLetterRecorder;
use crate::error::StoreError;
use crate::ledger::IdempotencyGate;
use crate::loyalty::RewardIssuer;
use crate::model::{
  ConfirmationRequest, ConfirmationResult, EventKey, Order, OrderStatus, PaymentStamp, Reason, Reservation, Severity,
  SystemError, SystemErrorType,
};
use crate::ports::{OrderStore, ReceiptQueue};
use crate::receipt::{format_money, format_receipt, ReceiptHeader};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

const SOURCE_FUNCTION: &str = "confirmation_engine";

#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Accepted distance, in cents, between the paid amount and the order total.
  pub amount_tolerance_cents: i64,
  pub settlement_currency: String,
  pub receipt_header: ReceiptHeader,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      amount_tolerance_cents: 2,
      settlement_currency: "USD".to_string(),
      receipt_header: ReceiptHeader::default(),
    }
  }
}

#[derive(Clone)]
pub struct ConfirmationEngine {
  orders: Arc<dyn OrderStore>,
  gate: IdempotencyGate,
  dead_letters: DeadLetterRecorder,
  receipts: Arc<dyn ReceiptQueue>,
  rewards: RewardIssuer,
  config: EngineConfig,
}

impl ConfirmationEngine {
  pub fn new(
    orders: Arc<dyn OrderStore>,
    gate: IdempotencyGate,
    dead_letters: DeadLetterRecorder,
    receipts: Arc<dyn ReceiptQueue>,
    rewards: RewardIssuer,
    config: EngineConfig,
  ) -> Self {
    Self {
      orders,
      gate,
      dead_letters,
      receipts,
      rewards,
      config,
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Applies a processor-confirmed payment to its order, at most once.
  ///
  /// Never fails: every outcome, including storage faults, comes back as a
  /// `ConfirmationResult` for the calling channel to translate.
  #[instrument(
    name = "engine::confirm",
    skip(self, request),
    fields(
      order_id = %request.order_id,
      payment_id = %request.payment_id,
      amount_cents = request.paid_amount_cents,
      via = %request.confirmed_via
    )
  )]
  pub async fn confirm(&self, request: &ConfirmationRequest) -> ConfirmationResult {
    // 1. Per-payment gate, shared by all channels.
    let payload = json!({
      "order_id": request.order_id,
      "paid_amount_cents": request.paid_amount_cents,
      "currency": request.currency,
      "confirmed_via": request.confirmed_via,
    });
    match self
      .gate
      .reserve(
        EventKey::payment_confirmed(&request.payment_id),
        "payment.confirmed",
        request.confirmed_via.as_str(),
        payload,
      )
      .await
    {
      Ok(Reservation::Reserved) => {}
      Ok(Reservation::AlreadyProcessed) => return self.already_processed(request).await,
      Err(e) => {
        warn!(error = %e, "Idempotency gate unavailable; not proceeding.");
        return ConfirmationResult::refused(Reason::IdempotencyError);
      }
    }

    // From here on the key is spent: any storage fault must leave a dead letter,
    // because later deliveries of this payment will stop at the gate.

    // 2. Load.
    let order = match self.orders.get(request.order_id).await {
      Ok(Some(order)) => order,
      Ok(None) => {
        error!("Processor confirmed a payment for an order that does not exist.");
        self
          .orphan(request, "Payment confirmed upstream but no matching order exists", None)
          .await;
        return ConfirmationResult::refused(Reason::OrderNotFound);
      }
      Err(e) => {
        self.orphan(request, "Order lookup failed after payment", Some(&e)).await;
        return ConfirmationResult::refused(Reason::DbError);
      }
    };

    // 3. Already monetized: a race that slipped past the gate via another key.
    if order.is_monetized() {
      info!(status = %order.status, "Order already paid.");
      return ConfirmationResult::duplicate(Reason::AlreadyPaid);
    }

    // 4. Payment reuse.
    match self.orders.find_by_payment_id(&request.payment_id).await {
      Ok(Some(other)) if other.id != order.id => {
        warn!(other_order_id = %other.id, "Payment id already attached to a different order.");
        return ConfirmationResult::refused(Reason::PaymentReuse);
      }
      Ok(_) => {}
      Err(e) => {
        self.orphan(request, "Payment reuse lookup failed", Some(&e)).await;
        return ConfirmationResult::refused(Reason::DbError);
      }
    }

    // Cancelled or frozen orders cannot take money.
    if !order.status.is_payable() {
      warn!(status = %order.status, "Payment arrived for a closed order.");
      self
        .dead_letters
        .record(
          SystemError::new(
            SystemErrorType::PaymentOnClosedOrder,
            SOURCE_FUNCTION,
            format!("Payment confirmed upstream for order in status '{}'", order.status),
          )
          .order(order.id)
          .payment(&request.payment_id)
          .amount(request.paid_amount_cents)
          .context(json!({ "status": order.status, "via": request.confirmed_via })),
        )
        .await;
      return ConfirmationResult::refused(Reason::OrderClosed);
    }

    // 5. Amount.
    let tolerance = self.config.amount_tolerance_cents.unsigned_abs();
    if request.paid_amount_cents.abs_diff(order.total_amount_cents) > tolerance {
      return self.freeze_mismatch(request, &order).await;
    }

    // 6. Currency.
    if !request.currency.eq_ignore_ascii_case(&self.config.settlement_currency) {
      warn!(currency = %request.currency, "Unsupported settlement currency.");
      // Captured upstream in a currency nothing here can settle.
      self
        .dead_letters
        .record(
          SystemError::new(
            SystemErrorType::InvalidCurrency,
            SOURCE_FUNCTION,
            format!(
              "Payment captured in {} but orders settle in {}",
              request.currency, self.config.settlement_currency
            ),
          )
          .severity(Severity::High)
          .order(order.id)
          .payment(&request.payment_id)
          .amount(request.paid_amount_cents)
          .context(json!({ "currency": request.currency, "via": request.confirmed_via })),
        )
        .await;
      return ConfirmationResult::refused(Reason::InvalidCurrency);
    }

    // 7. Conditional transition.
    let stamp = PaymentStamp {
      order_id: order.id,
      payment_id: request.payment_id.clone(),
      paid_amount_cents: request.paid_amount_cents,
      paid_at: Utc::now(),
      confirmed_via: request.confirmed_via.as_str().to_string(),
      status: OrderStatus::Preparing,
    };
    let confirmed = match self.orders.confirm_payment(&stamp, &OrderStatus::PAYABLE).await {
      Ok(Some(updated)) => updated,
      Ok(None) => {
        info!("Conditional update matched no rows; another caller confirmed first.");
        return ConfirmationResult::duplicate(Reason::SelfHeal);
      }
      Err(StoreError::UniqueViolation { constraint }) => {
        warn!(%constraint, "Payment id claimed by another order during the update.");
        return ConfirmationResult::refused(Reason::PaymentReuse);
      }
      Err(e) => {
        self.orphan(request, "Order update failed after payment", Some(&e)).await;
        return ConfirmationResult::refused(Reason::DbError);
      }
    };
    info!(status = %confirmed.status, "Payment confirmed.");

    // 8. Side effects. None of them can undo the confirmation.
    self.enqueue_receipt(&confirmed).await;

    if confirmed.user_id.is_none() {
      info!("Guest order; no loyalty.");
      return ConfirmationResult::confirmed(Reason::ConfirmedGuest);
    }
    self.rewards.award(&confirmed, request.paid_amount_cents).await;
    ConfirmationResult::confirmed(Reason::Confirmed)
  }

  // The payment key is spent. If the payment already sits on a different
  // order, this request is an attempt to reuse it, not a duplicate.
  async fn already_processed(&self, request: &ConfirmationRequest) -> ConfirmationResult {
    match self.orders.find_by_payment_id(&request.payment_id).await {
      Ok(Some(owner)) if owner.id != request.order_id => {
        warn!(owner_order_id = %owner.id, "Payment already applied to a different order.");
        ConfirmationResult::refused(Reason::PaymentReuse)
      }
      Ok(_) => {
        info!("Payment already processed; skipping.");
        ConfirmationResult::duplicate(Reason::AlreadyProcessed)
      }
      Err(e) => {
        warn!(error = %e, "Owner lookup failed on duplicate payment; treating as processed.");
        ConfirmationResult::duplicate(Reason::AlreadyProcessed)
      }
    }
  }

  async fn freeze_mismatch(&self, request: &ConfirmationRequest, order: &Order) -> ConfirmationResult {
    let note = format!(
      "Paid: {}, Expected: {}",
      format_money(request.paid_amount_cents),
      format_money(order.total_amount_cents)
    );
    warn!(
      paid_cents = request.paid_amount_cents,
      expected_cents = order.total_amount_cents,
      "Amount mismatch; freezing order."
    );
    match self
      .orders
      .transition(order.id, &OrderStatus::PAYABLE, OrderStatus::AmountMismatch, Some(&note))
      .await
    {
      Ok(Some(_)) => {}
      Ok(None) => warn!("Order moved before it could be frozen."),
      Err(e) => {
        self.orphan(request, "Amount mismatch could not be recorded on the order", Some(&e)).await;
      }
    }
    ConfirmationResult::refused(Reason::AmountMismatch)
  }

  async fn enqueue_receipt(&self, order: &Order) {
    let text = format_receipt(order, &self.config.receipt_header);
    if let Err(e) = self.receipts.enqueue(order.id, text).await {
      warn!(order_id = %order.id, error = %e, "Receipt enqueue failed (non-fatal).");
    }
  }

  async fn orphan(&self, request: &ConfirmationRequest, message: &str, cause: Option<&StoreError>) {
    let message = match cause {
      Some(e) => format!("{}: {}", message, e),
      None => message.to_string(),
    };
    self
      .dead_letters
      .record(
        SystemError::new(SystemErrorType::OrphanPayment, SOURCE_FUNCTION, message)
          .severity(Severity::Critical)
          .order(request.order_id)
          .payment(&request.payment_id)
          .amount(request.paid_amount_cents)
          .context(json!({
            "currency": request.currency,
            "via": request.confirmed_via,
          })),
      )
      .await;
  }
}
