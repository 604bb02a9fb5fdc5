// core/src/memory.rs

//! In-process adapters with the same uniqueness and compare-and-swap
//! semantics as the Postgres schema. Used by the test suites and for local
//! runs without a database. Each adapter has failure switches so tests can
//! drive the storage-fault paths.

use crate::error::{StoreError, UpstreamError};
use crate::model::{
  CheckoutStatus, CompAudit, LoyaltyUpdate, NewTerminalCheckout, Order, OrderStatus, PaymentStamp, ProcessedEvent,
  ProcessorPayment, ReconcileWindow, RefundLock, Reservation, SystemError, TerminalCheckout, VoucherRecord,
};
use crate::ports::{
  AlertSink, CompAuditLog, DeadLetterSink, EventLedger, LoyaltyLedger, OrderStore, PaymentProcessor, ReceiptQueue,
  RefundLockStore, VoucherStore,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

/// Switches for injecting storage faults.
#[derive(Debug, Default)]
pub struct FailureSwitches {
  pub ledger: AtomicBool,
  pub order_reads: AtomicBool,
  pub order_writes: AtomicBool,
  pub dead_letters: AtomicBool,
  pub receipts: AtomicBool,
  pub loyalty: AtomicBool,
  pub comp_audit: AtomicBool,
}

impl FailureSwitches {
  fn tripped(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
    if flag.load(Ordering::SeqCst) {
      Err(StoreError::Backend(format!("injected {} failure", what)))
    } else {
      Ok(())
    }
  }
}

#[derive(Default)]
struct Tables {
  orders: HashMap<Uuid, Order>,
  events: HashMap<String, ProcessedEvent>,
  system_errors: Vec<SystemError>,
  receipts: Vec<(Uuid, String)>,
  loyalty_points: HashMap<Uuid, i64>,
  vouchers: Vec<VoucherRecord>,
  refund_locks: HashMap<String, RefundLock>,
  comp_audits: Vec<CompAudit>,
  alerts: Vec<SystemError>,
}

/// Every storage port backed by one mutex-guarded set of tables.
pub struct InMemoryStore {
  tables: Mutex<Tables>,
  pub fail: FailureSwitches,
  loyalty_threshold: i64,
}

impl Default for InMemoryStore {
  fn default() -> Self {
    Self::new(10)
  }
}

impl InMemoryStore {
  pub fn new(loyalty_threshold: i64) -> Self {
    Self {
      tables: Mutex::new(Tables::default()),
      fail: FailureSwitches::default(),
      loyalty_threshold: loyalty_threshold.max(1),
    }
  }

  pub fn insert_order(&self, order: Order) -> Order {
    self.tables.lock().orders.insert(order.id, order.clone());
    order
  }

  pub fn order(&self, order_id: Uuid) -> Option<Order> {
    self.tables.lock().orders.get(&order_id).cloned()
  }

  pub fn orders_with_payment(&self, payment_id: &str) -> usize {
    self
      .tables
      .lock()
      .orders
      .values()
      .filter(|o| o.payment_id.as_deref() == Some(payment_id))
      .count()
  }

  pub fn event_keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self.tables.lock().events.keys().cloned().collect();
    keys.sort();
    keys
  }

  pub fn system_errors(&self) -> Vec<SystemError> {
    self.tables.lock().system_errors.clone()
  }

  pub fn receipts(&self) -> Vec<(Uuid, String)> {
    self.tables.lock().receipts.clone()
  }

  pub fn loyalty_points(&self, user_id: Uuid) -> i64 {
    self.tables.lock().loyalty_points.get(&user_id).copied().unwrap_or_default()
  }

  pub fn set_loyalty_points(&self, user_id: Uuid, points: i64) {
    self.tables.lock().loyalty_points.insert(user_id, points);
  }

  pub fn vouchers(&self) -> Vec<VoucherRecord> {
    self.tables.lock().vouchers.clone()
  }

  pub fn comp_audits(&self) -> Vec<CompAudit> {
    self.tables.lock().comp_audits.clone()
  }

  pub fn alerts(&self) -> Vec<SystemError> {
    self.tables.lock().alerts.clone()
  }

  pub fn put_refund_lock(&self, lock: RefundLock) {
    self.tables.lock().refund_locks.insert(lock.payment_id.clone(), lock);
  }

  pub fn refund_lock(&self, payment_id: &str) -> Option<RefundLock> {
    self.tables.lock().refund_locks.get(payment_id).cloned()
  }

  fn append_note(order: &mut Order, note: Option<&str>) {
    if let Some(note) = note {
      order.notes = Some(match order.notes.take() {
        Some(existing) if !existing.is_empty() => format!("{} | {}", existing, note),
        _ => note.to_string(),
      });
    }
  }
}

#[async_trait]
impl OrderStore for InMemoryStore {
  async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
    FailureSwitches::tripped(&self.fail.order_reads, "order read")?;
    Ok(self.tables.lock().orders.get(&order_id).cloned())
  }

  async fn find_by_payment_id(&self, payment_id: &str) -> Result<Option<Order>, StoreError> {
    FailureSwitches::tripped(&self.fail.order_reads, "order read")?;
    Ok(
      self
        .tables
        .lock()
        .orders
        .values()
        .find(|o| o.payment_id.as_deref() == Some(payment_id))
        .cloned(),
    )
  }

  async fn confirm_payment(&self, stamp: &PaymentStamp, from: &[OrderStatus]) -> Result<Option<Order>, StoreError> {
    FailureSwitches::tripped(&self.fail.order_writes, "order write")?;
    let mut tables = self.tables.lock();
    if tables
      .orders
      .values()
      .any(|o| o.id != stamp.order_id && o.payment_id.as_deref() == Some(stamp.payment_id.as_str()))
    {
      return Err(StoreError::UniqueViolation {
        constraint: "orders_payment_id_key".to_string(),
      });
    }
    let Some(order) = tables.orders.get_mut(&stamp.order_id) else {
      return Ok(None);
    };
    if !from.contains(&order.status) || order.payment_id.is_some() {
      return Ok(None);
    }
    order.status = stamp.status;
    order.payment_id = Some(stamp.payment_id.clone());
    order.paid_amount_cents = Some(stamp.paid_amount_cents);
    order.paid_at = Some(stamp.paid_at);
    order.payment_confirmed_via = Some(stamp.confirmed_via.clone());
    order.updated_at = Utc::now();
    Ok(Some(order.clone()))
  }

  async fn transition(
    &self,
    order_id: Uuid,
    from: &[OrderStatus],
    to: OrderStatus,
    note: Option<&str>,
  ) -> Result<Option<Order>, StoreError> {
    FailureSwitches::tripped(&self.fail.order_writes, "order write")?;
    let mut tables = self.tables.lock();
    let Some(order) = tables.orders.get_mut(&order_id) else {
      return Ok(None);
    };
    if !from.contains(&order.status) {
      return Ok(None);
    }
    order.status = to;
    Self::append_note(order, note);
    order.updated_at = Utc::now();
    Ok(Some(order.clone()))
  }

  async fn attach_checkout(&self, order_id: Uuid, checkout_id: &str) -> Result<Option<Order>, StoreError> {
    FailureSwitches::tripped(&self.fail.order_writes, "order write")?;
    let mut tables = self.tables.lock();
    let Some(order) = tables.orders.get_mut(&order_id) else {
      return Ok(None);
    };
    if order.checkout_id.is_some() || !matches!(order.status, OrderStatus::Pending | OrderStatus::Unpaid) {
      return Ok(None);
    }
    order.checkout_id = Some(checkout_id.to_string());
    order.updated_at = Utc::now();
    Ok(Some(order.clone()))
  }

  async fn list_reconcilable(&self, window: ReconcileWindow) -> Result<Vec<Order>, StoreError> {
    FailureSwitches::tripped(&self.fail.order_reads, "order read")?;
    let tables = self.tables.lock();
    let mut batch: Vec<Order> = tables
      .orders
      .values()
      .filter(|o| matches!(o.status, OrderStatus::Pending | OrderStatus::Unpaid))
      .filter(|o| o.checkout_id.is_some() && o.payment_id.is_none())
      .filter(|o| o.created_at < window.created_before && o.created_at > window.created_after)
      .cloned()
      .collect();
    batch.sort_by_key(|o| o.created_at);
    batch.truncate(window.limit as usize);
    Ok(batch)
  }

  async fn abandon_stale(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError> {
    FailureSwitches::tripped(&self.fail.order_writes, "order write")?;
    let mut tables = self.tables.lock();
    let mut moved = 0;
    for order in tables.orders.values_mut() {
      if matches!(order.status, OrderStatus::Pending | OrderStatus::Unpaid)
        && order.payment_id.is_none()
        && order.created_at < created_before
      {
        order.status = OrderStatus::Abandoned;
        order.updated_at = Utc::now();
        moved += 1;
      }
    }
    Ok(moved)
  }
}

#[async_trait]
impl EventLedger for InMemoryStore {
  async fn insert(&self, event: &ProcessedEvent) -> Result<Reservation, StoreError> {
    FailureSwitches::tripped(&self.fail.ledger, "ledger")?;
    let mut tables = self.tables.lock();
    let key = event.event_key.as_str().to_string();
    if tables.events.contains_key(&key) {
      return Ok(Reservation::AlreadyProcessed);
    }
    tables.events.insert(key, event.clone());
    Ok(Reservation::Reserved)
  }
}

#[async_trait]
impl DeadLetterSink for InMemoryStore {
  async fn record(&self, entry: &SystemError) -> Result<(), StoreError> {
    FailureSwitches::tripped(&self.fail.dead_letters, "dead letter")?;
    self.tables.lock().system_errors.push(entry.clone());
    Ok(())
  }
}

#[async_trait]
impl AlertSink for InMemoryStore {
  async fn alert(&self, entry: &SystemError) -> anyhow::Result<()> {
    self.tables.lock().alerts.push(entry.clone());
    Ok(())
  }
}

#[async_trait]
impl ReceiptQueue for InMemoryStore {
  async fn enqueue(&self, order_id: Uuid, receipt_text: String) -> anyhow::Result<()> {
    if self.fail.receipts.load(Ordering::SeqCst) {
      return Err(anyhow!("injected receipt queue failure"));
    }
    self.tables.lock().receipts.push((order_id, receipt_text));
    Ok(())
  }
}

#[async_trait]
impl LoyaltyLedger for InMemoryStore {
  async fn increment(&self, user_id: Uuid, _amount_cents: i64, _order_id: Uuid) -> anyhow::Result<LoyaltyUpdate> {
    if self.fail.loyalty.load(Ordering::SeqCst) {
      return Err(anyhow!("injected loyalty failure"));
    }
    let mut tables = self.tables.lock();
    let points = tables.loyalty_points.entry(user_id).or_insert(0);
    *points += 1;
    Ok(LoyaltyUpdate {
      points: *points,
      voucher_earned: *points % self.loyalty_threshold == 0,
    })
  }

  async fn reverse(&self, user_id: Uuid, _amount_cents: i64, _payment_id: &str) -> anyhow::Result<LoyaltyUpdate> {
    if self.fail.loyalty.load(Ordering::SeqCst) {
      return Err(anyhow!("injected loyalty failure"));
    }
    let mut tables = self.tables.lock();
    let points = tables.loyalty_points.entry(user_id).or_insert(0);
    *points = (*points - 1).max(0);
    Ok(LoyaltyUpdate {
      points: *points,
      voucher_earned: false,
    })
  }
}

#[async_trait]
impl VoucherStore for InMemoryStore {
  async fn insert(&self, voucher: &VoucherRecord) -> anyhow::Result<()> {
    let mut tables = self.tables.lock();
    if tables.vouchers.iter().any(|v| v.code_hash == voucher.code_hash) {
      return Err(anyhow!("voucher code hash collision"));
    }
    tables.vouchers.push(voucher.clone());
    Ok(())
  }
}

#[async_trait]
impl RefundLockStore for InMemoryStore {
  async fn acquire(&self, lock: &RefundLock, stale_before: DateTime<Utc>) -> Result<bool, StoreError> {
    let mut tables = self.tables.lock();
    match tables.refund_locks.get(&lock.payment_id) {
      Some(existing) if existing.locked_at > stale_before => Ok(false),
      _ => {
        tables.refund_locks.insert(lock.payment_id.clone(), lock.clone());
        Ok(true)
      }
    }
  }

  async fn holds(&self, user_id: Uuid, stale_before: DateTime<Utc>) -> Result<bool, StoreError> {
    Ok(
      self
        .tables
        .lock()
        .refund_locks
        .values()
        .any(|l| l.user_id == user_id && l.locked_at > stale_before),
    )
  }

  async fn release(&self, payment_id: &str) -> Result<(), StoreError> {
    self.tables.lock().refund_locks.remove(payment_id);
    Ok(())
  }
}

#[async_trait]
impl CompAuditLog for InMemoryStore {
  async fn record(&self, audit: &CompAudit) -> Result<(), StoreError> {
    FailureSwitches::tripped(&self.fail.comp_audit, "comp audit")?;
    self.tables.lock().comp_audits.push(audit.clone());
    Ok(())
  }
}

/// A scripted processor: tests place checkouts and payments, then flip
/// their status to simulate the terminal.
#[derive(Default)]
pub struct InMemoryProcessor {
  checkouts: Mutex<HashMap<String, TerminalCheckout>>,
  payments: Mutex<HashMap<String, ProcessorPayment>>,
  pub unavailable: AtomicBool,
  pub calls: AtomicUsize,
  /// Artificial latency applied to every call.
  pub delay: Mutex<Option<std::time::Duration>>,
}

impl InMemoryProcessor {
  pub fn put_checkout(&self, checkout: TerminalCheckout) {
    self.checkouts.lock().insert(checkout.id.clone(), checkout);
  }

  pub fn put_payment(&self, payment: ProcessorPayment) {
    self.payments.lock().insert(payment.id.clone(), payment);
  }

  pub fn set_checkout_status(&self, checkout_id: &str, status: CheckoutStatus) {
    if let Some(checkout) = self.checkouts.lock().get_mut(checkout_id) {
      checkout.status = status;
    }
  }

  pub fn checkout(&self, checkout_id: &str) -> Option<TerminalCheckout> {
    self.checkouts.lock().get(checkout_id).cloned()
  }

  pub fn call_count(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  async fn enter(&self) -> Result<(), UpstreamError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let delay = *self.delay.lock();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    if self.unavailable.load(Ordering::SeqCst) {
      return Err(UpstreamError::Transport("processor unavailable".to_string()));
    }
    Ok(())
  }
}

#[async_trait]
impl PaymentProcessor for InMemoryProcessor {
  async fn get_checkout(&self, checkout_id: &str) -> Result<Option<TerminalCheckout>, UpstreamError> {
    self.enter().await?;
    Ok(self.checkouts.lock().get(checkout_id).cloned())
  }

  async fn get_payment(&self, payment_id: &str) -> Result<Option<ProcessorPayment>, UpstreamError> {
    self.enter().await?;
    Ok(self.payments.lock().get(payment_id).cloned())
  }

  async fn create_terminal_checkout(&self, request: &NewTerminalCheckout) -> Result<TerminalCheckout, UpstreamError> {
    self.enter().await?;
    let checkout = TerminalCheckout {
      id: format!("chk_{}", Uuid::new_v4().simple()),
      status: CheckoutStatus::Pending,
      payment_ids: Vec::new(),
      reference_id: Some(request.reference_id.clone()),
      amount_cents: request.amount_cents,
      currency: request.currency.clone(),
    };
    self.put_checkout(checkout.clone());
    Ok(checkout)
  }
}
