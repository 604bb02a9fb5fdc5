// core/src/ports.rs

//! Storage and collaborator ports. Each channel and the engine talk to the
//! outside world only through these traits; the server provides Postgres
//! and HTTP adapters, `crate::memory` provides in-process ones.
//!
//! Every storage mutation is either an insert guarded by a uniqueness
//! constraint or a compare-and-swap over the expected prior statuses.
//! `Ok(None)` from a compare-and-swap means another writer won.

use crate::error::{StoreError, UpstreamError};
use crate::model::{
  CompAudit, LoyaltyUpdate, NewTerminalCheckout, Order, OrderStatus, PaymentStamp, ProcessedEvent, ProcessorPayment,
  ReconcileWindow, RefundLock, Reservation, SystemError, TerminalCheckout, VoucherRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait OrderStore: Send + Sync {
  async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

  async fn find_by_payment_id(&self, payment_id: &str) -> Result<Option<Order>, StoreError>;

  /// Stamps the payment fields and moves to `stamp.status`, only while the
  /// order is in one of `from` and carries no payment id.
  async fn confirm_payment(&self, stamp: &PaymentStamp, from: &[OrderStatus]) -> Result<Option<Order>, StoreError>;

  /// Moves the order to `to` only while it is in one of `from`. A note, when
  /// given, is appended to the order's notes.
  async fn transition(
    &self,
    order_id: Uuid,
    from: &[OrderStatus],
    to: OrderStatus,
    note: Option<&str>,
  ) -> Result<Option<Order>, StoreError>;

  /// Records the processor checkout on a still-unpaid order that has none yet.
  async fn attach_checkout(&self, order_id: Uuid, checkout_id: &str) -> Result<Option<Order>, StoreError>;

  /// Pending orders with a checkout, no payment, created inside the window,
  /// oldest first.
  async fn list_reconcilable(&self, window: ReconcileWindow) -> Result<Vec<Order>, StoreError>;

  /// Moves unpaid `pending`/`unpaid` orders created before the cutoff into
  /// `abandoned`. Returns how many moved.
  async fn abandon_stale(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait EventLedger: Send + Sync {
  /// Insert-only. A key conflict is `Reservation::AlreadyProcessed`, never an error.
  async fn insert(&self, event: &ProcessedEvent) -> Result<Reservation, StoreError>;
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
  async fn record(&self, entry: &SystemError) -> Result<(), StoreError>;
}

/// Out-of-band notification of a freshly recorded dead letter.
#[async_trait]
pub trait AlertSink: Send + Sync {
  async fn alert(&self, entry: &SystemError) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ReceiptQueue: Send + Sync {
  async fn enqueue(&self, order_id: Uuid, receipt_text: String) -> anyhow::Result<()>;
}

#[async_trait]
pub trait LoyaltyLedger: Send + Sync {
  async fn increment(&self, user_id: Uuid, amount_cents: i64, order_id: Uuid) -> anyhow::Result<LoyaltyUpdate>;

  async fn reverse(&self, user_id: Uuid, amount_cents: i64, payment_id: &str) -> anyhow::Result<LoyaltyUpdate>;
}

#[async_trait]
pub trait VoucherStore: Send + Sync {
  async fn insert(&self, voucher: &VoucherRecord) -> anyhow::Result<()>;
}

#[async_trait]
pub trait RefundLockStore: Send + Sync {
  /// Takes the lock unless an unexpired one (locked after `stale_before`)
  /// exists for the same payment. Returns whether it was taken.
  async fn acquire(&self, lock: &RefundLock, stale_before: DateTime<Utc>) -> Result<bool, StoreError>;

  async fn holds(&self, user_id: Uuid, stale_before: DateTime<Utc>) -> Result<bool, StoreError>;

  async fn release(&self, payment_id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CompAuditLog: Send + Sync {
  async fn record(&self, audit: &CompAudit) -> Result<(), StoreError>;
}

/// The upstream processor. `Ok(None)` means the processor does not know the id.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
  async fn get_checkout(&self, checkout_id: &str) -> Result<Option<TerminalCheckout>, UpstreamError>;

  async fn get_payment(&self, payment_id: &str) -> Result<Option<ProcessorPayment>, UpstreamError>;

  async fn create_terminal_checkout(&self, request: &NewTerminalCheckout) -> Result<TerminalCheckout, UpstreamError>;
}
