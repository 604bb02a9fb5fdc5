// server/src/db/side_effects.rs

use super::{store_error, PgStore};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payconfirm::model::{CompAudit, LoyaltyUpdate, RefundLock, VoucherRecord};
use payconfirm::ports::{CompAuditLog, LoyaltyLedger, ReceiptQueue, RefundLockStore, VoucherStore};
use payconfirm::StoreError;
use uuid::Uuid;

#[async_trait]
impl ReceiptQueue for PgStore {
  async fn enqueue(&self, order_id: Uuid, receipt_text: String) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO receipt_queue (order_id, receipt_text) VALUES ($1, $2)")
      .bind(order_id)
      .bind(receipt_text)
      .execute(self.pool())
      .await
      .context("enqueue receipt")?;
    Ok(())
  }
}

// One point per confirmed order; every `loyalty_threshold` points earns a voucher.
#[async_trait]
impl LoyaltyLedger for PgStore {
  async fn increment(&self, user_id: Uuid, _amount_cents: i64, _order_id: Uuid) -> anyhow::Result<LoyaltyUpdate> {
    let points: i64 = sqlx::query_scalar(
      "INSERT INTO loyalty_balances (user_id, points) VALUES ($1, 1) \
       ON CONFLICT (user_id) DO UPDATE SET points = loyalty_balances.points + 1, updated_at = now() \
       RETURNING points",
    )
    .bind(user_id)
    .fetch_one(self.pool())
    .await
    .context("increment loyalty")?;
    Ok(LoyaltyUpdate {
      points,
      voucher_earned: points % self.loyalty_threshold == 0,
    })
  }

  async fn reverse(&self, user_id: Uuid, _amount_cents: i64, _payment_id: &str) -> anyhow::Result<LoyaltyUpdate> {
    let points: Option<i64> = sqlx::query_scalar(
      "UPDATE loyalty_balances SET points = GREATEST(points - 1, 0), updated_at = now() \
       WHERE user_id = $1 RETURNING points",
    )
    .bind(user_id)
    .fetch_optional(self.pool())
    .await
    .context("reverse loyalty")?;
    Ok(LoyaltyUpdate {
      points: points.unwrap_or_default(),
      voucher_earned: false,
    })
  }
}

#[async_trait]
impl VoucherStore for PgStore {
  async fn insert(&self, voucher: &VoucherRecord) -> anyhow::Result<()> {
    sqlx::query(
      "INSERT INTO vouchers (id, user_id, code_hash, masked_code, source_order_id, created_at) \
       VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(voucher.id)
    .bind(voucher.user_id)
    .bind(&voucher.code_hash)
    .bind(&voucher.masked_code)
    .bind(voucher.source_order_id)
    .bind(voucher.created_at)
    .execute(self.pool())
    .await
    .context("insert voucher")?;
    Ok(())
  }
}

#[async_trait]
impl RefundLockStore for PgStore {
  // Takes over a lock only once it has gone stale.
  async fn acquire(&self, lock: &RefundLock, stale_before: DateTime<Utc>) -> Result<bool, StoreError> {
    let result = sqlx::query(
      "INSERT INTO refund_locks (payment_id, user_id, locked_at) VALUES ($1, $2, $3) \
       ON CONFLICT (payment_id) DO UPDATE SET user_id = EXCLUDED.user_id, locked_at = EXCLUDED.locked_at \
       WHERE refund_locks.locked_at <= $4",
    )
    .bind(&lock.payment_id)
    .bind(lock.user_id)
    .bind(lock.locked_at)
    .bind(stale_before)
    .execute(self.pool())
    .await
    .map_err(store_error)?;
    Ok(result.rows_affected() == 1)
  }

  async fn holds(&self, user_id: Uuid, stale_before: DateTime<Utc>) -> Result<bool, StoreError> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM refund_locks WHERE user_id = $1 AND locked_at > $2)")
      .bind(user_id)
      .bind(stale_before)
      .fetch_one(self.pool())
      .await
      .map_err(store_error)
  }

  async fn release(&self, payment_id: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM refund_locks WHERE payment_id = $1")
      .bind(payment_id)
      .execute(self.pool())
      .await
      .map_err(store_error)?;
    Ok(())
  }
}

#[async_trait]
impl CompAuditLog for PgStore {
  async fn record(&self, audit: &CompAudit) -> Result<(), StoreError> {
    sqlx::query(
      "INSERT INTO comp_audit (id, order_id, staff_id, staff_email, staff_role, amount_cents, reason, created_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(audit.id)
    .bind(audit.order_id)
    .bind(audit.staff_id)
    .bind(&audit.staff_email)
    .bind(audit.staff_role.as_str())
    .bind(audit.amount_cents)
    .bind(&audit.reason)
    .bind(audit.created_at)
    .execute(self.pool())
    .await
    .map_err(store_error)?;
    Ok(())
  }
}
