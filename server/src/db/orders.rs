// server/src/db/orders.rs

use super::{store_error, PgStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payconfirm::model::{Order, OrderStatus, PaymentStamp, ReconcileWindow};
use payconfirm::ports::OrderStore;
use payconfirm::StoreError;
use sqlx::FromRow;
use tracing::{debug, instrument};
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, user_id, status, payment_id, checkout_id, total_amount_cents, paid_amount_cents, \
   paid_at, payment_confirmed_via, currency, customer_name, customer_email, notes, created_at, updated_at";

#[derive(Debug, FromRow)]
struct OrderRow {
  id: Uuid,
  user_id: Option<Uuid>,
  status: String,
  payment_id: Option<String>,
  checkout_id: Option<String>,
  total_amount_cents: i64,
  paid_amount_cents: Option<i64>,
  paid_at: Option<DateTime<Utc>>,
  payment_confirmed_via: Option<String>,
  currency: String,
  customer_name: Option<String>,
  customer_email: Option<String>,
  notes: Option<String>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
  type Error = StoreError;

  fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
    let status = row
      .status
      .parse::<OrderStatus>()
      .map_err(|e| StoreError::Corrupt(format!("order {}: {}", row.id, e)))?;
    Ok(Order {
      id: row.id,
      user_id: row.user_id,
      status,
      payment_id: row.payment_id,
      checkout_id: row.checkout_id,
      total_amount_cents: row.total_amount_cents,
      paid_amount_cents: row.paid_amount_cents,
      paid_at: row.paid_at,
      payment_confirmed_via: row.payment_confirmed_via,
      currency: row.currency,
      customer_name: row.customer_name,
      customer_email: row.customer_email,
      notes: row.notes,
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

fn status_list(statuses: &[OrderStatus]) -> Vec<String> {
  statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn into_order(row: Option<OrderRow>) -> Result<Option<Order>, StoreError> {
  row.map(Order::try_from).transpose()
}

#[async_trait]
impl OrderStore for PgStore {
  async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
      .bind(order_id)
      .fetch_optional(self.pool())
      .await
      .map_err(store_error)?;
    into_order(row)
  }

  async fn find_by_payment_id(&self, payment_id: &str) -> Result<Option<Order>, StoreError> {
    let row: Option<OrderRow> =
      sqlx::query_as(&format!("SELECT {} FROM orders WHERE payment_id = $1", ORDER_COLUMNS))
        .bind(payment_id)
        .fetch_optional(self.pool())
        .await
        .map_err(store_error)?;
    into_order(row)
  }

  #[instrument(name = "db::confirm_payment", skip(self, stamp), fields(order_id = %stamp.order_id))]
  async fn confirm_payment(&self, stamp: &PaymentStamp, from: &[OrderStatus]) -> Result<Option<Order>, StoreError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
      "UPDATE orders SET status = $2, payment_id = $3, paid_amount_cents = $4, paid_at = $5, \
       payment_confirmed_via = $6, updated_at = now() \
       WHERE id = $1 AND status = ANY($7) AND payment_id IS NULL \
       RETURNING {}",
      ORDER_COLUMNS
    ))
    .bind(stamp.order_id)
    .bind(stamp.status.as_str())
    .bind(&stamp.payment_id)
    .bind(stamp.paid_amount_cents)
    .bind(stamp.paid_at)
    .bind(&stamp.confirmed_via)
    .bind(status_list(from))
    .fetch_optional(self.pool())
    .await
    .map_err(store_error)?;
    if row.is_none() {
      debug!("Conditional payment update matched zero rows.");
    }
    into_order(row)
  }

  #[instrument(name = "db::transition", skip(self, from, note))]
  async fn transition(
    &self,
    order_id: Uuid,
    from: &[OrderStatus],
    to: OrderStatus,
    note: Option<&str>,
  ) -> Result<Option<Order>, StoreError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
      "UPDATE orders SET status = $2, updated_at = now(), \
       notes = CASE WHEN $4::text IS NULL THEN notes \
                    WHEN notes IS NULL OR notes = '' THEN $4 \
                    ELSE notes || ' | ' || $4 END \
       WHERE id = $1 AND status = ANY($3) \
       RETURNING {}",
      ORDER_COLUMNS
    ))
    .bind(order_id)
    .bind(to.as_str())
    .bind(status_list(from))
    .bind(note)
    .fetch_optional(self.pool())
    .await
    .map_err(store_error)?;
    into_order(row)
  }

  async fn attach_checkout(&self, order_id: Uuid, checkout_id: &str) -> Result<Option<Order>, StoreError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
      "UPDATE orders SET checkout_id = $2, updated_at = now() \
       WHERE id = $1 AND checkout_id IS NULL AND status IN ('pending', 'unpaid') \
       RETURNING {}",
      ORDER_COLUMNS
    ))
    .bind(order_id)
    .bind(checkout_id)
    .fetch_optional(self.pool())
    .await
    .map_err(store_error)?;
    into_order(row)
  }

  async fn list_reconcilable(&self, window: ReconcileWindow) -> Result<Vec<Order>, StoreError> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
      "SELECT {} FROM orders \
       WHERE status IN ('pending', 'unpaid') AND checkout_id IS NOT NULL AND payment_id IS NULL \
         AND created_at < $1 AND created_at > $2 \
       ORDER BY created_at ASC LIMIT $3",
      ORDER_COLUMNS
    ))
    .bind(window.created_before)
    .bind(window.created_after)
    .bind(i64::from(window.limit))
    .fetch_all(self.pool())
    .await
    .map_err(store_error)?;
    rows.into_iter().map(Order::try_from).collect()
  }

  async fn abandon_stale(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError> {
    let result = sqlx::query(
      "UPDATE orders SET status = 'abandoned', updated_at = now() \
       WHERE status IN ('pending', 'unpaid') AND payment_id IS NULL AND created_at < $1",
    )
    .bind(created_before)
    .execute(self.pool())
    .await
    .map_err(store_error)?;
    Ok(result.rows_affected())
  }
}
