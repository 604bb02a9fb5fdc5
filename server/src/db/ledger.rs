// server/src/db/ledger.rs

use super::{store_error, PgStore};
use async_trait::async_trait;
use payconfirm::model::{ProcessedEvent, Reservation, SystemError};
use payconfirm::ports::{DeadLetterSink, EventLedger};
use payconfirm::StoreError;

#[async_trait]
impl EventLedger for PgStore {
  async fn insert(&self, event: &ProcessedEvent) -> Result<Reservation, StoreError> {
    let result = sqlx::query(
      "INSERT INTO processed_events (event_key, event_type, source, payload, created_at) \
       VALUES ($1, $2, $3, $4, $5) ON CONFLICT (event_key) DO NOTHING",
    )
    .bind(event.event_key.as_str())
    .bind(&event.event_type)
    .bind(&event.source)
    .bind(&event.payload)
    .bind(event.created_at)
    .execute(self.pool())
    .await
    .map_err(store_error)?;

    Ok(if result.rows_affected() == 1 {
      Reservation::Reserved
    } else {
      Reservation::AlreadyProcessed
    })
  }
}

#[async_trait]
impl DeadLetterSink for PgStore {
  async fn record(&self, entry: &SystemError) -> Result<(), StoreError> {
    sqlx::query(
      "INSERT INTO system_errors \
       (id, error_type, severity, source_function, order_id, payment_id, amount_cents, message, context, created_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(entry.id)
    .bind(entry.error_type.as_str())
    .bind(entry.severity.as_str())
    .bind(&entry.source_function)
    .bind(entry.order_id)
    .bind(entry.payment_id.as_deref())
    .bind(entry.amount_cents)
    .bind(&entry.message)
    .bind(&entry.context)
    .bind(entry.created_at)
    .execute(self.pool())
    .await
    .map_err(store_error)?;
    Ok(())
  }
}
