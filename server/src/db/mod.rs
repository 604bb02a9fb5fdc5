// server/src/db/mod.rs

//! Postgres adapters for every storage port. Uniqueness and conditional
//! updates are left to the database; nothing here locks in-process.

pub mod ledger;
pub mod orders;
pub mod side_effects;

use payconfirm::StoreError;
use sqlx::PgPool;

/// One pool behind all storage ports.
#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
  loyalty_threshold: i64,
}

impl PgStore {
  pub fn new(pool: PgPool, loyalty_threshold: i64) -> Self {
    Self {
      pool,
      loyalty_threshold,
    }
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }
}

/// Unique violations are an outcome, not a fault; everything else is a backend error.
pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
  if let sqlx::Error::Database(db_err) = &err {
    if db_err.is_unique_violation() {
      return StoreError::UniqueViolation {
        constraint: db_err.constraint().unwrap_or("unknown").to_string(),
      };
    }
  }
  StoreError::Backend(err.to_string())
}
