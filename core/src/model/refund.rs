// core/src/model/refund.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Short-lived advisory marker held while a refund reverses loyalty. Not
/// storage-enforced: it only discourages concurrent redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundLock {
  pub payment_id: String,
  pub user_id: Uuid,
  pub locked_at: DateTime<Utc>,
}

/// Points balance after a loyalty mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyUpdate {
  pub points: i64,
  pub voucher_earned: bool,
}

/// Persisted form of a minted voucher. The plaintext code never reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoucherRecord {
  pub id: Uuid,
  pub user_id: Uuid,
  pub code_hash: String,
  pub masked_code: String,
  pub source_order_id: Uuid,
  pub created_at: DateTime<Utc>,
}
