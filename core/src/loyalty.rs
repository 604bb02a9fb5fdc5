// core/src/loyalty.rs

use crate::error::StoreError;
use crate::model::{LoyaltyUpdate, Order, VoucherRecord};
use crate::ports::{LoyaltyLedger, RefundLockStore, VoucherStore};
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Unambiguous characters only: no 0/O, 1/I.
const VOUCHER_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const VOUCHER_GROUPS: usize = 3;
const VOUCHER_GROUP_LEN: usize = 4;

/// `BRW-XXXX-XXXX-XXXX` drawn from the OS random source.
pub fn generate_voucher_code() -> String {
  let mut rng = OsRng;
  let groups: Vec<String> = (0..VOUCHER_GROUPS)
    .map(|_| {
      (0..VOUCHER_GROUP_LEN)
        .map(|_| VOUCHER_ALPHABET[rng.gen_range(0..VOUCHER_ALPHABET.len())] as char)
        .collect()
    })
    .collect();
  format!("BRW-{}", groups.join("-"))
}

/// Lowercase hex sha256 of the normalized code. The only form that is stored.
pub fn hash_voucher_code(code: &str) -> String {
  let digest = Sha256::digest(code.trim().to_uppercase().as_bytes());
  hex::encode(digest)
}

pub fn mask_voucher_code(code: &str) -> String {
  let chars: Vec<char> = code.chars().collect();
  let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
  format!("****{}", tail)
}

/// Loyalty side effects of a confirmation. Never fails the caller.
#[derive(Clone)]
pub struct RewardIssuer {
  loyalty: Arc<dyn LoyaltyLedger>,
  vouchers: Arc<dyn VoucherStore>,
  refund_locks: Arc<dyn RefundLockStore>,
  lock_ttl: Duration,
}

impl RewardIssuer {
  pub fn new(
    loyalty: Arc<dyn LoyaltyLedger>,
    vouchers: Arc<dyn VoucherStore>,
    refund_locks: Arc<dyn RefundLockStore>,
    lock_ttl: Duration,
  ) -> Self {
    Self {
      loyalty,
      vouchers,
      refund_locks,
      lock_ttl,
    }
  }

  async fn refund_in_flight(&self, user_id: Uuid) -> Result<bool, StoreError> {
    self.refund_locks.holds(user_id, Utc::now() - self.lock_ttl).await
  }

  /// Credits the order's account. Returns `None` when nothing was credited.
  pub async fn award(&self, order: &Order, paid_amount_cents: i64) -> Option<LoyaltyUpdate> {
    let user_id = order.user_id?;

    match self.refund_in_flight(user_id).await {
      Ok(true) => {
        warn!(order_id = %order.id, %user_id, "Refund in flight for user; loyalty credit skipped.");
        return None;
      }
      Ok(false) => {}
      // The lock is advisory; an unreadable lock does not block the credit.
      Err(e) => warn!(order_id = %order.id, error = %e, "Refund lock lookup failed; crediting anyway."),
    }

    let update = match self.loyalty.increment(user_id, paid_amount_cents, order.id).await {
      Ok(update) => update,
      Err(e) => {
        warn!(order_id = %order.id, %user_id, error = %e, "Loyalty increment failed (non-fatal).");
        return None;
      }
    };
    info!(order_id = %order.id, %user_id, points = update.points, "Loyalty credited.");

    if update.voucher_earned {
      self.mint_voucher(user_id, order.id).await;
    }
    Some(update)
  }

  async fn mint_voucher(&self, user_id: Uuid, order_id: Uuid) {
    let code = generate_voucher_code();
    let record = VoucherRecord {
      id: Uuid::new_v4(),
      user_id,
      code_hash: hash_voucher_code(&code),
      masked_code: mask_voucher_code(&code),
      source_order_id: order_id,
      created_at: Utc::now(),
    };
    match self.vouchers.insert(&record).await {
      Ok(()) => info!(%user_id, %order_id, voucher = %record.masked_code, "Voucher issued."),
      Err(e) => warn!(%user_id, %order_id, error = %e, "Voucher could not be stored (non-fatal)."),
    }
  }
}
