// core/src/error.rs
use crate::model::OrderStatus;
use anyhow::Error as AnyhowError;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a storage port.
///
/// A uniqueness conflict is surfaced separately because callers treat it as
/// a signal ("someone else already did this"), not as a fault.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("Unique constraint violated: {constraint}")]
  UniqueViolation { constraint: String },

  #[error("Storage backend failure: {0}")]
  Backend(String),

  #[error("Stored row could not be decoded: {0}")]
  Corrupt(String),
}

/// Failures talking to the upstream payment processor. All of them are soft:
/// the poller answers "poll again" and the sweeper tries on its next run.
#[derive(Debug, Error)]
pub enum UpstreamError {
  #[error("Upstream call timed out after {0:?}")]
  Timeout(Duration),

  #[error("Upstream transport error: {0}")]
  Transport(String),

  #[error("Upstream returned HTTP {status}: {body}")]
  Status { status: u16, body: String },

  #[error("Upstream response could not be decoded: {0}")]
  Decode(String),
}

/// Reasons an inbound webhook is rejected before any state is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
  #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
  PayloadTooLarge { size: usize, limit: usize },

  #[error("Missing signature header")]
  MissingSignature,

  #[error("Signature does not match payload")]
  SignatureMismatch,

  #[error("Missing timestamp header")]
  MissingTimestamp,

  #[error("Timestamp header is not a unix timestamp: {0}")]
  MalformedTimestamp(String),

  #[error("Timestamp drift of {drift_secs}s exceeds the {window_secs}s window")]
  StaleTimestamp { drift_secs: i64, window_secs: i64 },

  #[error("Signing key rejected by the MAC implementation")]
  InvalidKey,
}

/// Failures of a staff-requested status mutation.
#[derive(Debug, Error)]
pub enum TransitionError {
  #[error("Order {0} not found")]
  OrderNotFound(Uuid),

  #[error("Illegal transition for order {order_id}: {from} -> {to}")]
  Illegal {
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
  },

  #[error("Order {order_id} changed concurrently; it is no longer '{expected}'")]
  Conflict { order_id: Uuid, expected: OrderStatus },

  #[error("Invalid transition request: {0}")]
  Validation(String),

  #[error("Not permitted: {0}")]
  Forbidden(String),

  #[error(transparent)]
  Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("Store error: {0}")]
  Store(#[from] StoreError),

  #[error("Upstream processor error: {0}")]
  Upstream(#[from] UpstreamError),

  #[error("Webhook verification failed: {0}")]
  Verify(#[from] VerifyError),

  #[error("Transition error: {0}")]
  Transition(#[from] TransitionError),

  #[error("Order {0} not found")]
  OrderNotFound(Uuid),

  #[error("Invalid request: {0}")]
  Validation(String),

  #[error("Invalid webhook payload: {0}")]
  Payload(String),

  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },

  #[error("Collaborator failed. Source: {source}")]
  Collaborator {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal error: {0}")]
  Internal(String),
}

impl From<AnyhowError> for Error {
  fn from(err: AnyhowError) -> Self {
    Error::Collaborator { source: err }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
