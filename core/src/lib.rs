// core/src/lib.rs

//! payconfirm: exactly-once payment confirmation.
//!
//! A payment captured upstream can be reported by three racing channels: a
//! signed webhook, client-driven polling and a scheduled reconciliation
//! sweep. All of them funnel into one [`ConfirmationEngine`], whose
//! guarantees rest only on storage primitives:
//!  - an insert-only idempotency ledger (a key conflict means "already done"),
//!  - compare-and-swap status updates (zero rows means "someone else won"),
//!  - a dead-letter record whenever money moved but the order could not be updated.
//!
//! Storage, the processor and side-effect collaborators are reached through
//! the traits in [`ports`]; `memory` provides in-process implementations.

pub mod collect;
pub mod dead_letter;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod loyalty;
pub mod memory;
pub mod model;
pub mod pipeline;
pub mod poller;
pub mod ports;
pub mod receipt;
pub mod refund;
pub mod services;
pub mod staff;
pub mod state_machine;
pub mod sweeper;
pub mod upstream;
pub mod verify;
pub mod webhook;

pub use crate::collect::CheckoutCollector;
pub use crate::dead_letter::DeadLetterRecorder;
pub use crate::engine::{ConfirmationEngine, EngineConfig};
pub use crate::error::{Error, Result, StoreError, TransitionError, UpstreamError, VerifyError};
pub use crate::ledger::IdempotencyGate;
pub use crate::pipeline::{ContextData, Pipeline, PipelineControl, PipelineResult};
pub use crate::poller::{ActivePoller, PollRequest, PollResponse, PollStatus};
pub use crate::refund::{RefundCoordinator, RefundOutcome};
pub use crate::services::{PaymentServices, Ports, Settings};
pub use crate::staff::{CompPolicy, StatusService};
pub use crate::sweeper::{ReconciliationSweeper, SweepConfig, SweepSummary};
pub use crate::upstream::{CheckoutResolution, UpstreamResolver};
pub use crate::verify::{SignatureVerifier, VerifierConfig};
pub use crate::webhook::{InboundWebhook, WebhookAck, WebhookReceiver};
