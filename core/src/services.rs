// core/src/services.rs

//! Wires ports and settings into the channel services. The server builds
//! this once at startup; tests build it over the in-memory adapters.

use crate::collect::CheckoutCollector;
use crate::dead_letter::DeadLetterRecorder;
use crate::engine::{ConfirmationEngine, EngineConfig};
use crate::ledger::IdempotencyGate;
use crate::loyalty::RewardIssuer;
use crate::memory::{InMemoryProcessor, InMemoryStore};
use crate::poller::ActivePoller;
use crate::ports::{
  AlertSink, CompAuditLog, DeadLetterSink, EventLedger, LoyaltyLedger, OrderStore, PaymentProcessor, ReceiptQueue,
  RefundLockStore, VoucherStore,
};
use crate::refund::RefundCoordinator;
use crate::staff::{CompPolicy, StatusService};
use crate::sweeper::{ReconciliationSweeper, SweepConfig};
use crate::upstream::UpstreamResolver;
use crate::verify::{SignatureVerifier, VerifierConfig};
use crate::webhook::WebhookReceiver;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Ports {
  pub orders: Arc<dyn OrderStore>,
  pub ledger: Arc<dyn EventLedger>,
  pub dead_letters: Arc<dyn DeadLetterSink>,
  pub alerts: Option<Arc<dyn AlertSink>>,
  pub receipts: Arc<dyn ReceiptQueue>,
  pub loyalty: Arc<dyn LoyaltyLedger>,
  pub vouchers: Arc<dyn VoucherStore>,
  pub refund_locks: Arc<dyn RefundLockStore>,
  pub comp_audit: Arc<dyn CompAuditLog>,
  pub processor: Arc<dyn PaymentProcessor>,
}

impl Ports {
  /// Every storage port on one in-memory store; alerts go to the same store.
  pub fn in_memory(store: &Arc<InMemoryStore>, processor: &Arc<InMemoryProcessor>) -> Self {
    Self {
      orders: store.clone(),
      ledger: store.clone(),
      dead_letters: store.clone(),
      alerts: Some(store.clone()),
      receipts: store.clone(),
      loyalty: store.clone(),
      vouchers: store.clone(),
      refund_locks: store.clone(),
      comp_audit: store.clone(),
      processor: processor.clone(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Settings {
  pub engine: EngineConfig,
  pub verifier: VerifierConfig,
  pub sweep: SweepConfig,
  pub comp: CompPolicy,
  pub upstream_timeout: Duration,
  pub refund_lock_ttl: chrono::Duration,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      engine: EngineConfig::default(),
      verifier: VerifierConfig::default(),
      sweep: SweepConfig::default(),
      comp: CompPolicy::default(),
      upstream_timeout: Duration::from_millis(8000),
      refund_lock_ttl: chrono::Duration::minutes(5),
    }
  }
}

/// The confirmation engine plus each channel that feeds it.
#[derive(Clone)]
pub struct PaymentServices {
  pub engine: ConfirmationEngine,
  pub webhooks: Arc<WebhookReceiver>,
  pub poller: Arc<ActivePoller>,
  pub sweeper: ReconciliationSweeper,
  pub statuses: StatusService,
  pub collector: CheckoutCollector,
}

impl PaymentServices {
  pub fn build(ports: Ports, settings: Settings) -> Self {
    let gate = IdempotencyGate::new(ports.ledger.clone());
    let mut dead_letters = DeadLetterRecorder::new(ports.dead_letters.clone());
    if let Some(alerts) = ports.alerts.clone() {
      dead_letters = dead_letters.with_alerts(alerts);
    }
    let rewards = RewardIssuer::new(
      ports.loyalty.clone(),
      ports.vouchers.clone(),
      ports.refund_locks.clone(),
      settings.refund_lock_ttl,
    );
    let resolver = UpstreamResolver::new(ports.processor.clone(), settings.upstream_timeout);
    let currency = settings.engine.settlement_currency.clone();

    let engine = ConfirmationEngine::new(
      ports.orders.clone(),
      gate.clone(),
      dead_letters.clone(),
      ports.receipts.clone(),
      rewards,
      settings.engine,
    );
    let refunds = RefundCoordinator::new(
      ports.orders.clone(),
      ports.refund_locks.clone(),
      ports.loyalty.clone(),
      dead_letters.clone(),
      settings.refund_lock_ttl,
    );

    Self {
      webhooks: Arc::new(WebhookReceiver::new(
        SignatureVerifier::new(settings.verifier),
        gate,
        engine.clone(),
        refunds,
      )),
      poller: Arc::new(ActivePoller::new(ports.orders.clone(), resolver.clone(), engine.clone())),
      sweeper: ReconciliationSweeper::new(ports.orders.clone(), resolver.clone(), engine.clone(), settings.sweep),
      statuses: StatusService::new(ports.orders.clone(), ports.comp_audit.clone(), dead_letters, settings.comp),
      collector: CheckoutCollector::new(ports.orders, resolver, currency),
      engine,
    }
  }
}
