// server/src/services/scheduler.rs

use payconfirm::PaymentServices;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, Instrument};

/// In-process stand-in for an external cron: one reconciliation sweep and
/// one stale-order cleanup per tick. Runs never overlap.
pub fn spawn_sweeps(services: PaymentServices, every: Duration) -> JoinHandle<()> {
  info!(interval_secs = every.as_secs(), "Starting reconciliation scheduler.");
  tokio::spawn(
    async move {
      let mut ticker = tokio::time::interval(every);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      // The first tick completes immediately; let the server come up first.
      ticker.tick().await;
      loop {
        ticker.tick().await;
        if let Err(e) = services.sweeper.run().await {
          error!(error = %e, "Scheduled reconciliation sweep failed.");
        }
        if let Err(e) = services.sweeper.abandon_stale().await {
          error!(error = %e, "Scheduled stale-order cleanup failed.");
        }
      }
    }
    .instrument(info_span!("scheduler")),
  )
}
