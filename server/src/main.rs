// server/src/main.rs

mod config;
mod db;
mod errors;
mod services;
mod state;
mod web;

use crate::config::AppConfig;
use crate::db::PgStore;
use crate::services::alerts::ChatAlertSink;
use crate::services::auth_service::StaticTokenAuthorizer;
use crate::services::processor::SquareClient;
use crate::services::scheduler::spawn_sweeps;
use crate::state::AppState;

use actix_web::{web as actix_data, App, HttpServer};
use payconfirm::ports::AlertSink;
use payconfirm::{PaymentServices, Ports};
use sqlx::PgPool;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

fn startup_error(stage: &str, e: impl std::fmt::Display) -> io::Error {
  tracing::error!(error = %e, stage, "Startup failed.");
  io::Error::new(io::ErrorKind::Other, format!("{}: {}", stage, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting payment confirmation server...");

  let app_config = Arc::new(AppConfig::from_env().map_err(|e| startup_error("configuration", e))?);

  let db_pool = PgPool::connect(&app_config.database_url)
    .await
    .map_err(|e| startup_error("database connection", e))?;
  tracing::info!("Connected to the database.");

  if app_config.run_migrations {
    sqlx::migrate!("./migrations")
      .run(&db_pool)
      .await
      .map_err(|e| startup_error("migrations", e))?;
    tracing::info!("Migrations applied.");
  }

  let store = Arc::new(PgStore::new(db_pool, app_config.loyalty_reward_threshold));
  let processor = SquareClient::new(
    &app_config.processor_base_url,
    &app_config.processor_access_token,
    &app_config.processor_api_version,
    Duration::from_millis(app_config.processor_timeout_ms),
  )
  .map_err(|e| startup_error("processor client", e))?;

  let alerts: Option<Arc<dyn AlertSink>> = match app_config.alert_webhook_url.as_deref() {
    Some(url) => {
      let sink = ChatAlertSink::new(url).map_err(|e| startup_error("alert sink", e))?;
      Some(Arc::new(sink) as Arc<dyn AlertSink>)
    }
    None => {
      tracing::warn!("ALERT_WEBHOOK_URL not set; dead letters will not be fanned out.");
      None
    }
  };

  let ports = Ports {
    orders: store.clone(),
    ledger: store.clone(),
    dead_letters: store.clone(),
    alerts,
    receipts: store.clone(),
    loyalty: store.clone(),
    vouchers: store.clone(),
    refund_locks: store.clone(),
    comp_audit: store,
    processor: Arc::new(processor),
  };
  let services = PaymentServices::build(ports, app_config.settings());

  let authorizer =
    StaticTokenAuthorizer::from_spec(&app_config.staff_tokens).map_err(|e| startup_error("staff tokens", e))?;

  let _sweeps = if app_config.sweep_interval_secs > 0 {
    Some(spawn_sweeps(
      services.clone(),
      Duration::from_secs(app_config.sweep_interval_secs),
    ))
  } else {
    tracing::info!("In-process sweeps disabled; relying on the cron endpoints.");
    None
  };

  let app_state = AppState {
    services,
    config: app_config.clone(),
    authorizer: Arc::new(authorizer),
  };

  // Actix buffers up to twice the verifier limit so oversize bodies reach
  // the receiver and get a 413 with a JSON body.
  let webhook_body_limit = app_config.webhook_max_body_bytes.saturating_mul(2);

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Binding server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(|cfg| web::configure_app_routes(cfg, webhook_body_limit))
  })
  .bind(&server_address)?
  .run()
  .await
}
