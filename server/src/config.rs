// server/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use payconfirm::receipt::ReceiptHeader;
use payconfirm::{CompPolicy, EngineConfig, Settings, SweepConfig, VerifierConfig};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub app_base_url: String,
  pub run_migrations: bool,

  // Webhook channel
  pub webhook_signature_key: String,
  pub webhook_notification_url: String,
  pub webhook_max_drift_secs: i64,
  pub webhook_max_body_bytes: usize,

  /// When unset only the in-process scheduler may trigger sweeps.
  pub cron_secret: Option<String>,
  pub sweep_interval_secs: u64,
  pub sweep_min_age_secs: i64,
  pub sweep_max_age_secs: i64,
  pub sweep_batch_limit: u32,

  // Upstream processor
  pub processor_base_url: String,
  pub processor_access_token: String,
  pub processor_api_version: String,
  pub processor_timeout_ms: u64,

  pub amount_tolerance_cents: i64,
  pub settlement_currency: String,
  pub comp_cap_cents: i64,
  pub comp_reason_min_len: usize,
  pub loyalty_reward_threshold: i64,
  pub refund_lock_ttl_secs: i64,

  /// `token:role:email` entries separated by `;`.
  pub staff_tokens: String,
  pub alert_webhook_url: Option<String>,
  pub receipt_shop_name: Option<String>,
}

fn parse_or<T: FromStr>(name: &str, default: &str) -> Result<T>
where
  T::Err: fmt::Display,
{
  let raw = env::var(name).unwrap_or_else(|_| default.to_string());
  raw
    .trim()
    .parse::<T>()
    .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e)))
}

fn optional(name: &str) -> Option<String> {
  env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = parse_or::<u16>("SERVER_PORT", "8080")?;
    let database_url = get_env("DATABASE_URL")?;
    let app_base_url = get_env("APP_BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", server_host, server_port));
    let webhook_notification_url = get_env("WEBHOOK_NOTIFICATION_URL")
      .unwrap_or_else(|_| format!("{}/api/v1/webhooks/square", app_base_url.trim_end_matches('/')));

    let config = Self {
      run_migrations: parse_or("RUN_MIGRATIONS", "true")?,
      webhook_signature_key: get_env("WEBHOOK_SIGNATURE_KEY")?,
      webhook_notification_url,
      webhook_max_drift_secs: parse_or("WEBHOOK_MAX_DRIFT_SECS", "300")?,
      webhook_max_body_bytes: parse_or("WEBHOOK_MAX_BODY_BYTES", "65536")?,
      cron_secret: optional("CRON_SECRET"),
      sweep_interval_secs: parse_or("SWEEP_INTERVAL_SECS", "120")?,
      sweep_min_age_secs: parse_or("SWEEP_MIN_AGE_SECS", "60")?,
      sweep_max_age_secs: parse_or("SWEEP_MAX_AGE_SECS", "2700")?,
      sweep_batch_limit: parse_or("SWEEP_BATCH_LIMIT", "20")?,
      processor_base_url: get_env("PROCESSOR_BASE_URL").unwrap_or_else(|_| "https://connect.squareup.com".to_string()),
      processor_access_token: get_env("PROCESSOR_ACCESS_TOKEN")?,
      processor_api_version: get_env("PROCESSOR_API_VERSION").unwrap_or_else(|_| "2025-01-23".to_string()),
      processor_timeout_ms: parse_or("PROCESSOR_TIMEOUT_MS", "8000")?,
      amount_tolerance_cents: parse_or("AMOUNT_TOLERANCE_CENTS", "2")?,
      settlement_currency: get_env("SETTLEMENT_CURRENCY").unwrap_or_else(|_| "USD".to_string()),
      comp_cap_cents: parse_or("COMP_CAP_CENTS", "1500")?,
      comp_reason_min_len: parse_or("COMP_REASON_MIN_LEN", "2")?,
      loyalty_reward_threshold: parse_or("LOYALTY_REWARD_THRESHOLD", "10")?,
      refund_lock_ttl_secs: parse_or("REFUND_LOCK_TTL_SECS", "300")?,
      staff_tokens: get_env("STAFF_TOKENS").unwrap_or_default(),
      alert_webhook_url: optional("ALERT_WEBHOOK_URL"),
      receipt_shop_name: optional("RECEIPT_SHOP_NAME"),
      server_host,
      server_port,
      database_url,
      app_base_url,
    };

    if config.loyalty_reward_threshold <= 0 {
      return Err(AppError::Config("LOYALTY_REWARD_THRESHOLD must be positive".to_string()));
    }
    if config.sweep_min_age_secs >= config.sweep_max_age_secs {
      return Err(AppError::Config(
        "SWEEP_MIN_AGE_SECS must be below SWEEP_MAX_AGE_SECS".to_string(),
      ));
    }

    tracing::info!("Application configuration loaded successfully.");
    tracing::debug!(config = ?config, "Loaded config details");
    Ok(config)
  }
}

impl AppConfig {
  /// Policy knobs for the confirmation pipeline.
  pub fn settings(&self) -> Settings {
    let mut receipt_header = ReceiptHeader::default();
    if let Some(name) = &self.receipt_shop_name {
      receipt_header.shop_name = name.clone();
    }
    Settings {
      engine: EngineConfig {
        amount_tolerance_cents: self.amount_tolerance_cents,
        settlement_currency: self.settlement_currency.clone(),
        receipt_header,
      },
      verifier: VerifierConfig {
        signature_key: self.webhook_signature_key.clone(),
        notification_url: self.webhook_notification_url.clone(),
        max_drift_secs: self.webhook_max_drift_secs,
        max_body_bytes: self.webhook_max_body_bytes,
      },
      sweep: SweepConfig {
        min_age: chrono::Duration::seconds(self.sweep_min_age_secs),
        max_age: chrono::Duration::seconds(self.sweep_max_age_secs),
        batch_limit: self.sweep_batch_limit,
      },
      comp: CompPolicy {
        cap_cents: self.comp_cap_cents,
        reason_min_len: self.comp_reason_min_len,
      },
      upstream_timeout: Duration::from_millis(self.processor_timeout_ms),
      refund_lock_ttl: chrono::Duration::seconds(self.refund_lock_ttl_secs),
    }
  }

  #[cfg(test)]
  pub fn for_tests() -> Self {
    Self {
      server_host: "127.0.0.1".to_string(),
      server_port: 8080,
      database_url: String::new(),
      app_base_url: "http://127.0.0.1:8080".to_string(),
      run_migrations: false,
      webhook_signature_key: "whsec_test".to_string(),
      webhook_notification_url: "http://127.0.0.1:8080/api/v1/webhooks/square".to_string(),
      webhook_max_drift_secs: 300,
      webhook_max_body_bytes: 4096,
      cron_secret: Some("cron-test-secret".to_string()),
      sweep_interval_secs: 0,
      sweep_min_age_secs: 60,
      sweep_max_age_secs: 2700,
      sweep_batch_limit: 20,
      processor_base_url: "http://127.0.0.1:9".to_string(),
      processor_access_token: "test-token".to_string(),
      processor_api_version: "2025-01-23".to_string(),
      processor_timeout_ms: 200,
      amount_tolerance_cents: 2,
      settlement_currency: "USD".to_string(),
      comp_cap_cents: 1500,
      comp_reason_min_len: 2,
      loyalty_reward_threshold: 10,
      refund_lock_ttl_secs: 300,
      staff_tokens: "staff-token:staff:barista@cafe.example;manager-token:manager:lead@cafe.example".to_string(),
      alert_webhook_url: None,
      receipt_shop_name: None,
    }
  }
}

impl fmt::Debug for AppConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    const REDACTED: &str = "[REDACTED]";
    f.debug_struct("AppConfig")
      .field("server_host", &self.server_host)
      .field("server_port", &self.server_port)
      .field("database_url", &REDACTED)
      .field("app_base_url", &self.app_base_url)
      .field("run_migrations", &self.run_migrations)
      .field("webhook_signature_key", &REDACTED)
      .field("webhook_notification_url", &self.webhook_notification_url)
      .field("webhook_max_drift_secs", &self.webhook_max_drift_secs)
      .field("webhook_max_body_bytes", &self.webhook_max_body_bytes)
      .field("cron_secret", &self.cron_secret.as_ref().map(|_| REDACTED))
      .field("sweep_interval_secs", &self.sweep_interval_secs)
      .field("sweep_min_age_secs", &self.sweep_min_age_secs)
      .field("sweep_max_age_secs", &self.sweep_max_age_secs)
      .field("sweep_batch_limit", &self.sweep_batch_limit)
      .field("processor_base_url", &self.processor_base_url)
      .field("processor_access_token", &REDACTED)
      .field("processor_api_version", &self.processor_api_version)
      .field("processor_timeout_ms", &self.processor_timeout_ms)
      .field("amount_tolerance_cents", &self.amount_tolerance_cents)
      .field("settlement_currency", &self.settlement_currency)
      .field("comp_cap_cents", &self.comp_cap_cents)
      .field("comp_reason_min_len", &self.comp_reason_min_len)
      .field("loyalty_reward_threshold", &self.loyalty_reward_threshold)
      .field("refund_lock_ttl_secs", &self.refund_lock_ttl_secs)
      .field("staff_tokens", &REDACTED)
      .field("alert_webhook_url", &self.alert_webhook_url.as_ref().map(|_| REDACTED))
      .field("receipt_shop_name", &self.receipt_shop_name)
      .finish()
  }
}
