// server/src/services/alerts.rs

use anyhow::{bail, Context};
use async_trait::async_trait;
use payconfirm::model::{Severity, SystemError};
use payconfirm::ports::AlertSink;
use payconfirm::receipt::format_money;
use serde_json::{json, Value};
use std::time::Duration;

/// Posts dead letters to a chat webhook as an embed.
pub struct ChatAlertSink {
  http: reqwest::Client,
  url: String,
}

impl ChatAlertSink {
  pub fn new(url: &str) -> anyhow::Result<Self> {
    let http = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;
    Ok(Self {
      http,
      url: url.to_string(),
    })
  }
}

fn embed(entry: &SystemError) -> Value {
  let color = match entry.severity {
    Severity::Critical => 0xFF0000,
    Severity::High | Severity::Warning => 0xFFAA00,
    Severity::Info => 0x3498DB,
  };
  let order = entry
    .order_id
    .map(|id| id.simple().to_string()[..8].to_string())
    .unwrap_or_else(|| "N/A".to_string());
  json!({
    "embeds": [{
      "title": format!("{}: {}", entry.severity.as_str().to_uppercase(), entry.error_type),
      "description": entry.message.chars().take(1000).collect::<String>(),
      "color": color,
      "fields": [
        { "name": "Source", "value": entry.source_function, "inline": true },
        { "name": "Amount", "value": entry.amount_cents.map(format_money).unwrap_or_else(|| "N/A".to_string()), "inline": true },
        { "name": "Order ID", "value": order, "inline": true },
        { "name": "Payment ID", "value": entry.payment_id.as_deref().unwrap_or("N/A"), "inline": true },
      ],
      "timestamp": entry.created_at.to_rfc3339(),
    }]
  })
}

#[async_trait]
impl AlertSink for ChatAlertSink {
  async fn alert(&self, entry: &SystemError) -> anyhow::Result<()> {
    let response = self
      .http
      .post(&self.url)
      .json(&embed(entry))
      .send()
      .await
      .context("post alert")?;
    if !response.status().is_success() {
      bail!("alert webhook returned {}", response.status());
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use payconfirm::model::SystemErrorType;
  use uuid::Uuid;

  #[test]
  fn embed_carries_money_and_short_order_id() {
    let order_id = Uuid::new_v4();
    let entry = SystemError::new(SystemErrorType::OrphanPayment, "confirmation_engine", "update failed")
      .order(order_id)
      .payment("pay_1")
      .amount(550);
    let body = embed(&entry);
    let fields = &body["embeds"][0]["fields"];
    assert_eq!(fields[1]["value"], "$5.50");
    assert_eq!(fields[2]["value"], order_id.simple().to_string()[..8]);
    assert_eq!(fields[3]["value"], "pay_1");
    assert_eq!(body["embeds"][0]["color"], 0xFF0000);
  }
}
