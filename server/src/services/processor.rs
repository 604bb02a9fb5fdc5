// server/src/services/processor.rs

//! REST client for the upstream processor (Square-style Terminal and
//! Payments API). Only status, amount, currency, reference and payment ids
//! are read from responses.

use async_trait::async_trait;
use payconfirm::model::{CheckoutStatus, NewTerminalCheckout, PaymentState, ProcessorPayment, TerminalCheckout};
use payconfirm::ports::PaymentProcessor;
use payconfirm::UpstreamError;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Deserialize, Serialize)]
struct Money {
  amount: i64,
  currency: String,
}

#[derive(Debug, Deserialize)]
struct WireCheckout {
  id: String,
  status: CheckoutStatus,
  #[serde(default)]
  payment_ids: Vec<String>,
  #[serde(default)]
  reference_id: Option<String>,
  amount_money: Money,
}

#[derive(Debug, Deserialize)]
struct CheckoutEnvelope {
  checkout: WireCheckout,
}

#[derive(Debug, Deserialize)]
struct WirePayment {
  id: String,
  status: PaymentState,
  amount_money: Money,
  #[serde(default)]
  reference_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentEnvelope {
  payment: WirePayment,
}

impl From<WireCheckout> for TerminalCheckout {
  fn from(wire: WireCheckout) -> Self {
    TerminalCheckout {
      id: wire.id,
      status: wire.status,
      payment_ids: wire.payment_ids,
      reference_id: wire.reference_id,
      amount_cents: wire.amount_money.amount,
      currency: wire.amount_money.currency,
    }
  }
}

impl From<WirePayment> for ProcessorPayment {
  fn from(wire: WirePayment) -> Self {
    ProcessorPayment {
      id: wire.id,
      status: wire.status,
      amount_cents: wire.amount_money.amount,
      currency: wire.amount_money.currency,
      reference_id: wire.reference_id,
    }
  }
}

#[derive(Clone)]
pub struct SquareClient {
  http: reqwest::Client,
  base_url: String,
  access_token: String,
  api_version: String,
  timeout: Duration,
}

impl SquareClient {
  pub fn new(base_url: &str, access_token: &str, api_version: &str, timeout: Duration) -> anyhow::Result<Self> {
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
      access_token: access_token.to_string(),
      api_version: api_version.to_string(),
      timeout,
    })
  }

  fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
    request
      .bearer_auth(&self.access_token)
      .header("Square-Version", &self.api_version)
      .header("Accept", "application/json")
  }

  fn transport_error(&self, err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
      UpstreamError::Timeout(self.timeout)
    } else if err.is_decode() {
      UpstreamError::Decode(err.to_string())
    } else {
      UpstreamError::Transport(err.to_string())
    }
  }

  // 404 is an answer ("no such object"), not a failure.
  async fn read_optional<T: DeserializeOwned>(&self, response: Response) -> Result<Option<T>, UpstreamError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    self.read(response).await.map(Some)
  }

  async fn read<T: DeserializeOwned>(&self, response: Response) -> Result<T, UpstreamError> {
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(status = status.as_u16(), "Processor returned an error status.");
      return Err(UpstreamError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
      });
    }
    response.json::<T>().await.map_err(|e| self.transport_error(e))
  }
}

#[async_trait]
impl PaymentProcessor for SquareClient {
  #[instrument(name = "processor::get_checkout", skip(self))]
  async fn get_checkout(&self, checkout_id: &str) -> Result<Option<TerminalCheckout>, UpstreamError> {
    let url = format!("{}/v2/terminals/checkouts/{}", self.base_url, checkout_id);
    let response = self
      .authorized(self.http.get(url))
      .send()
      .await
      .map_err(|e| self.transport_error(e))?;
    let envelope: Option<CheckoutEnvelope> = self.read_optional(response).await?;
    debug!(found = envelope.is_some(), "Checkout fetched.");
    Ok(envelope.map(|e| e.checkout.into()))
  }

  #[instrument(name = "processor::get_payment", skip(self))]
  async fn get_payment(&self, payment_id: &str) -> Result<Option<ProcessorPayment>, UpstreamError> {
    let url = format!("{}/v2/payments/{}", self.base_url, payment_id);
    let response = self
      .authorized(self.http.get(url))
      .send()
      .await
      .map_err(|e| self.transport_error(e))?;
    let envelope: Option<PaymentEnvelope> = self.read_optional(response).await?;
    Ok(envelope.map(|e| e.payment.into()))
  }

  #[instrument(
    name = "processor::create_terminal_checkout",
    skip(self, request),
    fields(reference_id = %request.reference_id, amount_cents = request.amount_cents)
  )]
  async fn create_terminal_checkout(&self, request: &NewTerminalCheckout) -> Result<TerminalCheckout, UpstreamError> {
    let url = format!("{}/v2/terminals/checkouts", self.base_url);
    let body = json!({
      "idempotency_key": request.idempotency_key,
      "checkout": {
        "amount_money": Money { amount: request.amount_cents, currency: request.currency.clone() },
        "device_options": {
          "device_id": request.device_id,
          "skip_receipt_screen": false,
          "collect_signature": true,
        },
        "reference_id": request.reference_id,
        "note": request.note,
      }
    });
    let response = self
      .authorized(self.http.post(url))
      .json(&body)
      .send()
      .await
      .map_err(|e| self.transport_error(e))?;
    let envelope: CheckoutEnvelope = self.read(response).await?;
    Ok(envelope.checkout.into())
  }
}
