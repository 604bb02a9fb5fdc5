// server/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use payconfirm::InboundWebhook;
use tracing::{info, instrument};

use crate::errors::Result as AppResult;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-square-hmacsha256-signature";
pub const TIMESTAMP_HEADER: &str = "x-square-hmacsha256-signature-timestamp";

fn header(req: &HttpRequest, name: &str) -> Option<String> {
  req
    .headers()
    .get(name)
    .and_then(|h| h.to_str().ok())
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
}

/// 200 for new and duplicate deliveries alike; 4xx only when verification
/// or parsing fails, 5xx when the ledger is unreachable and a retry can help.
#[instrument(
  name = "handler::webhook",
  skip(app_state, req, body),
  fields(webhook_source = %source.as_str(), body_bytes = body.len())
)]
pub async fn webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  source: web::Path<String>,
  body: web::Bytes,
) -> AppResult<HttpResponse> {
  let inbound = InboundWebhook {
    source: source.into_inner(),
    raw_body: body.to_vec(),
    signature: header(&req, SIGNATURE_HEADER),
    timestamp: header(&req, TIMESTAMP_HEADER),
    received_at: Utc::now(),
  };

  let ack = app_state.services.webhooks.receive(inbound).await?;
  info!(outcome = %ack.outcome, duplicate = ack.duplicate, "Webhook processed.");
  Ok(HttpResponse::Ok().json(ack))
}
