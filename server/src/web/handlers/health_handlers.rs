// server/src/web/handlers/health_handlers.rs

use actix_web::HttpResponse;
use chrono::Utc;
use serde_json::json;

pub async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok()
    .insert_header(("Cache-Control", "no-cache"))
    .json(json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() }))
}
