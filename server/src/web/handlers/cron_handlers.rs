// server/src/web/handlers/cron_handlers.rs

use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use futures_util::future::{ready, Ready};
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{instrument, warn};

use crate::errors::{AppError, Result as AppResult};
use crate::state::AppState;

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Proof that the caller presented the shared cron secret. Without a
/// configured secret, only the in-process scheduler may sweep.
#[derive(Debug)]
pub struct CronCaller;

impl CronCaller {
  fn check(req: &HttpRequest) -> Result<Self, AppError> {
    let expected = req
      .app_data::<web::Data<AppState>>()
      .and_then(|state| state.config.cron_secret.clone());
    let Some(expected) = expected else {
      warn!("Cron endpoint called but no CRON_SECRET is configured.");
      return Err(AppError::Forbidden("Cron access denied".to_string()));
    };
    let presented = req
      .headers()
      .get(CRON_SECRET_HEADER)
      .map(|h| h.as_bytes())
      .unwrap_or_default();
    if bool::from(presented.ct_eq(expected.as_bytes())) {
      Ok(CronCaller)
    } else {
      warn!("Cron endpoint called with a missing or wrong secret.");
      Err(AppError::Forbidden("Cron access denied".to_string()))
    }
  }
}

impl FromRequest for CronCaller {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
    ready(Self::check(req))
  }
}

#[instrument(name = "handler::reconcile", skip(app_state, _caller))]
pub async fn reconcile_handler(app_state: web::Data<AppState>, _caller: CronCaller) -> AppResult<HttpResponse> {
  let summary = app_state.services.sweeper.run().await?;
  Ok(HttpResponse::Ok().json(summary))
}

#[instrument(name = "handler::cancel_stale", skip(app_state, _caller))]
pub async fn cancel_stale_handler(app_state: web::Data<AppState>, _caller: CronCaller) -> AppResult<HttpResponse> {
  let abandoned = app_state.services.sweeper.abandon_stale().await?;
  Ok(HttpResponse::Ok().json(json!({ "abandoned": abandoned })))
}
