// server/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use payconfirm::model::StatusChangeRequest;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::Result as AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectRequest {
  pub device_id: String,
}

#[instrument(
  name = "handler::update_order_status",
  skip(app_state, req, body),
  fields(order_id = %body.order_id, status = %body.status)
)]
pub async fn update_status_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Json<StatusChangeRequest>,
) -> AppResult<HttpResponse> {
  let actor = app_state.authorizer.authorize(&req, false).await?;
  let order = app_state.services.statuses.change_status(&actor, body.into_inner()).await?;
  info!(status = %order.status, staff = %actor.email, "Order status updated.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "order": order })))
}

#[instrument(name = "handler::collect_payment", skip(app_state, req, body), fields(order_id = %path.as_ref()))]
pub async fn collect_payment_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  path: web::Path<Uuid>,
  body: web::Json<CollectRequest>,
) -> AppResult<HttpResponse> {
  let actor = app_state.authorizer.authorize(&req, false).await?;
  let order = app_state
    .services
    .collector
    .collect(&actor, path.into_inner(), &body.device_id)
    .await?;
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "checkoutId": order.checkout_id,
    "order": order,
  })))
}
