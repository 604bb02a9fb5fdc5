// server/src/web/handlers/poll_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use payconfirm::PollRequest;
use tracing::instrument;

use crate::errors::Result as AppResult;
use crate::state::AppState;

/// Still-pending answers are 200s; only real faults become errors.
#[instrument(name = "handler::poll_payment", skip(app_state, req, body), fields(order_id = %body.order_id))]
pub async fn poll_payment_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Json<PollRequest>,
) -> AppResult<HttpResponse> {
  app_state.authorizer.authorize(&req, false).await?;
  let response = app_state.services.poller.poll(body.into_inner()).await?;
  Ok(HttpResponse::Ok().json(response))
}
