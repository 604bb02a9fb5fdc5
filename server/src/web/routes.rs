// server/src/web/routes.rs

use actix_web::{error, web, HttpRequest};

use crate::errors::{AppError, Result as AppResult};
use crate::web::handlers::{cron_handlers, health_handlers, order_handlers, poll_handlers, webhook_handlers};

fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
  AppError::Validation(err.to_string()).into()
}

async fn not_found(req: HttpRequest) -> AppResult<actix_web::HttpResponse> {
  Err(AppError::NotFound(format!("No route for {} {}", req.method(), req.path())))
}

/// Mounts every channel under `/api/v1`. `webhook_body_limit` caps what
/// actix buffers; the receiver applies the configured limit itself.
pub fn configure_app_routes(cfg: &mut web::ServiceConfig, webhook_body_limit: usize) {
  cfg.app_data(web::JsonConfig::default().error_handler(json_error));
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_handlers::health_check_handler))
      .service(
        web::scope("/webhooks")
          .app_data(web::PayloadConfig::new(webhook_body_limit))
          .route("/{source}", web::post().to(webhook_handlers::webhook_handler)),
      )
      .service(web::scope("/payments").route("/poll", web::post().to(poll_handlers::poll_payment_handler)))
      .service(
        web::scope("/orders")
          .route("/status", web::post().to(order_handlers::update_status_handler))
          .route("/{order_id}/collect", web::post().to(order_handlers::collect_payment_handler)),
      )
      .service(
        web::scope("/cron")
          .route("/reconcile", web::post().to(cron_handlers::reconcile_handler))
          .route("/cancel-stale", web::post().to(cron_handlers::cancel_stale_handler)),
      )
      .default_service(web::route().to(not_found)),
  );
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AppConfig;
  use crate::services::auth_service::StaticTokenAuthorizer;
  use crate::state::AppState;
  use crate::web::handlers::cron_handlers::CRON_SECRET_HEADER;
  use crate::web::handlers::webhook_handlers::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
  use actix_web::http::header::AUTHORIZATION;
  use actix_web::http::StatusCode;
  use actix_web::{test, App};
  use chrono::{Duration, Utc};
  use payconfirm::memory::{InMemoryProcessor, InMemoryStore};
  use payconfirm::model::{CheckoutStatus, Order, OrderStatus, TerminalCheckout};
  use payconfirm::{PaymentServices, Ports, SignatureVerifier};
  use serde_json::{json, Value};
  use std::sync::Arc;

  struct Fixture {
    state: AppState,
    store: Arc<InMemoryStore>,
    processor: Arc<InMemoryProcessor>,
  }

  fn fixture() -> Fixture {
    let config = AppConfig::for_tests();
    let store = Arc::new(InMemoryStore::new(config.loyalty_reward_threshold));
    let processor = Arc::new(InMemoryProcessor::default());
    let services = PaymentServices::build(Ports::in_memory(&store, &processor), config.settings());
    let authorizer = StaticTokenAuthorizer::from_spec(&config.staff_tokens).unwrap();
    Fixture {
      state: AppState {
        services,
        config: Arc::new(config),
        authorizer: Arc::new(authorizer),
      },
      store,
      processor,
    }
  }

  macro_rules! app {
    ($fixture:expr) => {
      test::init_service(
        App::new()
          .app_data(web::Data::new($fixture.state.clone()))
          .configure(|cfg| configure_app_routes(cfg, 64 * 1024)),
      )
      .await
    };
  }

  fn signed_webhook(fx: &Fixture, body: &Value) -> test::TestRequest {
    let raw = serde_json::to_vec(body).unwrap();
    let signature = SignatureVerifier::new(fx.state.config.settings().verifier).sign(&raw).unwrap();
    test::TestRequest::post()
      .uri("/api/v1/webhooks/square")
      .insert_header((SIGNATURE_HEADER, signature))
      .insert_header((TIMESTAMP_HEADER, Utc::now().timestamp().to_string()))
      .set_payload(raw)
  }

  fn payment_body(order: &Order, event_id: &str, payment_id: &str, amount: i64) -> Value {
    json!({
      "event_id": event_id,
      "type": "payment.updated",
      "data": { "object": { "payment": {
        "id": payment_id,
        "status": "COMPLETED",
        "amount_money": { "amount": amount, "currency": "USD" },
        "reference_id": order.id.to_string(),
      }}}
    })
  }

  #[actix_web::test]
  async fn health_reports_ok() {
    let fx = fixture();
    let app = app!(fx);
    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
  }

  #[actix_web::test]
  async fn malformed_json_and_unknown_routes_get_json_errors() {
    let fx = fixture();
    let app = app!(fx);

    let bad = test::TestRequest::post()
      .uri("/api/v1/orders/status")
      .insert_header((AUTHORIZATION, "Bearer staff-token"))
      .insert_header(("content-type", "application/json"))
      .set_payload("{\"orderId\": 12")
      .to_request();
    let resp = test::call_service(&app, bad).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("Validation Error"));

    let missing = test::TestRequest::get().uri("/api/v1/nope").to_request();
    assert_eq!(test::call_service(&app, missing).await.status(), StatusCode::NOT_FOUND);
  }

  #[actix_web::test]
  async fn webhook_confirms_then_acknowledges_duplicate() {
    let fx = fixture();
    let order = fx.store.insert_order(Order::pending(550, "USD"));
    let app = app!(fx);
    let body = payment_body(&order, "evt_http", "pay_http", 550);

    let first = test::call_service(&app, signed_webhook(&fx, &body).to_request()).await;
    assert_eq!(first.status(), StatusCode::OK);
    let ack: Value = test::read_body_json(first).await;
    assert_eq!(ack["received"], true);
    assert_eq!(ack["duplicate"], false);
    assert_eq!(ack["outcome"], "confirmed_guest");

    let second = test::call_service(&app, signed_webhook(&fx, &body).to_request()).await;
    assert_eq!(second.status(), StatusCode::OK);
    let ack: Value = test::read_body_json(second).await;
    assert_eq!(ack["duplicate"], true);
    assert_eq!(fx.store.order(order.id).unwrap().status, OrderStatus::Preparing);
  }

  #[actix_web::test]
  async fn unsigned_webhook_is_unauthorized() {
    let fx = fixture();
    let order = fx.store.insert_order(Order::pending(550, "USD"));
    let app = app!(fx);
    let req = test::TestRequest::post()
      .uri("/api/v1/webhooks/square")
      .insert_header((TIMESTAMP_HEADER, Utc::now().timestamp().to_string()))
      .set_payload(serde_json::to_vec(&payment_body(&order, "evt_x", "pay_x", 550)).unwrap())
      .to_request();

    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(fx.store.event_keys().is_empty());
  }

  #[actix_web::test]
  async fn oversized_webhook_is_rejected_with_413() {
    let fx = fixture();
    let app = app!(fx);
    let big = json!({ "event_id": "evt_big", "type": "payment.updated", "pad": "x".repeat(5000) });

    let resp = test::call_service(&app, signed_webhook(&fx, &big).to_request()).await;

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
  }

  #[actix_web::test]
  async fn poll_requires_staff_and_reports_progress() {
    let fx = fixture();
    let order = fx
      .store
      .insert_order(Order::pending(550, "USD").with_checkout("chk_http"));
    fx.processor.put_checkout(TerminalCheckout {
      id: "chk_http".to_string(),
      status: CheckoutStatus::InProgress,
      payment_ids: Vec::new(),
      reference_id: Some(order.id.to_string()),
      amount_cents: 550,
      currency: "USD".to_string(),
    });
    let app = app!(fx);

    let anonymous = test::TestRequest::post()
      .uri("/api/v1/payments/poll")
      .set_json(json!({ "orderId": order.id }))
      .to_request();
    assert_eq!(test::call_service(&app, anonymous).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
      .uri("/api/v1/payments/poll")
      .insert_header((AUTHORIZATION, "Bearer staff-token"))
      .set_json(json!({ "orderId": order.id }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "IN_PROGRESS");
    assert_eq!(body["orderStatus"], "pending");
    assert_eq!(body["confirmed"], false);
  }

  #[actix_web::test]
  async fn poll_for_unknown_order_is_404() {
    let fx = fixture();
    let app = app!(fx);
    let req = test::TestRequest::post()
      .uri("/api/v1/payments/poll")
      .insert_header((AUTHORIZATION, "Bearer staff-token"))
      .set_json(json!({ "orderId": uuid::Uuid::new_v4() }))
      .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
  }

  #[actix_web::test]
  async fn illegal_status_change_is_409_and_missing_order_404() {
    let fx = fixture();
    let done = fx
      .store
      .insert_order(Order::pending(550, "USD").with_status(OrderStatus::Completed));
    let app = app!(fx);

    let illegal = test::TestRequest::post()
      .uri("/api/v1/orders/status")
      .insert_header((AUTHORIZATION, "Bearer staff-token"))
      .set_json(json!({ "orderId": done.id, "status": "preparing" }))
      .to_request();
    assert_eq!(test::call_service(&app, illegal).await.status(), StatusCode::CONFLICT);

    let missing = test::TestRequest::post()
      .uri("/api/v1/orders/status")
      .insert_header((AUTHORIZATION, "Bearer staff-token"))
      .set_json(json!({ "orderId": uuid::Uuid::new_v4(), "status": "ready" }))
      .to_request();
    assert_eq!(test::call_service(&app, missing).await.status(), StatusCode::NOT_FOUND);
  }

  #[actix_web::test]
  async fn large_comp_by_staff_is_forbidden() {
    let fx = fixture();
    let order = fx.store.insert_order(Order::pending(2500, "USD"));
    let app = app!(fx);
    let req = test::TestRequest::post()
      .uri("/api/v1/orders/status")
      .insert_header((AUTHORIZATION, "Bearer staff-token"))
      .set_json(json!({ "orderId": order.id, "status": "preparing", "paymentMethod": "comp", "reason": "regular" }))
      .to_request();

    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    assert_eq!(fx.store.order(order.id).unwrap().status, OrderStatus::Pending);
  }

  #[actix_web::test]
  async fn collect_arms_the_order_with_a_checkout() {
    let fx = fixture();
    let order = fx.store.insert_order(Order::pending(725, "USD"));
    let app = app!(fx);
    let req = test::TestRequest::post()
      .uri(&format!("/api/v1/orders/{}/collect", order.id))
      .insert_header((AUTHORIZATION, "Bearer manager-token"))
      .set_json(json!({ "deviceId": "device-1" }))
      .to_request();

    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let checkout_id = body["checkoutId"].as_str().unwrap().to_string();
    assert_eq!(fx.store.order(order.id).unwrap().checkout_id, Some(checkout_id));
  }

  #[actix_web::test]
  async fn cron_endpoints_require_the_secret() {
    let fx = fixture();
    let stale = fx
      .store
      .insert_order(Order::pending(550, "USD").created_at(Utc::now() - Duration::hours(2)));
    let app = app!(fx);

    let denied = test::TestRequest::post()
      .uri("/api/v1/cron/reconcile")
      .insert_header((CRON_SECRET_HEADER, "wrong"))
      .to_request();
    assert_eq!(test::call_service(&app, denied).await.status(), StatusCode::FORBIDDEN);

    let sweep = test::TestRequest::post()
      .uri("/api/v1/cron/reconcile")
      .insert_header((CRON_SECRET_HEADER, "cron-test-secret"))
      .to_request();
    let resp = test::call_service(&app, sweep).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let summary: Value = test::read_body_json(resp).await;
    assert_eq!(summary["checked"], 0);

    let cleanup = test::TestRequest::post()
      .uri("/api/v1/cron/cancel-stale")
      .insert_header((CRON_SECRET_HEADER, "cron-test-secret"))
      .to_request();
    let resp = test::call_service(&app, cleanup).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["abandoned"], 1);
    assert_eq!(fx.store.order(stale.id).unwrap().status, OrderStatus::Abandoned);
  }
}
