// tests/common/mod.rs
#![allow(dead_code)]

use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use payconfirm::memory::{InMemoryProcessor, InMemoryStore};
use payconfirm::model::{
  CheckoutStatus, ConfirmationRequest, ConfirmedVia, Order, OrderStatus, PaymentState, ProcessorPayment, StaffPrincipal,
  StaffRole, TerminalCheckout,
};
use payconfirm::{InboundWebhook, PaymentServices, Ports, Settings, SignatureVerifier, VerifierConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;

pub const WEBHOOK_KEY: &str = "whsec_integration";
pub const WEBHOOK_URL: &str = "https://cafe.example/api/v1/webhooks/square";

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

pub fn settings() -> Settings {
  let mut settings = Settings::default();
  settings.verifier = VerifierConfig {
    signature_key: WEBHOOK_KEY.to_string(),
    notification_url: WEBHOOK_URL.to_string(),
    max_drift_secs: 300,
    max_body_bytes: 4096,
  };
  settings.upstream_timeout = std::time::Duration::from_millis(200);
  settings
}

pub struct Harness {
  pub store: Arc<InMemoryStore>,
  pub processor: Arc<InMemoryProcessor>,
  pub services: PaymentServices,
}

pub fn harness() -> Harness {
  harness_with(settings())
}

pub fn harness_with(settings: Settings) -> Harness {
  setup_tracing();
  let store = Arc::new(InMemoryStore::new(10));
  let processor = Arc::new(InMemoryProcessor::default());
  let services = PaymentServices::build(Ports::in_memory(&store, &processor), settings);
  Harness {
    store,
    processor,
    services,
  }
}

impl Harness {
  /// A guest order created `age_secs` ago.
  pub fn pending_order(&self, total_cents: i64, age_secs: i64) -> Order {
    let order = Order::pending(total_cents, "USD").created_at(Utc::now() - Duration::seconds(age_secs));
    self.store.insert_order(order)
  }

  pub fn member_order(&self, total_cents: i64) -> Order {
    let order = Order::pending(total_cents, "USD").with_user(Uuid::new_v4());
    self.store.insert_order(order)
  }

  pub fn order_in(&self, status: OrderStatus, total_cents: i64) -> Order {
    self.store.insert_order(Order::pending(total_cents, "USD").with_status(status))
  }

  /// Attaches a terminal checkout in `status` to a stored order.
  pub fn checkout_for(&self, order: &Order, status: CheckoutStatus, age_secs: i64) -> Order {
    let checkout_id = format!("chk_{}", &order.id.simple().to_string()[..8]);
    self.processor.put_checkout(TerminalCheckout {
      id: checkout_id.clone(),
      status,
      payment_ids: Vec::new(),
      reference_id: Some(order.id.to_string()),
      amount_cents: order.total_amount_cents,
      currency: "USD".to_string(),
    });
    let updated = order
      .clone()
      .with_checkout(&checkout_id)
      .created_at(Utc::now() - Duration::seconds(age_secs));
    self.store.insert_order(updated)
  }

  /// Completes the order's checkout with a captured payment of `amount_cents`.
  pub fn complete_checkout(&self, order: &Order, payment_id: &str, amount_cents: i64) {
    let checkout_id = order.checkout_id.clone().expect("order has a checkout");
    let mut checkout = self.processor.checkout(&checkout_id).expect("checkout exists");
    checkout.status = CheckoutStatus::Completed;
    checkout.payment_ids = vec![payment_id.to_string()];
    self.processor.put_checkout(checkout);
    self.processor.put_payment(ProcessorPayment {
      id: payment_id.to_string(),
      status: PaymentState::Completed,
      amount_cents,
      currency: "USD".to_string(),
      reference_id: Some(order.id.to_string()),
    });
  }

  pub fn signed(&self, body: &Value) -> InboundWebhook {
    let raw = serde_json::to_vec(body).unwrap();
    let verifier = SignatureVerifier::new(settings().verifier);
    InboundWebhook {
      source: "square".to_string(),
      signature: Some(verifier.sign(&raw).unwrap()),
      timestamp: Some(Utc::now().timestamp().to_string()),
      raw_body: raw,
      received_at: Utc::now(),
    }
  }
}

pub fn confirm_request(order: &Order, payment_id: &str, amount_cents: i64, via: ConfirmedVia) -> ConfirmationRequest {
  ConfirmationRequest {
    order_id: order.id,
    payment_id: payment_id.to_string(),
    paid_amount_cents: amount_cents,
    currency: "USD".to_string(),
    confirmed_via: via,
  }
}

pub fn payment_event(event_id: &str, event_type: &str, payment_id: &str, order_id: Option<Uuid>, amount: i64, status: &str) -> Value {
  json!({
    "merchant_id": "MLEXAMPLE",
    "event_id": event_id,
    "type": event_type,
    "created_at": Utc::now().to_rfc3339(),
    "data": {
      "type": "payment",
      "id": payment_id,
      "object": {
        "payment": {
          "id": payment_id,
          "status": status,
          "amount_money": { "amount": amount, "currency": "USD" },
          "reference_id": order_id.map(|id| id.to_string()),
        }
      }
    }
  })
}

pub fn refund_event(event_id: &str, refund_id: &str, payment_id: &str, amount: i64) -> Value {
  json!({
    "event_id": event_id,
    "type": "refund.updated",
    "data": {
      "type": "refund",
      "id": refund_id,
      "object": {
        "refund": {
          "id": refund_id,
          "status": "COMPLETED",
          "payment_id": payment_id,
          "amount_money": { "amount": amount, "currency": "USD" }
        }
      }
    }
  })
}

pub fn staff(role: StaffRole) -> StaffPrincipal {
  StaffPrincipal {
    id: Uuid::new_v4(),
    email: format!("{}@cafe.example", role.as_str()),
    role,
  }
}
