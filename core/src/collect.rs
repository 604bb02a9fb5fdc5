// core/src/collect.rs

use crate::error::{Error, Result, TransitionError};
use crate::model::{NewTerminalCheckout, Order, OrderStatus, StaffPrincipal};
use crate::ports::OrderStore;
use crate::receipt::order_tag;
use crate::upstream::UpstreamResolver;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Starts a card-present charge for an order. Recording the checkout id on
/// the order is what arms the poller and the sweeper.
#[derive(Clone)]
pub struct CheckoutCollector {
  orders: Arc<dyn OrderStore>,
  resolver: UpstreamResolver,
  currency: String,
}

impl CheckoutCollector {
  pub fn new(orders: Arc<dyn OrderStore>, resolver: UpstreamResolver, currency: impl Into<String>) -> Self {
    Self {
      orders,
      resolver,
      currency: currency.into(),
    }
  }

  #[instrument(name = "collect::start", skip(self, actor), fields(staff = %actor.email))]
  pub async fn collect(&self, actor: &StaffPrincipal, order_id: Uuid, device_id: &str) -> Result<Order> {
    let device_id = device_id.trim();
    if device_id.is_empty() {
      return Err(Error::Validation("deviceId is required".to_string()));
    }

    let order = self.orders.get(order_id).await?.ok_or(Error::OrderNotFound(order_id))?;
    if order.is_monetized() || !matches!(order.status, OrderStatus::Pending | OrderStatus::Unpaid) {
      return Err(
        TransitionError::Conflict {
          order_id,
          expected: OrderStatus::Pending,
        }
        .into(),
      );
    }
    if let Some(existing) = order.checkout_id.as_deref() {
      info!(checkout_id = %existing, "Checkout already started for order.");
      return Ok(order);
    }

    let request = NewTerminalCheckout {
      idempotency_key: Uuid::new_v4().to_string(),
      amount_cents: order.total_amount_cents,
      currency: self.currency.clone(),
      device_id: device_id.to_string(),
      reference_id: order.id.to_string(),
      note: Some(format!("Order {}", order_tag(&order))),
    };
    let processor = self.resolver.processor().clone();
    let checkout = self.resolver.bounded(processor.create_terminal_checkout(&request)).await?;
    info!(checkout_id = %checkout.id, amount_cents = order.total_amount_cents, "Terminal checkout created.");

    self
      .orders
      .attach_checkout(order.id, &checkout.id)
      .await?
      .ok_or_else(|| {
        TransitionError::Conflict {
          order_id,
          expected: OrderStatus::Pending,
        }
        .into()
      })
  }
}
