// core/src/staff.rs

use crate::dead_letter::DeadLetterRecorder;
use crate::error::TransitionError;
use crate::model::{
  CompAudit, Order, OrderStatus, PaymentMethod, PaymentStamp, Severity, StaffPrincipal, StatusChangeRequest,
  SystemError, SystemErrorType,
};
use crate::ports::{CompAuditLog, OrderStore};
use crate::state_machine;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Authorization rule for full-discount settlements.
#[derive(Debug, Clone)]
pub struct CompPolicy {
  /// Totals above this need a manager.
  pub cap_cents: i64,
  pub reason_min_len: usize,
}

impl Default for CompPolicy {
  fn default() -> Self {
    Self {
      cap_cents: 1500,
      reason_min_len: 2,
    }
  }
}

impl CompPolicy {
  /// Returns the trimmed reason when the actor may comp this order.
  pub fn authorize(&self, actor: &StaffPrincipal, order: &Order, reason: Option<&str>) -> Result<String, TransitionError> {
    let reason = reason.map(str::trim).unwrap_or_default();
    if reason.chars().count() < self.reason_min_len {
      return Err(TransitionError::Validation(format!(
        "a comp reason of at least {} characters is required",
        self.reason_min_len
      )));
    }
    if order.total_amount_cents > self.cap_cents && !actor.role.is_manager() {
      return Err(TransitionError::Forbidden(format!(
        "comps above {} cents require a manager",
        self.cap_cents
      )));
    }
    Ok(reason.to_string())
  }
}

/// Staff-requested status changes, checked against the transition table.
#[derive(Clone)]
pub struct StatusService {
  orders: Arc<dyn OrderStore>,
  comp_audit: Arc<dyn CompAuditLog>,
  dead_letters: DeadLetterRecorder,
  policy: CompPolicy,
}

impl StatusService {
  pub fn new(
    orders: Arc<dyn OrderStore>,
    comp_audit: Arc<dyn CompAuditLog>,
    dead_letters: DeadLetterRecorder,
    policy: CompPolicy,
  ) -> Self {
    Self {
      orders,
      comp_audit,
      dead_letters,
      policy,
    }
  }

  #[instrument(
    name = "staff::change_status",
    skip(self, actor, request),
    fields(order_id = %request.order_id, to = %request.status, staff = %actor.email)
  )]
  pub async fn change_status(&self, actor: &StaffPrincipal, request: StatusChangeRequest) -> Result<Order, TransitionError> {
    let order = self
      .orders
      .get(request.order_id)
      .await?
      .ok_or(TransitionError::OrderNotFound(request.order_id))?;

    state_machine::check(order.id, order.status, request.status)?;

    let settles = matches!(request.status, OrderStatus::Paid | OrderStatus::Preparing) && !order.is_monetized();
    if settles {
      return self.settle(actor, &order, &request).await;
    }

    let updated = self
      .orders
      .transition(order.id, &[order.status], request.status, None)
      .await?
      .ok_or(TransitionError::Conflict {
        order_id: order.id,
        expected: order.status,
      })?;
    info!(from = %order.status, "Order status changed by staff.");
    Ok(updated)
  }

  // Card money only arrives through the engine; staff settle by cash, other or comp.
  async fn settle(&self, actor: &StaffPrincipal, order: &Order, request: &StatusChangeRequest) -> Result<Order, TransitionError> {
    let method = request.payment_method.ok_or_else(|| {
      TransitionError::Validation("paymentMethod is required to settle an unpaid order".to_string())
    })?;

    let comp_reason = match method {
      PaymentMethod::Comp => Some(self.policy.authorize(actor, order, request.reason.as_deref())?),
      PaymentMethod::Cash | PaymentMethod::Other => None,
    };

    let stamp = PaymentStamp {
      order_id: order.id,
      payment_id: method.payment_reference(),
      paid_amount_cents: if comp_reason.is_some() { 0 } else { order.total_amount_cents },
      paid_at: Utc::now(),
      confirmed_via: format!("staff_{}", method.as_str()),
      status: request.status,
    };
    let updated = match self.orders.confirm_payment(&stamp, &[order.status]).await {
      Ok(Some(updated)) => updated,
      Ok(None) => {
        return Err(TransitionError::Conflict {
          order_id: order.id,
          expected: order.status,
        })
      }
      Err(e) => return Err(e.into()),
    };
    info!(method = method.as_str(), "Order settled by staff.");

    if let Some(reason) = comp_reason {
      self.audit_comp(actor, order, reason).await;
    }
    Ok(updated)
  }

  async fn audit_comp(&self, actor: &StaffPrincipal, order: &Order, reason: String) {
    let audit = CompAudit {
      id: Uuid::new_v4(),
      order_id: order.id,
      staff_id: actor.id,
      staff_email: actor.email.clone(),
      staff_role: actor.role,
      amount_cents: order.total_amount_cents,
      reason,
      created_at: Utc::now(),
    };
    if let Err(e) = self.comp_audit.record(&audit).await {
      warn!(order_id = %order.id, error = %e, "Comp audit write failed; escalating.");
      self
        .dead_letters
        .record(
          SystemError::new(
            SystemErrorType::CompAuditFailed,
            "staff_status_service",
            format!("Comp applied but audit record failed: {}", e),
          )
          .severity(Severity::High)
          .order(order.id)
          .amount(order.total_amount_cents)
          .context(json!({
            "staff_id": actor.id,
            "staff_email": actor.email,
            "reason": audit.reason,
          })),
        )
        .await;
    }
  }
}
