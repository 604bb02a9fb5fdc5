// core/src/model/staff.rs

use super::order::OrderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
  Staff,
  Manager,
  Admin,
}

impl StaffRole {
  pub fn as_str(self) -> &'static str {
    match self {
      StaffRole::Staff => "staff",
      StaffRole::Manager => "manager",
      StaffRole::Admin => "admin",
    }
  }

  /// Admins carry every manager capability.
  pub fn is_manager(self) -> bool {
    matches!(self, StaffRole::Manager | StaffRole::Admin)
  }
}

impl fmt::Display for StaffRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StaffRole {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "staff" | "barista" => Ok(StaffRole::Staff),
      "manager" => Ok(StaffRole::Manager),
      "admin" => Ok(StaffRole::Admin),
      other => Err(format!("unknown staff role '{}'", other)),
    }
  }
}

/// The authenticated caller of a staff endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffPrincipal {
  pub id: Uuid,
  pub email: String,
  pub role: StaffRole,
}

/// How a staff member settled an order outside the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
  Cash,
  Comp,
  Other,
}

impl PaymentMethod {
  pub fn as_str(self) -> &'static str {
    match self {
      PaymentMethod::Cash => "cash",
      PaymentMethod::Comp => "comp",
      PaymentMethod::Other => "other",
    }
  }

  /// Unique payment reference stamped on the order. Payment ids are unique
  /// across orders, so the label alone cannot be reused.
  pub fn payment_reference(self) -> String {
    format!("{}-{}", self.as_str(), Uuid::new_v4().simple())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeRequest {
  pub order_id: Uuid,
  pub status: OrderStatus,
  #[serde(default)]
  pub payment_method: Option<PaymentMethod>,
  #[serde(default)]
  pub reason: Option<String>,
}

/// Append-only audit row written for every comp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompAudit {
  pub id: Uuid,
  pub order_id: Uuid,
  pub staff_id: Uuid,
  pub staff_email: String,
  pub staff_role: StaffRole,
  pub amount_cents: i64,
  pub reason: String,
  pub created_at: DateTime<Utc>,
}
