// core/src/receipt.rs

//! Fixed-width receipts for a 32-column thermal printer.

use crate::model::Order;

pub const WIDTH: usize = 32;
const MAX_NAME_CHARS: usize = 20;

#[derive(Debug, Clone)]
pub struct ReceiptHeader {
  pub shop_name: String,
  pub location: String,
  pub farewell: String,
}

impl Default for ReceiptHeader {
  fn default() -> Self {
    Self {
      shop_name: "PAYCONFIRM CAFE".to_string(),
      location: "Thank you for visiting".to_string(),
      farewell: "See you again soon!".to_string(),
    }
  }
}

fn center(text: &str) -> String {
  let len = text.chars().count();
  if len >= WIDTH {
    return text.chars().take(WIDTH).collect();
  }
  let pad = (WIDTH - len) / 2;
  format!("{}{}", " ".repeat(pad), text)
}

pub fn format_money(cents: i64) -> String {
  let abs = cents.unsigned_abs();
  format!("${}.{:02}", abs / 100, abs % 100)
}

/// `BRW-` plus the first four hex digits of the order id.
pub fn order_tag(order: &Order) -> String {
  let simple = order.id.simple().to_string();
  format!("BRW-{}", simple[..4].to_uppercase())
}

/// Human label for the payment reference stamped on an order.
pub fn payment_label(payment_id: Option<&str>) -> &'static str {
  let Some(payment_id) = payment_id else {
    return "Unpaid";
  };
  let lower = payment_id.to_ascii_lowercase();
  let method = lower.split('-').next().unwrap_or_default();
  match method {
    "cash" => "Cash",
    "comp" => "Comp",
    "other" => "Other",
    _ => "Card",
  }
}

pub fn format_receipt(order: &Order, header: &ReceiptHeader) -> String {
  let divider = "=".repeat(WIDTH);
  let thin = "-".repeat(WIDTH);
  let mut lines = vec![
    divider.clone(),
    center(&header.shop_name),
    center(&header.location),
    divider.clone(),
    format!("Order #: {}", order_tag(order)),
    format!("Date:    {}", order.created_at.format("%m/%d/%Y %I:%M %p")),
  ];

  if let Some(name) = order.customer_name.as_deref().filter(|n| !n.trim().is_empty()) {
    let safe: String = name.chars().take(MAX_NAME_CHARS).collect();
    lines.push(format!("Name:    {}", safe));
  }
  lines.push(thin.clone());

  let total = format_money(order.total_amount_cents);
  let gap = WIDTH.saturating_sub("TOTAL".len() + total.len()).max(1);
  lines.push(format!("TOTAL{}{}", " ".repeat(gap), total));
  lines.push(format!("Paid: {}", payment_label(order.payment_id.as_deref())));
  lines.push(thin);
  lines.push(center(&header.farewell));
  lines.push(divider);

  lines.join("\n")
}
