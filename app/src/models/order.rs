// app/src/models/order.rs

use crate::errors::{AppError, Result};
use crate::models::cart::{Cart, CartItem, CheckoutReservation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
  Pending,
  Paid,
  Failed,
}

impl PaymentStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      PaymentStatus::Pending => "pending",
      PaymentStatus::Paid => "paid",
      PaymentStatus::Failed => "failed",
    }
  }
}

impl fmt::Display for PaymentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for PaymentStatus {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(PaymentStatus::Pending),
      "paid" => Ok(PaymentStatus::Paid),
      "failed" => Ok(PaymentStatus::Failed),
      other => Err(AppError::Internal(format!("unknown payment status '{}'", other))),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryProgress {
  Pending,
  Completed,
  Cancelled,
}

impl DeliveryProgress {
  pub fn as_str(&self) -> &'static str {
    match self {
      DeliveryProgress::Pending => "pending",
      DeliveryProgress::Completed => "completed",
      DeliveryProgress::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for DeliveryProgress {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DeliveryProgress {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(DeliveryProgress::Pending),
      "completed" => Ok(DeliveryProgress::Completed),
      "cancelled" => Ok(DeliveryProgress::Cancelled),
      other => Err(AppError::Internal(format!("unknown delivery status '{}'", other))),
    }
  }
}

/// Line item copied from the cart at checkout, detached from the live menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
  pub menu_item_id: String,
  pub name: String,
  pub quantity: i32,
  pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  pub user_id: Uuid,
  pub restaurant_id: String,
  pub restaurant_name: String,
  pub items: Vec<OrderItem>,
  pub total_amount: i64,
  pub payment_status: PaymentStatus,
  pub delivery_status: DeliveryProgress,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  /// Snapshots `cart` into a new order with both statuses pending.
  pub fn from_cart(id: Uuid, cart: &Cart) -> Self {
    Self::priced(
      id,
      cart.user_id,
      &cart.restaurant_id,
      &cart.restaurant_name,
      &cart.items,
      cart.total_amount,
    )
  }

  /// Builds the order a deferred checkout reserved, priced as it was charged.
  pub fn from_reservation(reservation: &CheckoutReservation) -> Self {
    Self::priced(
      reservation.order_id,
      reservation.user_id,
      &reservation.restaurant_id,
      &reservation.restaurant_name,
      &reservation.items,
      reservation.total_amount,
    )
  }

  fn priced(
    id: Uuid,
    user_id: Uuid,
    restaurant_id: &str,
    restaurant_name: &str,
    lines: &[CartItem],
    total_amount: i64,
  ) -> Self {
    let now = Utc::now();
    Self {
      id,
      user_id,
      restaurant_id: restaurant_id.to_string(),
      restaurant_name: restaurant_name.to_string(),
      items: lines
        .iter()
        .map(|line| OrderItem {
          menu_item_id: line.menu_item_id.clone(),
          name: line.name.clone(),
          quantity: line.quantity,
          price: line.price,
        })
        .collect(),
      total_amount,
      payment_status: PaymentStatus::Pending,
      delivery_status: DeliveryProgress::Pending,
      created_at: now,
      updated_at: now,
    }
  }
}

/// One page of a user's order history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
  pub orders: Vec<Order>,
  pub page: u32,
  pub limit: u32,
  pub total: u64,
  pub total_pages: u64,
}
