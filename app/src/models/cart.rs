// app/src/models/cart.rs

use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
  Active,
  Ordered,
  Abandoned,
}

impl CartStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      CartStatus::Active => "active",
      CartStatus::Ordered => "ordered",
      CartStatus::Abandoned => "abandoned",
    }
  }
}

impl fmt::Display for CartStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for CartStatus {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "active" => Ok(CartStatus::Active),
      "ordered" => Ok(CartStatus::Ordered),
      "abandoned" => Ok(CartStatus::Abandoned),
      other => Err(AppError::Internal(format!("unknown cart status '{}'", other))),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
  pub menu_item_id: String,
  pub name: String,
  /// Unit price in the smallest currency unit.
  pub price: i64,
  pub quantity: i32,
}

impl CartItem {
  pub fn line_total(&self) -> i64 {
    self.price * i64::from(self.quantity)
  }
}

/// Input for adding a menu item to a cart.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCartItem {
  pub restaurant_id: String,
  pub restaurant_name: String,
  pub menu_item_id: String,
  pub name: String,
  pub price: i64,
  #[serde(default = "default_quantity")]
  pub quantity: i32,
}

fn default_quantity() -> i32 {
  1
}

impl NewCartItem {
  pub fn validate(&self) -> Result<()> {
    let missing = [
      ("restaurantId", &self.restaurant_id),
      ("restaurantName", &self.restaurant_name),
      ("menuItemId", &self.menu_item_id),
      ("name", &self.name),
    ]
    .into_iter()
    .find(|(_, value)| value.trim().is_empty());
    if let Some((field, _)) = missing {
      return Err(AppError::Validation(format!("{} is required", field)));
    }
    if self.price <= 0 {
      return Err(AppError::Validation("price must be positive".to_string()));
    }
    if self.quantity < 1 {
      return Err(AppError::Validation("quantity must be at least 1".to_string()));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
  pub id: Uuid,
  pub user_id: Uuid,
  pub restaurant_id: String,
  pub restaurant_name: String,
  pub items: Vec<CartItem>,
  pub total_amount: i64,
  pub status: CartStatus,
  /// Order id reserved by the deferred payment flow. Any change to the
  /// cart's lines drops it, so a kept reference always prices the current cart.
  pub checkout_ref: Option<Uuid>,
  /// Bumped on every write; stores use it for optimistic concurrency.
  pub version: i32,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Cart {
  pub fn new(user_id: Uuid, restaurant_id: &str, restaurant_name: &str) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4(),
      user_id,
      restaurant_id: restaurant_id.to_string(),
      restaurant_name: restaurant_name.to_string(),
      items: Vec::new(),
      total_amount: 0,
      status: CartStatus::Active,
      checkout_ref: None,
      version: 0,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn recompute_total(&mut self) {
    self.total_amount = self.items.iter().map(CartItem::line_total).sum();
    self.checkout_ref = None;
    self.updated_at = Utc::now();
  }

  /// Adds `item`, merging quantities when the menu item is already in the cart.
  pub fn add_item(&mut self, item: &NewCartItem) -> Result<()> {
    if self.restaurant_id != item.restaurant_id {
      return Err(AppError::RestaurantMismatch(self.restaurant_name.clone()));
    }
    match self.items.iter_mut().find(|line| line.menu_item_id == item.menu_item_id) {
      Some(line) => line.quantity += item.quantity,
      None => self.items.push(CartItem {
        menu_item_id: item.menu_item_id.clone(),
        name: item.name.clone(),
        price: item.price,
        quantity: item.quantity,
      }),
    }
    self.recompute_total();
    Ok(())
  }

  /// Sets the quantity of a line; zero removes it.
  pub fn set_quantity(&mut self, menu_item_id: &str, quantity: i32) -> Result<()> {
    if quantity < 0 {
      return Err(AppError::Validation("quantity cannot be negative".to_string()));
    }
    let idx = self
      .items
      .iter()
      .position(|line| line.menu_item_id == menu_item_id)
      .ok_or_else(|| AppError::NotFound(format!("Item {} not in cart", menu_item_id)))?;
    if quantity == 0 {
      self.items.remove(idx);
    } else {
      self.items[idx].quantity = quantity;
    }
    self.recompute_total();
    Ok(())
  }

  pub fn remove_item(&mut self, menu_item_id: &str) -> Result<()> {
    let before = self.items.len();
    self.items.retain(|line| line.menu_item_id != menu_item_id);
    if self.items.len() == before {
      return Err(AppError::NotFound(format!("Item {} not in cart", menu_item_id)));
    }
    self.recompute_total();
    Ok(())
  }
}

/// Priced copy of a cart taken when the deferred flow reserves an order id.
///
/// Stored apart from the cart, so the paid order can be built from exactly
/// what was charged even if the cart is later edited or cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReservation {
  pub order_id: Uuid,
  pub cart_id: Uuid,
  pub user_id: Uuid,
  pub restaurant_id: String,
  pub restaurant_name: String,
  pub items: Vec<CartItem>,
  pub total_amount: i64,
  pub created_at: DateTime<Utc>,
}

impl CheckoutReservation {
  pub fn from_cart(order_id: Uuid, cart: &Cart) -> Self {
    Self {
      order_id,
      cart_id: cart.id,
      user_id: cart.user_id,
      restaurant_id: cart.restaurant_id.clone(),
      restaurant_name: cart.restaurant_name.clone(),
      items: cart.items.clone(),
      total_amount: cart.total_amount,
      created_at: Utc::now(),
    }
  }

  /// True while `cart` still holds the same lines at the same prices.
  pub fn prices(&self, cart: &Cart) -> bool {
    self.cart_id == cart.id && self.items == cart.items && self.total_amount == cart.total_amount
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(restaurant: &str, menu_item: &str, price: i64, quantity: i32) -> NewCartItem {
    NewCartItem {
      restaurant_id: restaurant.into(),
      restaurant_name: format!("{} kitchen", restaurant),
      menu_item_id: menu_item.into(),
      name: format!("dish {}", menu_item),
      price,
      quantity,
    }
  }

  #[test]
  fn adding_same_item_merges_quantity_and_total() {
    let mut cart = Cart::new(Uuid::new_v4(), "r1", "r1 kitchen");
    cart.add_item(&item("r1", "m1", 100, 1)).unwrap();
    cart.add_item(&item("r1", "m2", 50, 1)).unwrap();
    cart.add_item(&item("r1", "m2", 50, 1)).unwrap();
    assert_eq!(cart.items.len(), 2);
    assert_eq!(cart.total_amount, 200);
  }

  #[test]
  fn other_restaurant_is_rejected() {
    let mut cart = Cart::new(Uuid::new_v4(), "r1", "r1 kitchen");
    cart.add_item(&item("r1", "m1", 100, 1)).unwrap();
    let err = cart.add_item(&item("r2", "m9", 100, 1)).unwrap_err();
    assert!(matches!(err, AppError::RestaurantMismatch(_)));
    assert_eq!(cart.total_amount, 100);
  }

  #[test]
  fn zero_quantity_removes_line() {
    let mut cart = Cart::new(Uuid::new_v4(), "r1", "r1 kitchen");
    cart.add_item(&item("r1", "m1", 100, 2)).unwrap();
    cart.set_quantity("m1", 0).unwrap();
    assert!(cart.is_empty());
    assert_eq!(cart.total_amount, 0);
    assert!(matches!(cart.set_quantity("m1", -1), Err(AppError::Validation(_))));
  }

  #[test]
  fn new_item_validation() {
    assert!(item("r1", "m1", 0, 1).validate().is_err());
    assert!(item("r1", "m1", 10, 0).validate().is_err());
    assert!(item("", "m1", 10, 1).validate().is_err());
    assert!(item("r1", "m1", 10, 1).validate().is_ok());
  }

  #[test]
  fn editing_lines_drops_the_checkout_reference() {
    let mut cart = Cart::new(Uuid::new_v4(), "r1", "r1 kitchen");
    cart.add_item(&item("r1", "m1", 100, 2)).unwrap();
    let reserved = Uuid::new_v4();
    cart.checkout_ref = Some(reserved);
    let reservation = CheckoutReservation::from_cart(reserved, &cart);
    assert!(reservation.prices(&cart));

    cart.add_item(&item("r1", "m2", 500, 2)).unwrap();
    assert_eq!(cart.checkout_ref, None);
    assert!(!reservation.prices(&cart));
    assert_eq!(reservation.total_amount, 200);
  }
}
