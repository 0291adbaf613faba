// app/src/stores/memory/orders.rs

use crate::errors::{AppError, Result};
use crate::models::{Cart, CartStatus, CheckoutReservation, DeliveryProgress, Order, PaymentStatus};
use crate::stores::OrderStore;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tiffin_core::{Envelope, OutboxStore, OutboxTable, SharedOutbox};
use uuid::Uuid;

#[derive(Default)]
pub struct OrdersDb {
  carts: HashMap<Uuid, Cart>,
  orders: HashMap<Uuid, Order>,
  reservations: HashMap<Uuid, CheckoutReservation>,
  outbox: OutboxTable,
}

fn orders_outbox(db: &mut OrdersDb) -> &mut OutboxTable {
  &mut db.outbox
}

impl OrdersDb {
  fn active_cart_id(&self, user_id: Uuid) -> Option<Uuid> {
    self
      .carts
      .values()
      .find(|c| c.user_id == user_id && c.status == CartStatus::Active)
      .map(|c| c.id)
  }
}

#[derive(Default, Clone)]
pub struct MemoryOrderStore {
  db: Arc<Mutex<OrdersDb>>,
}

impl MemoryOrderStore {
  pub fn active_cart_count(&self, user_id: Uuid) -> usize {
    self
      .db
      .lock()
      .carts
      .values()
      .filter(|c| c.user_id == user_id && c.status == CartStatus::Active)
      .count()
  }

  pub fn order_count(&self) -> usize {
    self.db.lock().orders.len()
  }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
  async fn active_cart(&self, user_id: Uuid) -> Result<Option<Cart>> {
    let db = self.db.lock();
    Ok(db.active_cart_id(user_id).and_then(|id| db.carts.get(&id).cloned()))
  }

  async fn get_cart(&self, cart_id: Uuid) -> Result<Option<Cart>> {
    Ok(self.db.lock().carts.get(&cart_id).cloned())
  }

  async fn insert_cart(&self, cart: &Cart) -> Result<()> {
    let mut db = self.db.lock();
    if db.active_cart_id(cart.user_id).is_some() {
      return Err(AppError::Conflict(format!("User {} already has an active cart", cart.user_id)));
    }
    db.carts.insert(cart.id, cart.clone());
    Ok(())
  }

  async fn save_cart(&self, cart: &Cart, expected_version: i32) -> Result<bool> {
    let mut db = self.db.lock();
    match db.carts.get_mut(&cart.id) {
      Some(stored) if stored.status == CartStatus::Active && stored.version == expected_version => {
        *stored = cart.clone();
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn delete_cart(&self, cart_id: Uuid, expected_version: i32) -> Result<bool> {
    let mut db = self.db.lock();
    let deletable = matches!(
      db.carts.get(&cart_id),
      Some(stored) if stored.status == CartStatus::Active && stored.version == expected_version
    );
    if deletable {
      db.carts.remove(&cart_id);
    }
    Ok(deletable)
  }

  async fn place_order(
    &self,
    order: &Order,
    cart_id: Uuid,
    expected_version: i32,
    events: Vec<Envelope>,
  ) -> Result<bool> {
    let mut db = self.db.lock();
    let Some(cart) = db.carts.get_mut(&cart_id) else {
      return Ok(false);
    };
    if cart.status != CartStatus::Active || cart.version != expected_version {
      return Ok(false);
    }
    cart.status = CartStatus::Ordered;
    cart.version += 1;
    cart.updated_at = Utc::now();
    db.orders.insert(order.id, order.clone());
    for envelope in events {
      db.outbox.push(envelope);
    }
    Ok(true)
  }

  async fn reserve_checkout(
    &self,
    cart: &Cart,
    expected_version: i32,
    reservation: &CheckoutReservation,
  ) -> Result<bool> {
    let mut db = self.db.lock();
    match db.carts.get_mut(&cart.id) {
      Some(stored) if stored.status == CartStatus::Active && stored.version == expected_version => {
        *stored = cart.clone();
      }
      _ => return Ok(false),
    }
    db.reservations.insert(reservation.order_id, reservation.clone());
    Ok(true)
  }

  async fn reservation(&self, order_id: Uuid) -> Result<Option<CheckoutReservation>> {
    Ok(self.db.lock().reservations.get(&order_id).cloned())
  }

  async fn materialize_order(&self, order: &Order, cart_id: Uuid) -> Result<bool> {
    let mut db = self.db.lock();
    if db.orders.contains_key(&order.id) {
      return Ok(false);
    }
    if let Some(cart) = db.carts.get_mut(&cart_id) {
      if cart.status == CartStatus::Active && cart.checkout_ref == Some(order.id) {
        cart.status = CartStatus::Ordered;
        cart.version += 1;
        cart.updated_at = Utc::now();
      }
    }
    db.orders.insert(order.id, order.clone());
    Ok(true)
  }

  async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>> {
    Ok(self.db.lock().orders.get(&order_id).cloned())
  }

  async fn orders_for_user(&self, user_id: Uuid, offset: u64, limit: u32) -> Result<(Vec<Order>, u64)> {
    let db = self.db.lock();
    let mut mine: Vec<&Order> = db.orders.values().filter(|o| o.user_id == user_id).collect();
    mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let total = mine.len() as u64;
    let page = mine
      .into_iter()
      .skip(offset as usize)
      .take(limit as usize)
      .cloned()
      .collect();
    Ok((page, total))
  }

  async fn set_payment_status(&self, order_id: Uuid, from: PaymentStatus, to: PaymentStatus) -> Result<bool> {
    let mut db = self.db.lock();
    match db.orders.get_mut(&order_id) {
      Some(order) if order.payment_status == from => {
        order.payment_status = to;
        order.updated_at = Utc::now();
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn set_delivery_status(&self, order_id: Uuid, from: DeliveryProgress, to: DeliveryProgress) -> Result<bool> {
    let mut db = self.db.lock();
    match db.orders.get_mut(&order_id) {
      Some(order) if order.delivery_status == from => {
        order.delivery_status = to;
        order.updated_at = Utc::now();
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  fn outbox(&self) -> Arc<dyn OutboxStore> {
    Arc::new(SharedOutbox::new(self.db.clone(), orders_outbox))
  }
}
