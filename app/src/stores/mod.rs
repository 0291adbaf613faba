// app/src/stores/mod.rs

//! Persistence boundaries, one per service.
//!
//! Every method that changes state and emits events takes the envelopes with
//! it, so implementations can commit the state change and the outbox rows in
//! one unit. Conditional writes return `false` when the precondition no longer
//! holds instead of failing, which is what makes redelivered events harmless.

pub mod memory;
pub mod postgres;

use crate::errors::Result;
use crate::models::{
  Cart, CheckoutReservation, Delivery, DeliveryProgress, Notification, Order, Payment, PaymentState, PaymentStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tiffin_core::{Envelope, OutboxStore};
use uuid::Uuid;

#[async_trait]
pub trait OrderStore: Send + Sync {
  async fn active_cart(&self, user_id: Uuid) -> Result<Option<Cart>>;

  async fn get_cart(&self, cart_id: Uuid) -> Result<Option<Cart>>;

  /// Inserts a new active cart. Fails with `Conflict` when the user already has one.
  async fn insert_cart(&self, cart: &Cart) -> Result<()>;

  /// Overwrites an active cart whose stored version is `expected_version`.
  async fn save_cart(&self, cart: &Cart, expected_version: i32) -> Result<bool>;

  async fn delete_cart(&self, cart_id: Uuid, expected_version: i32) -> Result<bool>;

  /// Stores `order`, flips the cart to `ordered` and appends `events`, all or nothing.
  /// Returns `false` if the cart changed or left `active` since it was read.
  async fn place_order(&self, order: &Order, cart_id: Uuid, expected_version: i32, events: Vec<Envelope>)
    -> Result<bool>;

  /// Saves `cart` carrying its new checkout reference and records the priced
  /// `reservation` for it, all or nothing. Returns `false` if the cart changed.
  async fn reserve_checkout(&self, cart: &Cart, expected_version: i32, reservation: &CheckoutReservation)
    -> Result<bool>;

  async fn reservation(&self, order_id: Uuid) -> Result<Option<CheckoutReservation>>;

  /// Inserts `order` unless one with the same id exists. The cart flips to
  /// `ordered` in the same unit, but only while it is still active and still
  /// reserved for `order.id`. Returns `true` when the order was created.
  async fn materialize_order(&self, order: &Order, cart_id: Uuid) -> Result<bool>;

  async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>>;

  /// Newest first. Returns the page and the user's total order count.
  async fn orders_for_user(&self, user_id: Uuid, offset: u64, limit: u32) -> Result<(Vec<Order>, u64)>;

  async fn set_payment_status(&self, order_id: Uuid, from: PaymentStatus, to: PaymentStatus) -> Result<bool>;

  async fn set_delivery_status(&self, order_id: Uuid, from: DeliveryProgress, to: DeliveryProgress) -> Result<bool>;

  fn outbox(&self) -> Arc<dyn OutboxStore>;
}

/// A provider-driven change of a payment's state.
#[derive(Debug, Clone)]
pub struct PaymentTransition {
  pub payment_id: Uuid,
  pub to: PaymentState,
  pub failure_reason: Option<String>,
  pub charge_id: Option<String>,
  pub gateway_response: serde_json::Value,
  pub at: DateTime<Utc>,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
  /// Inserts `payment` with its events. Fails with `DuplicatePayment` if the
  /// order already has a payment that blocks a new attempt.
  async fn insert_payment(&self, payment: &Payment, events: Vec<Envelope>) -> Result<()>;

  async fn latest_for_order(&self, order_id: Uuid) -> Result<Option<Payment>>;

  async fn find_by_provider_id(&self, provider_payment_id: &str) -> Result<Option<Payment>>;

  /// Applies `transition` only while the payment still accepts one.
  async fn apply_transition(&self, transition: &PaymentTransition, events: Vec<Envelope>) -> Result<bool>;

  fn outbox(&self) -> Arc<dyn OutboxStore>;
}

#[async_trait]
pub trait DeliveryStore: Send + Sync {
  /// Inserts `delivery` unless the order already has one.
  async fn assign_if_absent(&self, delivery: &Delivery, events: Vec<Envelope>) -> Result<bool>;

  async fn get_for_order(&self, order_id: Uuid) -> Result<Option<Delivery>>;

  /// Non-terminal deliveries whose `due_at` is at or before `now`, oldest first.
  async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Delivery>>;

  /// Moves a non-terminal delivery to `completed`.
  async fn complete(&self, order_id: Uuid, at: DateTime<Utc>, events: Vec<Envelope>) -> Result<bool>;

  fn outbox(&self) -> Arc<dyn OutboxStore>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
  /// Appends unless `(user_id, order_id, message)` is already recorded.
  async fn insert_if_absent(&self, notification: &Notification) -> Result<bool>;

  async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>>;
}

/// The four stores a process works with.
#[derive(Clone)]
pub struct Stores {
  pub orders: Arc<dyn OrderStore>,
  pub payments: Arc<dyn PaymentStore>,
  pub deliveries: Arc<dyn DeliveryStore>,
  pub notifications: Arc<dyn NotificationStore>,
  /// Set when state survives a restart; such stores need a durable bus too.
  pub durable: bool,
}

impl Stores {
  pub fn in_memory() -> Self {
    Self {
      orders: Arc::new(memory::MemoryOrderStore::default()),
      payments: Arc::new(memory::MemoryPaymentStore::default()),
      deliveries: Arc::new(memory::MemoryDeliveryStore::default()),
      notifications: Arc::new(memory::MemoryNotificationStore::default()),
      durable: false,
    }
  }

  pub fn postgres(pool: sqlx::PgPool) -> Self {
    Self {
      orders: Arc::new(postgres::PgOrderStore::new(pool.clone())),
      payments: Arc::new(postgres::PgPaymentStore::new(pool.clone())),
      deliveries: Arc::new(postgres::PgDeliveryStore::new(pool.clone())),
      notifications: Arc::new(postgres::PgNotificationStore::new(pool)),
      durable: true,
    }
  }
}
