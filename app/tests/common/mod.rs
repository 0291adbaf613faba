// tests/common/mod.rs
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use serde_json::json;
use tiffin::config::AppConfig;
use tiffin::errors::Result;
use tiffin::models::{NewCartItem, Payment};
use tiffin::pipelines::WebhookOutcome;
use tiffin::runtime::{self, Workers};
use tiffin::services::webhook_signature::stripe_signature_header;
use tiffin::state::AppState;
use tiffin::stores::memory::{MemoryDeliveryStore, MemoryNotificationStore, MemoryOrderStore, MemoryPaymentStore};
use tiffin::stores::Stores;
use tiffin_core::{EventBus, InMemoryBus};
use tracing::Level;
use uuid::Uuid;

pub const AUTH_SECRET: &str = "test-auth-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

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

/// A whole deployment in one process, driven by hand instead of background tasks.
pub struct Harness {
  pub state: AppState,
  pub workers: Workers,
  pub bus: Arc<InMemoryBus>,
  pub orders: MemoryOrderStore,
  pub payments: MemoryPaymentStore,
  pub deliveries: MemoryDeliveryStore,
  pub transit: Duration,
}

impl Harness {
  pub fn new() -> Self {
    Self::with_config(AppConfig::for_local(AUTH_SECRET, WEBHOOK_SECRET))
  }

  pub fn with_config(config: AppConfig) -> Self {
    let transit = Duration::seconds(config.delivery_transit_secs);
    let bus = Arc::new(InMemoryBus::new(config.bus_partitions));
    let orders = MemoryOrderStore::default();
    let payments = MemoryPaymentStore::default();
    let deliveries = MemoryDeliveryStore::default();
    let stores = Stores {
      orders: Arc::new(orders.clone()),
      payments: Arc::new(payments.clone()),
      deliveries: Arc::new(deliveries.clone()),
      notifications: Arc::new(MemoryNotificationStore::default()),
      durable: false,
    };
    let bus_handle: Arc<dyn EventBus> = bus.clone();
    let built = runtime::build(config, stores, bus_handle, false).expect("runtime wiring");
    Self {
      state: built.state,
      workers: built.workers,
      bus,
      orders,
      payments,
      deliveries,
      transit,
    }
  }

  pub async fn settle(&self) {
    self.settle_at(Utc::now()).await;
  }

  pub async fn settle_at(&self, now: DateTime<Utc>) {
    self.workers.settle(now).await.expect("workers settle");
  }

  /// Settles at a time past every delivery's due time.
  pub async fn settle_after_transit(&self) {
    self.settle_at(Utc::now() + self.transit + Duration::seconds(1)).await;
  }

  pub fn token_for(&self, user_id: Uuid) -> String {
    self
      .state
      .tokens
      .issue(user_id, Duration::hours(1), Utc::now())
      .expect("token issued")
  }

  /// ₹100 x1 and ₹50 x2 from one restaurant.
  pub async fn fill_sample_cart(&self, user_id: Uuid) {
    self.state.orders.add_item(user_id, menu_item("paneer-tikka", 100, 1)).await.unwrap();
    self.state.orders.add_item(user_id, menu_item("garlic-naan", 50, 2)).await.unwrap();
  }

  pub fn only_payment(&self, order_id: Uuid) -> Payment {
    let mut payments = self.payments.payments_for_order(order_id);
    assert_eq!(payments.len(), 1, "expected exactly one payment for {}", order_id);
    payments.remove(0)
  }

  pub async fn deliver_webhook(&self, event_type: &str, provider_payment_id: &str) -> Result<WebhookOutcome> {
    let body = webhook_body(event_type, provider_payment_id);
    let header = sign(WEBHOOK_SECRET, &body);
    self
      .state
      .payments
      .handle_stripe_webhook(body.into(), Some(header), Utc::now())
      .await
  }
}

pub fn menu_item(menu_item_id: &str, price: i64, quantity: i32) -> NewCartItem {
  NewCartItem {
    restaurant_id: "rest-1".to_string(),
    restaurant_name: "Spice Route".to_string(),
    menu_item_id: menu_item_id.to_string(),
    name: menu_item_id.replace('-', " "),
    price,
    quantity,
  }
}

pub fn webhook_body(event_type: &str, provider_payment_id: &str) -> Vec<u8> {
  serde_json::to_vec(&json!({
    "id": format!("evt_{}", Uuid::new_v4().simple()),
    "type": event_type,
    "data": {
      "object": {
        "id": provider_payment_id,
        "object": "payment_intent",
        "latest_charge": "ch_test_1",
        "last_payment_error": if event_type == "payment_intent.payment_failed" {
          json!({ "message": "Your card was declined." })
        } else {
          serde_json::Value::Null
        },
      }
    }
  }))
  .unwrap()
}

pub fn sign(secret: &str, body: &[u8]) -> String {
  stripe_signature_header(secret, Utc::now().timestamp(), body).unwrap()
}
