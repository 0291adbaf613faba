// app/src/state.rs
use crate::config::AppConfig;
use crate::services::{DeliveryService, NotificationService, OrderService, PaymentService, TokenSigner};
use std::sync::Arc;

/// Shared with every request handler through `web::Data`.
#[derive(Clone)]
pub struct AppState {
  pub config: Arc<AppConfig>,
  pub tokens: Arc<TokenSigner>,
  pub orders: Arc<OrderService>,
  pub payments: Arc<PaymentService>,
  pub deliveries: Arc<DeliveryService>,
  pub notifications: Arc<NotificationService>,
}
