// app/src/pipelines/contexts.rs

//! Context data for every pipeline. Handlers receive these wrapped in
//! `tiffin_core::ContextData`.

use crate::models::{Cart, CheckoutReservation, CreatePaymentRequest, Order, Payment, PaymentReceipt};
use crate::pipelines::webhook_pipeline::{ProviderEvent, WebhookOutcome};
use crate::services::payment_gateway::{PaymentGateway, ProviderIntent};
use crate::services::payment_initiator::PaymentInitiator;
use crate::stores::{OrderStore, PaymentStore};
use actix_web::web::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Implemented by contexts whose first step loads the caller's active cart.
pub trait CartScope {
  fn orders(&self) -> Arc<dyn OrderStore>;
  fn user_id(&self) -> Uuid;
  fn set_cart(&mut self, cart: Cart);
}

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub orders: Arc<dyn OrderStore>,
  pub user_id: Uuid,
  pub cart: Option<Cart>,
  pub order: Option<Order>,
}

impl CheckoutCtxData {
  pub fn new(orders: Arc<dyn OrderStore>, user_id: Uuid) -> Self {
    Self {
      orders,
      user_id,
      cart: None,
      order: None,
    }
  }
}

/// Deferred checkout: pay first, materialize the order when payment succeeds.
#[derive(Clone)]
pub struct ProcessPaymentCtxData {
  pub orders: Arc<dyn OrderStore>,
  pub initiator: Arc<dyn PaymentInitiator>,
  pub user_id: Uuid,
  pub bearer_token: String,
  pub payment_method: Option<String>,
  pub cart: Option<Cart>,
  pub reservation: Option<CheckoutReservation>,
  pub receipt: Option<PaymentReceipt>,
  /// Set when an earlier attempt for the same checkout reference was returned.
  pub reused_existing: bool,
}

impl ProcessPaymentCtxData {
  pub fn new(
    orders: Arc<dyn OrderStore>,
    initiator: Arc<dyn PaymentInitiator>,
    user_id: Uuid,
    bearer_token: &str,
    payment_method: Option<String>,
  ) -> Self {
    Self {
      orders,
      initiator,
      user_id,
      bearer_token: bearer_token.to_string(),
      payment_method,
      cart: None,
      reservation: None,
      receipt: None,
      reused_existing: false,
    }
  }
}

impl CartScope for CheckoutCtxData {
  fn orders(&self) -> Arc<dyn OrderStore> {
    self.orders.clone()
  }

  fn user_id(&self) -> Uuid {
    self.user_id
  }

  fn set_cart(&mut self, cart: Cart) {
    self.cart = Some(cart);
  }
}

impl CartScope for ProcessPaymentCtxData {
  fn orders(&self) -> Arc<dyn OrderStore> {
    self.orders.clone()
  }

  fn user_id(&self) -> Uuid {
    self.user_id
  }

  fn set_cart(&mut self, cart: Cart) {
    self.cart = Some(cart);
  }
}

#[derive(Clone)]
pub struct CreatePaymentCtxData {
  pub payments: Arc<dyn PaymentStore>,
  pub gateway: Arc<dyn PaymentGateway>,
  pub default_currency: String,
  pub request: CreatePaymentRequest,
  /// Normalized by the validation step.
  pub currency: String,
  pub payment_method: String,
  pub payment_id: Uuid,
  pub intent: Option<ProviderIntent>,
  pub payment: Option<Payment>,
}

impl CreatePaymentCtxData {
  pub fn new(
    payments: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    default_currency: &str,
    request: CreatePaymentRequest,
  ) -> Self {
    Self {
      payments,
      gateway,
      default_currency: default_currency.to_string(),
      request,
      currency: String::new(),
      payment_method: String::new(),
      payment_id: Uuid::new_v4(),
      intent: None,
      payment: None,
    }
  }
}

#[derive(Clone)]
pub struct StripeWebhookCtxData {
  pub payments: Arc<dyn PaymentStore>,
  pub webhook_secret: String,
  pub tolerance_secs: i64,
  pub received_at: DateTime<Utc>,
  pub raw_body: Bytes,
  pub signature_header: Option<String>,
  pub event: Option<ProviderEvent>,
  pub payment: Option<Payment>,
  pub outcome: Option<WebhookOutcome>,
}
