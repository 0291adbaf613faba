// app/src/contracts.rs

//! Versioned event schema shared by every service.
//!
//! Each topic has exactly one payload type. Envelopes are validated when they
//! are written to an outbox and again after they are decoded by a consumer.

use crate::errors::{AppError, Result};
use crate::models::{Delivery, Location, Order, Payment};
use serde::{Deserialize, Serialize};
use tiffin_core::Envelope;
use uuid::Uuid;

pub const SCHEMA_VERSION: u16 = 1;

pub mod topics {
  pub const ORDER_CREATED: &str = "order.created";
  pub const PAYMENT_PENDING: &str = "payment.pending";
  pub const PAYMENT_SUCCEEDED: &str = "payment.succeeded";
  pub const PAYMENT_FAILED: &str = "payment.failed";
  pub const PAYMENT_CANCELLED: &str = "payment.cancelled";
  pub const DELIVERY_ASSIGNED: &str = "delivery.assigned";
  pub const DELIVERY_COMPLETED: &str = "delivery.completed";

  pub const ALL: [&str; 7] = [
    ORDER_CREATED,
    PAYMENT_PENDING,
    PAYMENT_SUCCEEDED,
    PAYMENT_FAILED,
    PAYMENT_CANCELLED,
    DELIVERY_ASSIGNED,
    DELIVERY_COMPLETED,
  ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
  pub name: String,
  pub quantity: i32,
  pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
  pub order_id: Uuid,
  pub user_id: Uuid,
  pub restaurant_id: String,
  pub items: Vec<OrderLine>,
  pub total_amount: i64,
  pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPending {
  pub payment_id: Uuid,
  pub order_id: Uuid,
  pub user_id: Uuid,
  pub amount: i64,
  pub currency: String,
  pub payment_method: String,
  pub provider_payment_id: String,
  pub status: String,
  pub client_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSucceeded {
  pub payment_id: Uuid,
  pub order_id: Uuid,
  pub user_id: Uuid,
  pub amount: i64,
  pub currency: String,
  pub payment_method: String,
  pub provider_payment_id: String,
  pub status: String,
  pub charge_id: Option<String>,
}

/// Payload of both `payment.failed` and `payment.cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailed {
  pub payment_id: Uuid,
  pub order_id: Uuid,
  pub user_id: Uuid,
  pub amount: i64,
  pub currency: String,
  pub provider_payment_id: String,
  pub status: String,
  pub failure_reason: String,
}

/// Payload of both `delivery.assigned` and `delivery.completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryUpdate {
  pub order_id: Uuid,
  pub user_id: Uuid,
  pub driver_name: String,
  pub location: Location,
  pub status: String,
}

impl OrderCreated {
  pub fn from_order(order: &Order) -> Self {
    Self {
      order_id: order.id,
      user_id: order.user_id,
      restaurant_id: order.restaurant_id.clone(),
      items: order
        .items
        .iter()
        .map(|item| OrderLine {
          name: item.name.clone(),
          quantity: item.quantity,
          price: item.price,
        })
        .collect(),
      total_amount: order.total_amount,
      status: "created".to_string(),
    }
  }
}

impl PaymentPending {
  pub fn from_payment(payment: &Payment) -> Self {
    Self {
      payment_id: payment.id,
      order_id: payment.order_id,
      user_id: payment.user_id,
      amount: payment.amount,
      currency: payment.currency.clone(),
      payment_method: payment.payment_method.clone(),
      provider_payment_id: payment.provider_payment_id.clone(),
      status: payment.status.as_str().to_string(),
      client_secret: payment.client_secret.clone(),
    }
  }
}

impl PaymentSucceeded {
  pub fn from_payment(payment: &Payment) -> Self {
    Self {
      payment_id: payment.id,
      order_id: payment.order_id,
      user_id: payment.user_id,
      amount: payment.amount,
      currency: payment.currency.clone(),
      payment_method: payment.payment_method.clone(),
      provider_payment_id: payment.provider_payment_id.clone(),
      status: payment.status.as_str().to_string(),
      charge_id: payment.charge_id.clone(),
    }
  }
}

impl PaymentFailed {
  pub fn from_payment(payment: &Payment) -> Self {
    Self {
      payment_id: payment.id,
      order_id: payment.order_id,
      user_id: payment.user_id,
      amount: payment.amount,
      currency: payment.currency.clone(),
      provider_payment_id: payment.provider_payment_id.clone(),
      status: payment.status.as_str().to_string(),
      failure_reason: payment.failure_reason.clone().unwrap_or_else(|| "unknown".to_string()),
    }
  }
}

impl DeliveryUpdate {
  pub fn from_delivery(delivery: &Delivery) -> Self {
    Self {
      order_id: delivery.order_id,
      user_id: delivery.user_id,
      driver_name: delivery.driver_name.clone(),
      location: delivery.location,
      status: delivery.status.as_str().to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
  OrderCreated(OrderCreated),
  PaymentPending(PaymentPending),
  PaymentSucceeded(PaymentSucceeded),
  PaymentFailed(PaymentFailed),
  PaymentCancelled(PaymentFailed),
  DeliveryAssigned(DeliveryUpdate),
  DeliveryCompleted(DeliveryUpdate),
}

fn require(condition: bool, what: &str) -> Result<()> {
  if condition {
    Ok(())
  } else {
    Err(AppError::Contract(what.to_string()))
  }
}

fn require_id(id: &Uuid, field: &str) -> Result<()> {
  require(!id.is_nil(), &format!("{} must not be nil", field))
}

impl DomainEvent {
  pub fn topic(&self) -> &'static str {
    match self {
      DomainEvent::OrderCreated(_) => topics::ORDER_CREATED,
      DomainEvent::PaymentPending(_) => topics::PAYMENT_PENDING,
      DomainEvent::PaymentSucceeded(_) => topics::PAYMENT_SUCCEEDED,
      DomainEvent::PaymentFailed(_) => topics::PAYMENT_FAILED,
      DomainEvent::PaymentCancelled(_) => topics::PAYMENT_CANCELLED,
      DomainEvent::DeliveryAssigned(_) => topics::DELIVERY_ASSIGNED,
      DomainEvent::DeliveryCompleted(_) => topics::DELIVERY_COMPLETED,
    }
  }

  /// Status literal each topic must carry.
  fn expected_status(&self) -> &'static [&'static str] {
    match self {
      DomainEvent::OrderCreated(_) => &["created"],
      DomainEvent::PaymentPending(_) => &["processing"],
      DomainEvent::PaymentSucceeded(_) => &["succeeded"],
      DomainEvent::PaymentFailed(_) => &["failed"],
      DomainEvent::PaymentCancelled(_) => &["cancelled"],
      DomainEvent::DeliveryAssigned(_) => &["assigned"],
      DomainEvent::DeliveryCompleted(_) => &["completed", "delivered"],
    }
  }

  pub fn order_id(&self) -> Uuid {
    match self {
      DomainEvent::OrderCreated(e) => e.order_id,
      DomainEvent::PaymentPending(e) => e.order_id,
      DomainEvent::PaymentSucceeded(e) => e.order_id,
      DomainEvent::PaymentFailed(e) | DomainEvent::PaymentCancelled(e) => e.order_id,
      DomainEvent::DeliveryAssigned(e) | DomainEvent::DeliveryCompleted(e) => e.order_id,
    }
  }

  fn status(&self) -> &str {
    match self {
      DomainEvent::OrderCreated(e) => &e.status,
      DomainEvent::PaymentPending(e) => &e.status,
      DomainEvent::PaymentSucceeded(e) => &e.status,
      DomainEvent::PaymentFailed(e) | DomainEvent::PaymentCancelled(e) => &e.status,
      DomainEvent::DeliveryAssigned(e) | DomainEvent::DeliveryCompleted(e) => &e.status,
    }
  }

  pub fn validate(&self) -> Result<()> {
    require_id(&self.order_id(), "orderId")?;
    require(
      self.expected_status().contains(&self.status()),
      &format!("status '{}' does not match topic {}", self.status(), self.topic()),
    )?;
    match self {
      DomainEvent::OrderCreated(e) => {
        require_id(&e.user_id, "userId")?;
        require(!e.restaurant_id.is_empty(), "restaurantId must not be empty")?;
        require(!e.items.is_empty(), "items must not be empty")?;
        require(
          e.items.iter().all(|line| line.quantity > 0 && line.price > 0),
          "every item needs a positive quantity and price",
        )?;
        require(e.total_amount > 0, "totalAmount must be positive")
      }
      DomainEvent::PaymentPending(e) => {
        require_id(&e.payment_id, "paymentId")?;
        require_id(&e.user_id, "userId")?;
        require(e.amount > 0, "amount must be positive")?;
        require(!e.provider_payment_id.is_empty(), "providerPaymentId must not be empty")
      }
      DomainEvent::PaymentSucceeded(e) => {
        require_id(&e.payment_id, "paymentId")?;
        require_id(&e.user_id, "userId")?;
        require(e.amount > 0, "amount must be positive")?;
        require(!e.provider_payment_id.is_empty(), "providerPaymentId must not be empty")
      }
      DomainEvent::PaymentFailed(e) | DomainEvent::PaymentCancelled(e) => {
        require_id(&e.payment_id, "paymentId")?;
        require_id(&e.user_id, "userId")?;
        require(!e.failure_reason.is_empty(), "failureReason must not be empty")
      }
      DomainEvent::DeliveryAssigned(e) | DomainEvent::DeliveryCompleted(e) => {
        require_id(&e.user_id, "userId")?;
        require(!e.driver_name.is_empty(), "driverName must not be empty")
      }
    }
  }

  /// Validates the event and wraps it for the outbox, keyed by order id.
  pub fn to_envelope(&self) -> Result<Envelope> {
    self.validate()?;
    let key = self.order_id().to_string();
    let envelope = match self {
      DomainEvent::OrderCreated(e) => Envelope::encode(self.topic(), key, SCHEMA_VERSION, e),
      DomainEvent::PaymentPending(e) => Envelope::encode(self.topic(), key, SCHEMA_VERSION, e),
      DomainEvent::PaymentSucceeded(e) => Envelope::encode(self.topic(), key, SCHEMA_VERSION, e),
      DomainEvent::PaymentFailed(e) | DomainEvent::PaymentCancelled(e) => {
        Envelope::encode(self.topic(), key, SCHEMA_VERSION, e)
      }
      DomainEvent::DeliveryAssigned(e) | DomainEvent::DeliveryCompleted(e) => {
        Envelope::encode(self.topic(), key, SCHEMA_VERSION, e)
      }
    }?;
    Ok(envelope)
  }

  /// Decodes and validates a consumed envelope. Every failure here is permanent.
  pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
    if envelope.schema_version != SCHEMA_VERSION {
      return Err(AppError::Contract(format!(
        "unsupported schema version {} on {}",
        envelope.schema_version, envelope.topic
      )));
    }
    let decode_err = |e: tiffin_core::CoreError| AppError::Contract(e.to_string());
    let event = match envelope.topic.as_str() {
      topics::ORDER_CREATED => DomainEvent::OrderCreated(envelope.decode().map_err(decode_err)?),
      topics::PAYMENT_PENDING => DomainEvent::PaymentPending(envelope.decode().map_err(decode_err)?),
      topics::PAYMENT_SUCCEEDED => DomainEvent::PaymentSucceeded(envelope.decode().map_err(decode_err)?),
      topics::PAYMENT_FAILED => DomainEvent::PaymentFailed(envelope.decode().map_err(decode_err)?),
      topics::PAYMENT_CANCELLED => DomainEvent::PaymentCancelled(envelope.decode().map_err(decode_err)?),
      topics::DELIVERY_ASSIGNED => DomainEvent::DeliveryAssigned(envelope.decode().map_err(decode_err)?),
      topics::DELIVERY_COMPLETED => DomainEvent::DeliveryCompleted(envelope.decode().map_err(decode_err)?),
      other => return Err(AppError::Contract(format!("unknown topic '{}'", other))),
    };
    event.validate()?;
    if envelope.key != event.order_id().to_string() {
      return Err(AppError::Contract(format!(
        "envelope key '{}' does not match orderId {}",
        envelope.key,
        event.order_id()
      )));
    }
    Ok(event)
  }
}
