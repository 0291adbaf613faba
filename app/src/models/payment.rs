// app/src/models/payment.rs

use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const CURRENCIES: [&str; 3] = ["inr", "usd", "eur"];
pub const PAYMENT_METHODS: [&str; 5] = ["card", "upi", "wallet", "cod", "unknown"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
  Pending,
  Processing,
  Succeeded,
  Failed,
  Cancelled,
}

impl PaymentState {
  pub fn as_str(&self) -> &'static str {
    match self {
      PaymentState::Pending => "pending",
      PaymentState::Processing => "processing",
      PaymentState::Succeeded => "succeeded",
      PaymentState::Failed => "failed",
      PaymentState::Cancelled => "cancelled",
    }
  }

  /// Failed and cancelled attempts no longer block a new payment for the order.
  pub fn blocks_new_attempt(&self) -> bool {
    !matches!(self, PaymentState::Failed | PaymentState::Cancelled)
  }

  /// Only pending and processing payments accept a provider transition.
  pub fn accepts_transition(&self) -> bool {
    matches!(self, PaymentState::Pending | PaymentState::Processing)
  }
}

impl fmt::Display for PaymentState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for PaymentState {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(PaymentState::Pending),
      "processing" => Ok(PaymentState::Processing),
      "succeeded" => Ok(PaymentState::Succeeded),
      "failed" => Ok(PaymentState::Failed),
      "cancelled" => Ok(PaymentState::Cancelled),
      other => Err(AppError::Internal(format!("unknown payment state '{}'", other))),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
  Stripe,
  Mock,
}

impl Provider {
  pub fn as_str(&self) -> &'static str {
    match self {
      Provider::Stripe => "stripe",
      Provider::Mock => "mock",
    }
  }
}

impl FromStr for Provider {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "stripe" => Ok(Provider::Stripe),
      "mock" => Ok(Provider::Mock),
      other => Err(AppError::Internal(format!("unknown payment provider '{}'", other))),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
  pub id: Uuid,
  pub order_id: Uuid,
  pub user_id: Uuid,
  pub amount: i64,
  pub currency: String,
  pub payment_method: String,
  pub provider: Provider,
  pub provider_payment_id: String,
  #[serde(skip_serializing)]
  pub client_secret: Option<String>,
  pub status: PaymentState,
  pub failure_reason: Option<String>,
  pub charge_id: Option<String>,
  /// Raw provider payload of the last transition, kept for audit.
  pub gateway_response: Option<serde_json::Value>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/payments`, also used by the deferred checkout flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
  pub order_id: Uuid,
  pub user_id: Uuid,
  pub amount: i64,
  #[serde(default)]
  pub currency: Option<String>,
  #[serde(default)]
  pub payment_method: Option<String>,
}

/// What a client needs to confirm the payment with the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
  pub payment_id: Uuid,
  pub order_id: Uuid,
  pub amount: i64,
  pub client_secret: Option<String>,
  pub provider_payment_id: String,
  pub status: PaymentState,
}

impl From<&Payment> for PaymentReceipt {
  fn from(payment: &Payment) -> Self {
    Self {
      payment_id: payment.id,
      order_id: payment.order_id,
      amount: payment.amount,
      client_secret: payment.client_secret.clone(),
      provider_payment_id: payment.provider_payment_id.clone(),
      status: payment.status,
    }
  }
}

/// Owner-facing read of a payment, including the secret the client confirms with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
  pub payment: Payment,
  pub client_secret: Option<String>,
}

impl PaymentView {
  pub fn receipt(&self) -> PaymentReceipt {
    PaymentReceipt {
      client_secret: self.client_secret.clone(),
      ..PaymentReceipt::from(&self.payment)
    }
  }
}

impl From<Payment> for PaymentView {
  fn from(payment: Payment) -> Self {
    Self {
      client_secret: payment.client_secret.clone(),
      payment,
    }
  }
}
