// app/src/services/payment_initiator.rs

//! How the order side asks the payment side for a payment in the deferred
//! checkout flow: in-process when both run together, over HTTP otherwise.

use crate::errors::{AppError, Result};
use crate::models::{CreatePaymentRequest, PaymentReceipt, PaymentView};
use crate::services::payment_service::PaymentService;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

#[async_trait]
pub trait PaymentInitiator: Send + Sync {
  async fn initiate(&self, request: &CreatePaymentRequest, bearer_token: &str) -> Result<PaymentReceipt>;

  /// The receipt of the order's latest payment, if any.
  async fn existing(&self, order_id: Uuid, bearer_token: &str) -> Result<Option<PaymentReceipt>>;
}

pub struct InProcessInitiator {
  payments: Arc<PaymentService>,
}

impl InProcessInitiator {
  pub fn new(payments: Arc<PaymentService>) -> Self {
    Self { payments }
  }
}

#[async_trait]
impl PaymentInitiator for InProcessInitiator {
  async fn initiate(&self, request: &CreatePaymentRequest, _bearer_token: &str) -> Result<PaymentReceipt> {
    self.payments.create_payment(request.clone()).await
  }

  async fn existing(&self, order_id: Uuid, _bearer_token: &str) -> Result<Option<PaymentReceipt>> {
    Ok(self.payments.latest_view(order_id).await?.map(|view| view.receipt()))
  }
}

/// Calls `POST /api/payments` on a separately deployed payment service,
/// forwarding the caller's bearer token.
pub struct HttpInitiator {
  client: reqwest::Client,
  base_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
  error: String,
  message: String,
}

impl HttpInitiator {
  pub fn new(base_url: &str) -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: base_url.trim_end_matches('/').to_string(),
    }
  }

  async fn error_from(order_id: Uuid, response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.json::<ErrorBody>().await.ok();
    let message = body
      .as_ref()
      .map(|b| b.message.clone())
      .unwrap_or_else(|| status.to_string());
    match (status, body.as_ref().map(|b| b.error.as_str())) {
      (_, Some("duplicate_payment")) => AppError::DuplicatePayment(order_id),
      (StatusCode::BAD_REQUEST, _) => AppError::Validation(message),
      (StatusCode::UNAUTHORIZED, _) => AppError::Auth(message),
      (StatusCode::FORBIDDEN, _) => AppError::Forbidden(message),
      _ => AppError::Gateway(format!("payment service answered {}: {}", status, message)),
    }
  }
}

fn unreachable_err(e: reqwest::Error) -> AppError {
  AppError::Gateway(format!("payment service unreachable: {}", e))
}

#[async_trait]
impl PaymentInitiator for HttpInitiator {
  #[instrument(name = "payment_initiator::http", skip(self, bearer_token), fields(order_id = %request.order_id), err(Display))]
  async fn initiate(&self, request: &CreatePaymentRequest, bearer_token: &str) -> Result<PaymentReceipt> {
    let response = self
      .client
      .post(format!("{}/api/payments", self.base_url))
      .bearer_auth(bearer_token)
      .json(request)
      .send()
      .await
      .map_err(unreachable_err)?;
    if !response.status().is_success() {
      return Err(Self::error_from(request.order_id, response).await);
    }
    response
      .json::<PaymentReceipt>()
      .await
      .map_err(|e| AppError::Gateway(format!("unreadable payment receipt: {}", e)))
  }

  async fn existing(&self, order_id: Uuid, bearer_token: &str) -> Result<Option<PaymentReceipt>> {
    let response = self
      .client
      .get(format!("{}/api/payments/{}", self.base_url, order_id))
      .bearer_auth(bearer_token)
      .send()
      .await
      .map_err(unreachable_err)?;
    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !response.status().is_success() {
      let err = Self::error_from(order_id, response).await;
      warn!(%order_id, error = %err, "Could not read existing payment.");
      return Err(err);
    }
    let view = response
      .json::<PaymentView>()
      .await
      .map_err(|e| AppError::Gateway(format!("unreadable payment: {}", e)))?;
    Ok(Some(view.receipt()))
  }
}
