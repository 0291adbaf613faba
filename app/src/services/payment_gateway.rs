// app/src/services/payment_gateway.rs

//! Adapter over the payment provider's intent creation.

use crate::errors::{AppError, Result};
use crate::models::Provider;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct IntentRequest {
  /// Id the local payment record will get; doubles as the idempotency key.
  pub payment_id: Uuid,
  pub order_id: Uuid,
  pub user_id: Uuid,
  pub amount: i64,
  pub currency: String,
  pub payment_method: String,
}

/// A created provider-side intent.
#[derive(Debug, Clone)]
pub struct ProviderIntent {
  pub provider: Provider,
  pub id: String,
  pub client_secret: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn create_intent(&self, request: &IntentRequest) -> Result<ProviderIntent>;
}

/// Talks to the Stripe REST API.
pub struct StripeGateway {
  client: reqwest::Client,
  api_base: String,
  secret_key: String,
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
  id: String,
  client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
  error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
  message: Option<String>,
}

impl StripeGateway {
  pub fn new(api_base: &str, secret_key: &str) -> Self {
    Self {
      client: reqwest::Client::new(),
      api_base: api_base.trim_end_matches('/').to_string(),
      secret_key: secret_key.to_string(),
    }
  }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
  #[instrument(name = "stripe::create_intent", skip(self), fields(order_id = %request.order_id), err(Display))]
  async fn create_intent(&self, request: &IntentRequest) -> Result<ProviderIntent> {
    let order_id = request.order_id.to_string();
    let user_id = request.user_id.to_string();
    let amount = request.amount.to_string();
    let form = [
      ("amount", amount.as_str()),
      ("currency", request.currency.as_str()),
      ("metadata[orderId]", order_id.as_str()),
      ("metadata[userId]", user_id.as_str()),
      ("metadata[paymentMethod]", request.payment_method.as_str()),
      ("automatic_payment_methods[enabled]", "true"),
    ];

    let response = self
      .client
      .post(format!("{}/v1/payment_intents", self.api_base))
      .bearer_auth(&self.secret_key)
      .header("Idempotency-Key", request.payment_id.to_string())
      .form(&form)
      .send()
      .await
      .map_err(|e| AppError::Gateway(format!("Stripe request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
      let message = response
        .json::<StripeErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error.message)
        .unwrap_or_else(|| status.to_string());
      warn!(%status, %message, "Stripe rejected intent creation.");
      return Err(AppError::Gateway(message));
    }

    let intent: StripeIntent = response
      .json()
      .await
      .map_err(|e| AppError::Gateway(format!("Unreadable Stripe response: {}", e)))?;
    info!(provider_payment_id = %intent.id, "Stripe payment intent created.");
    Ok(ProviderIntent {
      provider: Provider::Stripe,
      id: intent.id,
      client_secret: intent.client_secret,
    })
  }
}

/// Offline stand-in used when no Stripe key is configured.
#[derive(Debug, Default)]
pub struct MockGateway;

#[async_trait]
impl PaymentGateway for MockGateway {
  async fn create_intent(&self, request: &IntentRequest) -> Result<ProviderIntent> {
    let id = format!("mock_pi_{}", Uuid::new_v4().simple());
    info!(order_id = %request.order_id, provider_payment_id = %id, "Mock payment intent created.");
    Ok(ProviderIntent {
      provider: Provider::Mock,
      client_secret: Some(format!("{}_secret_{}", id, request.order_id.simple())),
      id,
    })
  }
}
