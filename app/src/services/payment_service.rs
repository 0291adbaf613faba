// app/src/services/payment_service.rs

use crate::config::AppConfig;
use crate::contracts::{topics, DomainEvent, OrderCreated};
use crate::errors::{AppError, Result};
use crate::models::{CreatePaymentRequest, PaymentReceipt, PaymentView};
use crate::pipelines::contexts::{CreatePaymentCtxData, StripeWebhookCtxData};
use crate::pipelines::{build_create_payment_pipeline, build_webhook_pipeline, WebhookOutcome};
use crate::services::payment_gateway::PaymentGateway;
use crate::stores::PaymentStore;
use actix_web::web::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tiffin_core::{ContextData, Consumer, ConsumerSettings, EventBus, Pipeline};
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub const CONSUMER_GROUP: &str = "payment-service";

#[derive(Debug, Clone)]
pub struct PaymentSettings {
  pub default_currency: String,
  pub webhook_secret: String,
  pub webhook_tolerance_secs: i64,
}

impl PaymentSettings {
  pub fn from_config(config: &AppConfig) -> Self {
    Self {
      default_currency: config.payment_default_currency.clone(),
      webhook_secret: config.stripe_webhook_secret.clone(),
      webhook_tolerance_secs: config.stripe_webhook_tolerance_secs,
    }
  }
}

pub struct PaymentService {
  payments: Arc<dyn PaymentStore>,
  gateway: Arc<dyn PaymentGateway>,
  settings: PaymentSettings,
  create_pipeline: Pipeline<CreatePaymentCtxData, AppError>,
  webhook_pipeline: Pipeline<StripeWebhookCtxData, AppError>,
}

impl PaymentService {
  pub fn new(payments: Arc<dyn PaymentStore>, gateway: Arc<dyn PaymentGateway>, settings: PaymentSettings) -> Self {
    Self {
      payments,
      gateway,
      settings,
      create_pipeline: build_create_payment_pipeline(),
      webhook_pipeline: build_webhook_pipeline(),
    }
  }

  /// Creates a provider intent and a `processing` payment for an order.
  #[instrument(
    name = "payment_service::create_payment",
    skip(self, request),
    fields(order_id = %request.order_id, user_id = %request.user_id),
    err(Display)
  )]
  pub async fn create_payment(&self, request: CreatePaymentRequest) -> Result<PaymentReceipt> {
    let ctx_data = ContextData::new(CreatePaymentCtxData::new(
      self.payments.clone(),
      self.gateway.clone(),
      &self.settings.default_currency,
      request,
    ));
    self.create_pipeline.run(ctx_data.clone()).await?;
    let guard = ctx_data.read();
    guard
      .payment
      .as_ref()
      .map(PaymentReceipt::from)
      .ok_or_else(|| AppError::Internal("payment pipeline finished without a payment".to_string()))
  }

  /// Verifies and applies a Stripe webhook. Errors are only returned for
  /// requests the provider should retry or that failed verification.
  #[instrument(name = "payment_service::stripe_webhook", skip_all, fields(body_len = raw_body.len()), err(Display))]
  pub async fn handle_stripe_webhook(
    &self,
    raw_body: Bytes,
    signature_header: Option<String>,
    received_at: DateTime<Utc>,
  ) -> Result<WebhookOutcome> {
    let ctx_data = ContextData::new(StripeWebhookCtxData {
      payments: self.payments.clone(),
      webhook_secret: self.settings.webhook_secret.clone(),
      tolerance_secs: self.settings.webhook_tolerance_secs,
      received_at,
      raw_body,
      signature_header,
      event: None,
      payment: None,
      outcome: None,
    });
    self.webhook_pipeline.run(ctx_data.clone()).await?;
    let outcome = ctx_data.read().outcome.unwrap_or(WebhookOutcome::Ignored);
    Ok(outcome)
  }

  pub async fn latest_view(&self, order_id: Uuid) -> Result<Option<PaymentView>> {
    Ok(self.payments.latest_for_order(order_id).await?.map(PaymentView::from))
  }

  /// The latest payment for an order, readable by its owner only.
  pub async fn payment_for_order(&self, requester: Uuid, order_id: Uuid) -> Result<PaymentView> {
    let view = self
      .latest_view(order_id)
      .await?
      .ok_or_else(|| AppError::NotFound(format!("No payment for order {}", order_id)))?;
    if view.payment.user_id != requester {
      return Err(AppError::Forbidden("Payment belongs to another user".to_string()));
    }
    Ok(view)
  }

  /// Opens a payment for a freshly placed order. Any earlier attempt for the
  /// order, open or settled, makes this a no-op so redelivery never re-charges.
  #[instrument(name = "payment_service::on_order_created", skip_all, fields(order_id = %event.order_id))]
  pub async fn on_order_created(&self, event: &OrderCreated) -> Result<()> {
    if let Some(existing) = self.payments.latest_for_order(event.order_id).await? {
      debug!(payment_id = %existing.id, status = %existing.status, "Order already has a payment.");
      return Ok(());
    }
    let request = CreatePaymentRequest {
      order_id: event.order_id,
      user_id: event.user_id,
      amount: event.total_amount,
      currency: None,
      payment_method: None,
    };
    match self.create_payment(request).await {
      Ok(receipt) => {
        info!(payment_id = %receipt.payment_id, "Payment opened for new order.");
        Ok(())
      }
      Err(AppError::DuplicatePayment(_)) => Ok(()),
      Err(e) => Err(e),
    }
  }

  pub fn consumer(self: &Arc<Self>, bus: Arc<dyn EventBus>, settings: ConsumerSettings) -> Consumer<AppError> {
    let mut consumer = Consumer::new(CONSUMER_GROUP, bus, settings);
    let service = Arc::clone(self);
    consumer.on_topic(topics::ORDER_CREATED, move |delivery| {
      let service = service.clone();
      async move {
        match DomainEvent::from_envelope(&delivery.envelope)? {
          DomainEvent::OrderCreated(event) => service.on_order_created(&event).await,
          other => Err(AppError::Contract(format!("unexpected {} on {}", other.topic(), topics::ORDER_CREATED))),
        }
      }
    });
    consumer
  }
}
