// app/src/pipelines/create_payment_pipeline.rs

//! Payment intent creation: validate → refuse duplicates → provider intent →
//! persist the `processing` payment together with its `payment.pending` event.

use crate::contracts::{DomainEvent, PaymentPending};
use crate::errors::{AppError, Result};
use crate::models::payment::{CURRENCIES, PAYMENT_METHODS};
use crate::models::{Payment, PaymentState};
use crate::pipelines::contexts::CreatePaymentCtxData;
use crate::services::payment_gateway::IntentRequest;
use chrono::Utc;
use tiffin_core::{ContextData, Pipeline, PipelineControl};
use tracing::{info, instrument, warn};

pub fn build_create_payment_pipeline() -> Pipeline<CreatePaymentCtxData, AppError> {
  let mut p = Pipeline::<CreatePaymentCtxData, AppError>::new(&[
    ("validate_request", false, None),
    ("guard_duplicate", false, None),
    ("create_intent", false, None),
    ("persist_payment", false, None),
  ]);

  p.on("validate_request", validate_request);
  p.on("guard_duplicate", guard_duplicate);
  p.on("create_intent", create_intent);
  p.on("persist_payment", persist_payment);
  p
}

async fn validate_request(ctx_data: ContextData<CreatePaymentCtxData>) -> Result<PipelineControl> {
  let mut guard = ctx_data.write();
  if guard.request.order_id.is_nil() || guard.request.user_id.is_nil() {
    return Err(AppError::Validation("orderId and userId are required".to_string()));
  }
  if guard.request.amount <= 0 {
    return Err(AppError::Validation("amount must be greater than zero".to_string()));
  }

  let currency = guard
    .request
    .currency
    .clone()
    .unwrap_or_else(|| guard.default_currency.clone())
    .to_lowercase();
  if !CURRENCIES.contains(&currency.as_str()) {
    return Err(AppError::Validation(format!("unsupported currency '{}'", currency)));
  }

  let method = guard
    .request
    .payment_method
    .clone()
    .unwrap_or_else(|| "card".to_string())
    .to_lowercase();
  if !PAYMENT_METHODS.contains(&method.as_str()) {
    return Err(AppError::Validation(format!("unsupported payment method '{}'", method)));
  }

  guard.currency = currency;
  guard.payment_method = method;
  Ok(PipelineControl::Continue)
}

/// Fast path only: the store re-checks inside the insert, which is what
/// settles two concurrent requests.
async fn guard_duplicate(ctx_data: ContextData<CreatePaymentCtxData>) -> Result<PipelineControl> {
  let (payments, order_id) = {
    let guard = ctx_data.read();
    (guard.payments.clone(), guard.request.order_id)
  };
  if let Some(existing) = payments.latest_for_order(order_id).await? {
    if existing.status.blocks_new_attempt() {
      warn!(%order_id, payment_id = %existing.id, status = %existing.status, "Payment already in progress.");
      return Err(AppError::DuplicatePayment(order_id));
    }
  }
  Ok(PipelineControl::Continue)
}

async fn create_intent(ctx_data: ContextData<CreatePaymentCtxData>) -> Result<PipelineControl> {
  let (gateway, request) = {
    let guard = ctx_data.read();
    (
      guard.gateway.clone(),
      IntentRequest {
        payment_id: guard.payment_id,
        order_id: guard.request.order_id,
        user_id: guard.request.user_id,
        amount: guard.request.amount,
        currency: guard.currency.clone(),
        payment_method: guard.payment_method.clone(),
      },
    )
  };
  let intent = gateway.create_intent(&request).await?;
  ctx_data.write().intent = Some(intent);
  Ok(PipelineControl::Continue)
}

#[instrument(name = "create_payment::persist", skip_all, err(Display))]
async fn persist_payment(ctx_data: ContextData<CreatePaymentCtxData>) -> Result<PipelineControl> {
  let (payments, payment) = {
    let guard = ctx_data.read();
    let intent = guard
      .intent
      .as_ref()
      .ok_or_else(|| AppError::Internal("no provider intent to persist".to_string()))?;
    let now = Utc::now();
    (
      guard.payments.clone(),
      Payment {
        id: guard.payment_id,
        order_id: guard.request.order_id,
        user_id: guard.request.user_id,
        amount: guard.request.amount,
        currency: guard.currency.clone(),
        payment_method: guard.payment_method.clone(),
        provider: intent.provider,
        provider_payment_id: intent.id.clone(),
        client_secret: intent.client_secret.clone(),
        status: PaymentState::Processing,
        failure_reason: None,
        charge_id: None,
        gateway_response: None,
        created_at: now,
        updated_at: now,
      },
    )
  };

  let envelope = DomainEvent::PaymentPending(PaymentPending::from_payment(&payment)).to_envelope()?;
  payments.insert_payment(&payment, vec![envelope]).await?;
  info!(
    payment_id = %payment.id,
    order_id = %payment.order_id,
    provider = %payment.provider.as_str(),
    provider_payment_id = %payment.provider_payment_id,
    "Payment created."
  );
  ctx_data.write().payment = Some(payment);
  Ok(PipelineControl::Continue)
}
