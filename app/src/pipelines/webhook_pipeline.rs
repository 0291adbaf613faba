// app/src/pipelines/webhook_pipeline.rs

//! Stripe webhook handling. Only a verified callback may move a payment to a
//! terminal state; the status write, the stored provider payload and the
//! outgoing event commit together.

use crate::contracts::{DomainEvent, PaymentFailed, PaymentSucceeded};
use crate::errors::{AppError, Result};
use crate::models::PaymentState;
use crate::pipelines::contexts::StripeWebhookCtxData;
use crate::services::webhook_signature::verify_stripe_signature;
use crate::stores::PaymentTransition;
use serde::Serialize;
use serde_json::Value;
use tiffin_core::{ContextData, Pipeline, PipelineControl};
use tracing::{debug, info, instrument, warn};

pub const INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const INTENT_FAILED: &str = "payment_intent.payment_failed";
pub const INTENT_CANCELED: &str = "payment_intent.canceled";

/// The parts of a provider event this service acts on.
#[derive(Debug, Clone)]
pub struct ProviderEvent {
  pub id: Option<String>,
  pub event_type: String,
  pub intent_id: Option<String>,
  pub charge_id: Option<String>,
  pub failure_reason: Option<String>,
  pub cancellation_reason: Option<String>,
  pub object: Value,
}

impl ProviderEvent {
  pub fn parse(body: &[u8]) -> Result<Self> {
    let root: Value =
      serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("webhook body is not JSON: {}", e)))?;
    let event_type = root
      .get("type")
      .and_then(Value::as_str)
      .ok_or_else(|| AppError::Validation("webhook event has no type".to_string()))?
      .to_string();
    let object = root.pointer("/data/object").cloned().unwrap_or(Value::Null);
    let text = |pointer: &str| object.pointer(pointer).and_then(Value::as_str).map(str::to_string);

    Ok(Self {
      id: root.get("id").and_then(Value::as_str).map(str::to_string),
      intent_id: text("/id"),
      charge_id: text("/charges/data/0/id").or_else(|| text("/latest_charge")),
      failure_reason: text("/last_payment_error/message"),
      cancellation_reason: text("/cancellation_reason"),
      event_type,
      object,
    })
  }

  fn target_state(&self) -> Option<PaymentState> {
    match self.event_type.as_str() {
      INTENT_SUCCEEDED => Some(PaymentState::Succeeded),
      INTENT_FAILED => Some(PaymentState::Failed),
      INTENT_CANCELED => Some(PaymentState::Cancelled),
      _ => None,
    }
  }
}

/// What a verified webhook led to. Every outcome is acknowledged with 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
  Applied,
  /// The payment had already left `pending`/`processing`; nothing was written.
  AlreadySettled,
  /// No payment with this provider id (yet); nothing was written.
  UnknownPayment,
  Ignored,
}

pub fn build_webhook_pipeline() -> Pipeline<StripeWebhookCtxData, AppError> {
  let mut p = Pipeline::<StripeWebhookCtxData, AppError>::new(&[
    ("verify_signature", false, None),
    ("decode_event", false, None),
    ("load_payment", false, None),
    ("apply_transition", false, None),
  ]);

  p.on("verify_signature", verify_signature);
  p.on("decode_event", decode_event);
  p.on("load_payment", load_payment);
  p.on("apply_transition", apply_transition);
  p
}

async fn verify_signature(ctx_data: ContextData<StripeWebhookCtxData>) -> Result<PipelineControl> {
  let guard = ctx_data.read();
  verify_stripe_signature(
    &guard.raw_body,
    guard.signature_header.as_deref(),
    &guard.webhook_secret,
    guard.tolerance_secs,
    guard.received_at,
  )
  .map_err(|e| {
    warn!(error = %e, "Rejected webhook with invalid signature.");
    e
  })?;
  Ok(PipelineControl::Continue)
}

async fn decode_event(ctx_data: ContextData<StripeWebhookCtxData>) -> Result<PipelineControl> {
  let raw = ctx_data.read().raw_body.clone();
  let event = ProviderEvent::parse(&raw)?;
  let mut guard = ctx_data.write();
  if event.target_state().is_none() {
    debug!(event_type = %event.event_type, "Ignoring unhandled provider event.");
    guard.outcome = Some(WebhookOutcome::Ignored);
    return Ok(PipelineControl::Stop);
  }
  if event.intent_id.is_none() {
    return Err(AppError::Validation(format!("{} event carries no intent id", event.event_type)));
  }
  guard.event = Some(event);
  Ok(PipelineControl::Continue)
}

async fn load_payment(ctx_data: ContextData<StripeWebhookCtxData>) -> Result<PipelineControl> {
  let (payments, intent_id) = {
    let guard = ctx_data.read();
    (
      guard.payments.clone(),
      guard.event.as_ref().and_then(|e| e.intent_id.clone()).unwrap_or_default(),
    )
  };
  match payments.find_by_provider_id(&intent_id).await? {
    Some(payment) => {
      ctx_data.write().payment = Some(payment);
      Ok(PipelineControl::Continue)
    }
    None => {
      // The webhook can beat the request that records the payment. The
      // provider does not resend after a 200, so this is only logged.
      warn!(provider_payment_id = %intent_id, "Webhook for unknown payment acknowledged without changes.");
      ctx_data.write().outcome = Some(WebhookOutcome::UnknownPayment);
      Ok(PipelineControl::Stop)
    }
  }
}

#[instrument(name = "webhook::apply_transition", skip_all, err(Display))]
async fn apply_transition(ctx_data: ContextData<StripeWebhookCtxData>) -> Result<PipelineControl> {
  let (payments, event, payment, at) = {
    let guard = ctx_data.read();
    (guard.payments.clone(), guard.event.clone(), guard.payment.clone(), guard.received_at)
  };
  let (Some(event), Some(mut payment)) = (event, payment) else {
    return Err(AppError::Internal("webhook reached transition without event or payment".to_string()));
  };
  let Some(to) = event.target_state() else {
    return Ok(PipelineControl::Stop);
  };

  if !payment.status.accepts_transition() {
    info!(payment_id = %payment.id, status = %payment.status, "Replayed webhook, payment already settled.");
    ctx_data.write().outcome = Some(WebhookOutcome::AlreadySettled);
    return Ok(PipelineControl::Continue);
  }

  let failure_reason = match to {
    PaymentState::Failed => Some(event.failure_reason.clone().unwrap_or_else(|| "unknown".to_string())),
    PaymentState::Cancelled => Some(event.cancellation_reason.clone().unwrap_or_else(|| "cancelled".to_string())),
    _ => None,
  };
  payment.status = to;
  payment.failure_reason = failure_reason.clone();
  payment.charge_id = event.charge_id.clone();
  payment.gateway_response = Some(event.object.clone());
  payment.updated_at = at;

  let domain_event = match to {
    PaymentState::Succeeded => DomainEvent::PaymentSucceeded(PaymentSucceeded::from_payment(&payment)),
    PaymentState::Cancelled => DomainEvent::PaymentCancelled(PaymentFailed::from_payment(&payment)),
    _ => DomainEvent::PaymentFailed(PaymentFailed::from_payment(&payment)),
  };
  let transition = PaymentTransition {
    payment_id: payment.id,
    to,
    failure_reason,
    charge_id: payment.charge_id.clone(),
    gateway_response: event.object.clone(),
    at,
  };

  let applied = payments
    .apply_transition(&transition, vec![domain_event.to_envelope()?])
    .await?;
  let outcome = if applied {
    info!(
      payment_id = %payment.id,
      order_id = %payment.order_id,
      status = %to,
      provider_event = ?event.id,
      "Payment settled by provider webhook."
    );
    WebhookOutcome::Applied
  } else {
    info!(payment_id = %payment.id, "Payment settled concurrently, webhook is a no-op.");
    WebhookOutcome::AlreadySettled
  };
  ctx_data.write().outcome = Some(outcome);
  Ok(PipelineControl::Continue)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn failure_details_are_extracted() {
    let body = json!({
      "id": "evt_1",
      "type": "payment_intent.payment_failed",
      "data": { "object": { "id": "pi_1", "last_payment_error": { "message": "card declined" } } }
    });
    let event = ProviderEvent::parse(body.to_string().as_bytes()).unwrap();
    assert_eq!(event.intent_id.as_deref(), Some("pi_1"));
    assert_eq!(event.failure_reason.as_deref(), Some("card declined"));
    assert_eq!(event.target_state(), Some(PaymentState::Failed));
  }

  #[test]
  fn charge_id_falls_back_to_latest_charge() {
    let listed = json!({
      "type": "payment_intent.succeeded",
      "data": { "object": { "id": "pi_1", "charges": { "data": [{ "id": "ch_listed" }] } } }
    });
    let latest = json!({
      "type": "payment_intent.succeeded",
      "data": { "object": { "id": "pi_1", "latest_charge": "ch_latest" } }
    });
    let listed = ProviderEvent::parse(listed.to_string().as_bytes()).unwrap();
    let latest = ProviderEvent::parse(latest.to_string().as_bytes()).unwrap();
    assert_eq!(listed.charge_id.as_deref(), Some("ch_listed"));
    assert_eq!(latest.charge_id.as_deref(), Some("ch_latest"));
  }

  #[test]
  fn other_event_types_have_no_target() {
    let body = json!({ "type": "charge.refunded", "data": { "object": {} } });
    assert!(ProviderEvent::parse(body.to_string().as_bytes()).unwrap().target_state().is_none());
    assert!(ProviderEvent::parse(b"not json").is_err());
  }
}
