// app/src/web/handlers/payment_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::CreatePaymentRequest;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

#[instrument(
  name = "handler::create_payment",
  skip(app_state, payload, auth_user),
  fields(user_id = %auth_user.user_id, order_id = %payload.order_id, amount = payload.amount)
)]
pub async fn create_payment_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<CreatePaymentRequest>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  if payload.user_id != auth_user.user_id {
    warn!(requested_for = %payload.user_id, "Payment requested on behalf of another user.");
    return Err(AppError::Forbidden("Cannot create a payment for another user".to_string()));
  }
  let receipt = app_state.payments.create_payment(payload.into_inner()).await?;
  info!(payment_id = %receipt.payment_id, "Payment intent created.");
  Ok(HttpResponse::Created().json(receipt))
}

/// Unauthenticated; trust comes from the provider signature over the raw body.
#[instrument(name = "handler::stripe_webhook", skip(app_state, req, body), fields(body_len = body.len()))]
pub async fn stripe_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let signature_header = req
    .headers()
    .get(STRIPE_SIGNATURE_HEADER)
    .and_then(|value| value.to_str().ok())
    .map(String::from);
  let outcome = app_state
    .payments
    .handle_stripe_webhook(body, signature_header, Utc::now())
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "received": true, "outcome": outcome })))
}

#[instrument(name = "handler::get_payment", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn get_payment_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let view = app_state
    .payments
    .payment_for_order(auth_user.user_id, order_id.into_inner())
    .await?;
  Ok(HttpResponse::Ok().json(view))
}
