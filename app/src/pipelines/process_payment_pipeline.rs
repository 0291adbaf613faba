// app/src/pipelines/process_payment_pipeline.rs

//! Deferred checkout: reserve an order id and a priced copy of the cart, then
//! ask the payment side for a payment against it. No order exists until
//! `payment.succeeded`, and it is then built from the reservation.

use crate::errors::{AppError, Result};
use crate::models::{CheckoutReservation, CreatePaymentRequest};
use crate::pipelines::common_steps;
use crate::pipelines::contexts::ProcessPaymentCtxData;
use chrono::Utc;
use tiffin_core::{ContextData, Pipeline, PipelineControl};
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub fn build_process_payment_pipeline() -> Pipeline<ProcessPaymentCtxData, AppError> {
  let mut p = Pipeline::<ProcessPaymentCtxData, AppError>::new(&[
    ("load_cart", false, None),
    ("reserve_checkout_ref", false, None),
    ("initiate_payment", false, None),
  ]);

  p.on("load_cart", common_steps::load_active_cart::<ProcessPaymentCtxData>);
  p.on("reserve_checkout_ref", reserve_checkout_ref);
  p.on("initiate_payment", initiate_payment);
  p
}

/// Reuses the reference already on the cart while its reservation still prices
/// the cart, so repeated calls target one order id. Otherwise reserves a new one.
async fn reserve_checkout_ref(ctx_data: ContextData<ProcessPaymentCtxData>) -> Result<PipelineControl> {
  let (orders, cart) = {
    let guard = ctx_data.read();
    (guard.orders.clone(), guard.cart.clone())
  };
  let mut cart = cart.ok_or_else(|| AppError::Internal("no cart to reserve".to_string()))?;

  if let Some(existing) = cart.checkout_ref {
    match orders.reservation(existing).await? {
      Some(reservation) if reservation.prices(&cart) => {
        ctx_data.write().reservation = Some(reservation);
        return Ok(PipelineControl::Continue);
      }
      _ => warn!(cart_id = %cart.id, %existing, "Checkout reference no longer prices the cart, reserving a new one."),
    }
  }

  let order_id = Uuid::new_v4();
  let expected_version = cart.version;
  cart.checkout_ref = Some(order_id);
  cart.version += 1;
  cart.updated_at = Utc::now();
  let reservation = CheckoutReservation::from_cart(order_id, &cart);
  if !orders.reserve_checkout(&cart, expected_version, &reservation).await? {
    warn!(cart_id = %cart.id, "Cart changed while reserving a checkout reference.");
    return Err(AppError::Conflict("Cart changed, please retry".to_string()));
  }
  info!(cart_id = %cart.id, %order_id, total_amount = reservation.total_amount, "Checkout reference reserved.");

  let mut guard = ctx_data.write();
  guard.reservation = Some(reservation);
  guard.cart = Some(cart);
  Ok(PipelineControl::Continue)
}

#[instrument(name = "process_payment::initiate", skip_all, err(Display))]
async fn initiate_payment(ctx_data: ContextData<ProcessPaymentCtxData>) -> Result<PipelineControl> {
  let (initiator, token, request) = {
    let guard = ctx_data.read();
    let reservation = guard
      .reservation
      .as_ref()
      .ok_or_else(|| AppError::Internal("no checkout reservation".to_string()))?;
    (
      guard.initiator.clone(),
      guard.bearer_token.clone(),
      CreatePaymentRequest {
        order_id: reservation.order_id,
        user_id: guard.user_id,
        amount: reservation.total_amount,
        currency: None,
        payment_method: guard.payment_method.clone(),
      },
    )
  };

  match initiator.initiate(&request, &token).await {
    Ok(receipt) => {
      ctx_data.write().receipt = Some(receipt);
      Ok(PipelineControl::Continue)
    }
    Err(AppError::DuplicatePayment(order_id)) => {
      // A retried call while the first attempt is still open gets that attempt back.
      let receipt = initiator
        .existing(order_id, &token)
        .await?
        .ok_or(AppError::DuplicatePayment(order_id))?;
      if receipt.amount != request.amount {
        warn!(
          %order_id,
          payment_id = %receipt.payment_id,
          open_amount = receipt.amount,
          cart_amount = request.amount,
          "Open payment attempt does not match the cart total."
        );
        return Err(AppError::Conflict(format!(
          "Order {} already has an open payment for a different amount",
          order_id
        )));
      }
      info!(%order_id, payment_id = %receipt.payment_id, "Returning the open payment attempt.");
      let mut guard = ctx_data.write();
      guard.receipt = Some(receipt);
      guard.reused_existing = true;
      Ok(PipelineControl::Continue)
    }
    Err(e) => Err(e),
  }
}
