// app/src/pipelines/checkout_pipeline.rs

//! Cart → order checkout. The order row, the cart flip to `ordered` and the
//! `order.created` outbox row are written as one unit by the last step.

use crate::contracts::{DomainEvent, OrderCreated};
use crate::errors::{AppError, Result};
use crate::models::Order;
use crate::pipelines::common_steps;
use crate::pipelines::contexts::CheckoutCtxData;
use tiffin_core::{ContextData, Pipeline, PipelineControl};
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub fn build_checkout_pipeline() -> Pipeline<CheckoutCtxData, AppError> {
  let mut p = Pipeline::<CheckoutCtxData, AppError>::new(&[
    ("load_cart", false, None),
    ("snapshot_order", false, None),
    ("persist_order", false, None),
  ]);

  p.on("load_cart", common_steps::load_active_cart::<CheckoutCtxData>);
  p.on("snapshot_order", snapshot_order);
  p.on("persist_order", persist_order);
  p
}

async fn snapshot_order(ctx_data: ContextData<CheckoutCtxData>) -> Result<PipelineControl> {
  let order = {
    let guard = ctx_data.read();
    let cart = guard
      .cart
      .as_ref()
      .ok_or_else(|| AppError::Internal("checkout reached snapshot without a cart".to_string()))?;
    // A reference still on the cart was reserved for exactly these lines, so it
    // becomes the order id and a later payment.succeeded finds this order.
    Order::from_cart(cart.checkout_ref.unwrap_or_else(Uuid::new_v4), cart)
  };
  ctx_data.write().order = Some(order);
  Ok(PipelineControl::Continue)
}

#[instrument(name = "checkout::persist_order", skip_all, err(Display))]
async fn persist_order(ctx_data: ContextData<CheckoutCtxData>) -> Result<PipelineControl> {
  let (orders, order, cart) = {
    let guard = ctx_data.read();
    (guard.orders.clone(), guard.order.clone(), guard.cart.clone())
  };
  let (Some(order), Some(cart)) = (order, cart) else {
    return Err(AppError::Internal("checkout reached persist without an order".to_string()));
  };

  let envelope = DomainEvent::OrderCreated(OrderCreated::from_order(&order)).to_envelope()?;
  if !orders.place_order(&order, cart.id, cart.version, vec![envelope]).await? {
    warn!(user_id = %order.user_id, cart_id = %cart.id, "Cart changed while checking out.");
    return Err(AppError::Conflict("Cart changed during checkout, please retry".to_string()));
  }

  info!(
    order_id = %order.id,
    user_id = %order.user_id,
    total_amount = order.total_amount,
    "Order placed from cart."
  );
  Ok(PipelineControl::Continue)
}
