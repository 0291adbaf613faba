// app/src/pipelines/common_steps.rs

//! Steps shared by more than one pipeline.

use crate::errors::{AppError, Result};
use crate::pipelines::contexts::CartScope;
use tiffin_core::{ContextData, PipelineControl};
use tracing::{debug, instrument};

/// Loads the caller's active cart; an absent or empty cart is `EmptyCart`.
#[instrument(name = "common_step::load_active_cart", skip_all, err(Display))]
pub async fn load_active_cart<T>(ctx_data: ContextData<T>) -> Result<PipelineControl>
where
  T: CartScope + Send + Sync + 'static,
{
  let (orders, user_id) = {
    let guard = ctx_data.read();
    (guard.orders(), guard.user_id())
  };
  let cart = orders
    .active_cart(user_id)
    .await?
    .filter(|cart| !cart.is_empty())
    .ok_or(AppError::EmptyCart)?;
  debug!(%user_id, cart_id = %cart.id, items = cart.items.len(), "Active cart loaded.");
  ctx_data.write().set_cart(cart);
  Ok(PipelineControl::Continue)
}
