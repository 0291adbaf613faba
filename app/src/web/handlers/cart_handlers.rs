// app/src/web/handlers/cart_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::models::NewCartItem;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug)]
pub struct UpdateQuantityPayload {
  pub quantity: i32,
}

#[instrument(name = "handler::get_cart", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn get_cart_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let cart = app_state.orders.get_cart(auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "cart": cart })))
}

#[instrument(
  name = "handler::add_cart_item",
  skip(app_state, payload, auth_user),
  fields(user_id = %auth_user.user_id, menu_item_id = %payload.menu_item_id, quantity = payload.quantity)
)]
pub async fn add_item_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<NewCartItem>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let cart = app_state.orders.add_item(auth_user.user_id, payload.into_inner()).await?;
  info!(cart_id = %cart.id, total = cart.total_amount, "Item added to cart.");
  Ok(HttpResponse::Ok().json(json!({ "cart": cart })))
}

#[instrument(
  name = "handler::update_cart_item",
  skip(app_state, payload, auth_user),
  fields(user_id = %auth_user.user_id, menu_item_id = %menu_item_id, quantity = payload.quantity)
)]
pub async fn update_item_handler(
  app_state: web::Data<AppState>,
  menu_item_id: web::Path<String>,
  payload: web::Json<UpdateQuantityPayload>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let cart = app_state
    .orders
    .update_item(auth_user.user_id, &menu_item_id, payload.quantity)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "cart": cart })))
}

#[instrument(
  name = "handler::remove_cart_item",
  skip(app_state, auth_user),
  fields(user_id = %auth_user.user_id, menu_item_id = %menu_item_id)
)]
pub async fn remove_item_handler(
  app_state: web::Data<AppState>,
  menu_item_id: web::Path<String>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let cart = app_state.orders.remove_item(auth_user.user_id, &menu_item_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "cart": cart })))
}

#[instrument(name = "handler::clear_cart", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn clear_cart_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  app_state.orders.clear_cart(auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "message": "Cart cleared" })))
}

#[instrument(name = "handler::checkout", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn checkout_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order = app_state.orders.checkout(auth_user.user_id).await?;
  info!(order_id = %order.id, total = order.total_amount, "Checkout completed.");
  Ok(HttpResponse::Created().json(json!({ "order": order })))
}
