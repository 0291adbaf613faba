// app/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentPayload {
  #[serde(default)]
  pub payment_method: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct PageQuery {
  pub page: Option<u32>,
  pub limit: Option<u32>,
}

/// Deferred checkout: the body is optional and only carries the payment method.
#[instrument(name = "handler::process_payment", skip(app_state, payload, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn process_payment_handler(
  app_state: web::Data<AppState>,
  payload: Option<web::Json<ProcessPaymentPayload>>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let payment_method = payload.map(web::Json::into_inner).unwrap_or_default().payment_method;
  let initiation = app_state
    .orders
    .process_payment(auth_user.user_id, &auth_user.token, payment_method)
    .await?;
  info!(order_id = %initiation.order_id, payment_id = %initiation.payment_id, "Payment initiated for cart.");
  Ok(HttpResponse::Ok().json(initiation))
}

#[instrument(name = "handler::get_order", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let order = app_state.orders.get_order(auth_user.user_id, order_id.into_inner()).await?;
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::list_own_orders", skip(app_state, query, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn list_own_orders_handler(
  app_state: web::Data<AppState>,
  query: web::Query<PageQuery>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let page = app_state
    .orders
    .orders_for_user(auth_user.user_id, auth_user.user_id, query.page, query.limit)
    .await?;
  Ok(HttpResponse::Ok().json(page))
}

#[instrument(name = "handler::list_user_orders", skip(app_state, query, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn list_user_orders_handler(
  app_state: web::Data<AppState>,
  user_id: web::Path<Uuid>,
  query: web::Query<PageQuery>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let page = app_state
    .orders
    .orders_for_user(auth_user.user_id, user_id.into_inner(), query.page, query.limit)
    .await?;
  Ok(HttpResponse::Ok().json(page))
}
