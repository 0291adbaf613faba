// app/src/web/handlers/delivery_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

/// 404 until a courier is assigned.
#[instrument(name = "handler::get_delivery", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn get_delivery_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let delivery = app_state.deliveries.get_for_order(order_id.into_inner()).await?;
  if delivery.user_id != auth_user.user_id {
    return Err(AppError::Forbidden("Delivery belongs to another user".to_string()));
  }
  Ok(HttpResponse::Ok().json(delivery))
}
