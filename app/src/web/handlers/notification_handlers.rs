// app/src/web/handlers/notification_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::instrument;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[instrument(name = "handler::list_notifications", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn list_notifications_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let notifications = app_state
    .notifications
    .list_for_user(auth_user.user_id, auth_user.user_id)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "notifications": notifications })))
}
