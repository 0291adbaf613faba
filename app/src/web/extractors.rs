// app/src/web/extractors.rs

use crate::errors::AppError;
use crate::state::AppState;
use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

/// The caller identified by a verified `Authorization: Bearer` token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
  pub user_id: Uuid,
  /// Forwarded when the deferred flow calls the payment service over HTTP.
  pub token: String,
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
  req
    .headers()
    .get(header::AUTHORIZATION)
    .and_then(|value| value.to_str().ok())
    .and_then(|value| value.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|token| !token.is_empty())
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = futures_util::future::Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let Some(state) = req.app_data::<web::Data<AppState>>() else {
      return futures_util::future::ready(Err(AppError::Internal("application state is not registered".to_string())));
    };
    let Some(token) = bearer_token(req) else {
      warn!(path = %req.path(), "Request without bearer token.");
      return futures_util::future::ready(Err(AppError::Auth("Bearer token required.".to_string())));
    };
    let result = state.tokens.verify(token, Utc::now()).map(|user_id| AuthenticatedUser {
      user_id,
      token: token.to_string(),
    });
    futures_util::future::ready(result)
  }
}
