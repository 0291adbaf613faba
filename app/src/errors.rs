// app/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use tiffin_core::{CoreError, FailureKind};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Cart is empty")]
  EmptyCart,

  #[error("A payment for order {0} is already in progress")]
  DuplicatePayment(Uuid),

  #[error("Cart already holds items from restaurant '{0}'")]
  RestaurantMismatch(String),

  #[error("Webhook signature rejected: {0}")]
  InvalidSignature(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Conflict: {0}")]
  Conflict(String),

  /// An event refers to an order this service has not recorded yet.
  #[error("Order {0} is not known yet")]
  OrderNotReady(Uuid),

  #[error("Event contract violation: {0}")]
  Contract(String),

  #[error("Payment Gateway Error: {0}")]
  Gateway(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Kernel Error: {source}")]
  Core {
    #[from]
    source: CoreError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<sqlx::Error>() {
      Ok(db_err) => AppError::Sqlx(db_err),
      Err(err) => AppError::Internal(err.to_string()),
    }
  }
}

impl AppError {
  /// Stable machine-readable code placed in the `error` field of responses.
  pub fn code(&self) -> &'static str {
    match self {
      AppError::Validation(_) => "validation_error",
      AppError::EmptyCart => "empty_cart",
      AppError::DuplicatePayment(_) => "duplicate_payment",
      AppError::RestaurantMismatch(_) => "restaurant_mismatch",
      AppError::InvalidSignature(_) => "invalid_signature",
      AppError::Auth(_) => "unauthorized",
      AppError::Forbidden(_) => "forbidden",
      AppError::NotFound(_) => "not_found",
      AppError::Conflict(_) => "conflict",
      AppError::OrderNotReady(_) => "order_not_ready",
      AppError::Contract(_) => "contract_violation",
      AppError::Gateway(_) => "gateway_error",
      AppError::Config(_) => "configuration_error",
      AppError::Sqlx(_) => "database_error",
      AppError::Core { .. } => "kernel_error",
      AppError::Internal(_) => "internal_error",
    }
  }
}

impl FailureKind for AppError {
  fn is_transient(&self) -> bool {
    match self {
      AppError::OrderNotReady(_)
      | AppError::Conflict(_)
      | AppError::Gateway(_)
      | AppError::Sqlx(_)
      | AppError::Internal(_) => true,
      AppError::Core { source } => source.is_transient(),
      _ => false,
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_)
      | AppError::EmptyCart
      | AppError::DuplicatePayment(_)
      | AppError::RestaurantMismatch(_)
      | AppError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Conflict(_) | AppError::OrderNotReady(_) => StatusCode::CONFLICT,
      AppError::Contract(_)
      | AppError::Gateway(_)
      | AppError::Config(_)
      | AppError::Sqlx(_)
      | AppError::Core { .. }
      | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    // Infrastructure details stay in the logs.
    let message = if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with server error");
      "An internal error occurred".to_string()
    } else {
      tracing::warn!(application_error = %self, "Responding with client error");
      self.to_string()
    };
    HttpResponse::build(status).json(json!({"error": self.code(), "message": message}))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
