// app/src/models/notification.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DELIVERED_MESSAGE: &str = "Your order has been delivered";

/// Immutable log entry. `(user_id, order_id, message)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub id: Uuid,
  pub user_id: Uuid,
  pub order_id: Uuid,
  pub message: String,
  pub created_at: DateTime<Utc>,
}

impl Notification {
  pub fn new(user_id: Uuid, order_id: Uuid, message: &str) -> Self {
    Self {
      id: Uuid::new_v4(),
      user_id,
      order_id,
      message: message.to_string(),
      created_at: Utc::now(),
    }
  }
}
