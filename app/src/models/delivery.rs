// app/src/models/delivery.rs

use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
  Assigned,
  PickedUp,
  OnTheWay,
  #[serde(alias = "delivered")]
  Completed,
  Cancelled,
}

impl DeliveryStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      DeliveryStatus::Assigned => "assigned",
      DeliveryStatus::PickedUp => "picked_up",
      DeliveryStatus::OnTheWay => "on_the_way",
      DeliveryStatus::Completed => "completed",
      DeliveryStatus::Cancelled => "cancelled",
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, DeliveryStatus::Completed | DeliveryStatus::Cancelled)
  }
}

impl fmt::Display for DeliveryStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DeliveryStatus {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "assigned" => Ok(DeliveryStatus::Assigned),
      "picked_up" => Ok(DeliveryStatus::PickedUp),
      "on_the_way" => Ok(DeliveryStatus::OnTheWay),
      "completed" | "delivered" => Ok(DeliveryStatus::Completed),
      "cancelled" => Ok(DeliveryStatus::Cancelled),
      other => Err(AppError::Internal(format!("unknown delivery status '{}'", other))),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
  pub latitude: f64,
  pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
  pub id: Uuid,
  pub order_id: Uuid,
  pub user_id: Uuid,
  pub driver_name: String,
  pub status: DeliveryStatus,
  pub location: Location,
  /// When the simulated transit ends. Persisted so completion survives restarts.
  pub due_at: DateTime<Utc>,
  pub assigned_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn delivered_is_read_as_completed() {
    let status: DeliveryStatus = serde_json::from_str("\"delivered\"").unwrap();
    assert_eq!(status, DeliveryStatus::Completed);
    assert_eq!("delivered".parse::<DeliveryStatus>().unwrap(), DeliveryStatus::Completed);
    assert_eq!(serde_json::to_string(&status).unwrap(), "\"completed\"");
  }
}
