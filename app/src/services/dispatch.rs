// app/src/services/dispatch.rs

use crate::models::Location;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Courier {
  pub driver_name: String,
  pub location: Location,
}

/// Chooses who delivers an order.
pub trait CourierDispatcher: Send + Sync {
  fn assign(&self, order_id: Uuid) -> Courier;
}

/// Round-robin over a fixed roster, every courier starting from the same spot.
pub struct RosterDispatcher {
  drivers: Vec<String>,
  start: Location,
  next: AtomicUsize,
}

impl RosterDispatcher {
  /// An empty roster falls back to a single house courier.
  pub fn new(drivers: Vec<String>, start: Location) -> Self {
    let drivers = if drivers.is_empty() {
      vec!["ServiceEats Delivery".to_string()]
    } else {
      drivers
    };
    Self {
      drivers,
      start,
      next: AtomicUsize::new(0),
    }
  }
}

impl CourierDispatcher for RosterDispatcher {
  fn assign(&self, _order_id: Uuid) -> Courier {
    let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.drivers.len();
    Courier {
      driver_name: self.drivers[idx].clone(),
      location: self.start,
    }
  }
}
