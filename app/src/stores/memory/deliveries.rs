// app/src/stores/memory/deliveries.rs

use crate::errors::Result;
use crate::models::{Delivery, DeliveryStatus};
use crate::stores::DeliveryStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tiffin_core::{Envelope, OutboxStore, OutboxTable, SharedOutbox};
use uuid::Uuid;

#[derive(Default)]
pub struct DeliveriesDb {
  by_order: HashMap<Uuid, Delivery>,
  outbox: OutboxTable,
}

fn deliveries_outbox(db: &mut DeliveriesDb) -> &mut OutboxTable {
  &mut db.outbox
}

#[derive(Default, Clone)]
pub struct MemoryDeliveryStore {
  db: Arc<Mutex<DeliveriesDb>>,
}

impl MemoryDeliveryStore {
  pub fn delivery_count(&self) -> usize {
    self.db.lock().by_order.len()
  }
}

#[async_trait]
impl DeliveryStore for MemoryDeliveryStore {
  async fn assign_if_absent(&self, delivery: &Delivery, events: Vec<Envelope>) -> Result<bool> {
    let mut db = self.db.lock();
    if db.by_order.contains_key(&delivery.order_id) {
      return Ok(false);
    }
    db.by_order.insert(delivery.order_id, delivery.clone());
    for envelope in events {
      db.outbox.push(envelope);
    }
    Ok(true)
  }

  async fn get_for_order(&self, order_id: Uuid) -> Result<Option<Delivery>> {
    Ok(self.db.lock().by_order.get(&order_id).cloned())
  }

  async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Delivery>> {
    let db = self.db.lock();
    let mut due: Vec<Delivery> = db
      .by_order
      .values()
      .filter(|d| !d.status.is_terminal() && d.due_at <= now)
      .cloned()
      .collect();
    due.sort_by_key(|d| d.due_at);
    due.truncate(limit);
    Ok(due)
  }

  async fn complete(&self, order_id: Uuid, at: DateTime<Utc>, events: Vec<Envelope>) -> Result<bool> {
    let mut db = self.db.lock();
    match db.by_order.get_mut(&order_id) {
      Some(delivery) if !delivery.status.is_terminal() => {
        delivery.status = DeliveryStatus::Completed;
        delivery.completed_at = Some(at);
        for envelope in events {
          db.outbox.push(envelope);
        }
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  fn outbox(&self) -> Arc<dyn OutboxStore> {
    Arc::new(SharedOutbox::new(self.db.clone(), deliveries_outbox))
  }
}
