// app/src/stores/memory/notifications.rs

use crate::errors::Result;
use crate::models::Notification;
use crate::stores::NotificationStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default, Clone)]
pub struct MemoryNotificationStore {
  rows: Arc<Mutex<Vec<Notification>>>,
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
  async fn insert_if_absent(&self, notification: &Notification) -> Result<bool> {
    let mut rows = self.rows.lock();
    let exists = rows.iter().any(|n| {
      n.user_id == notification.user_id && n.order_id == notification.order_id && n.message == notification.message
    });
    if exists {
      return Ok(false);
    }
    rows.push(notification.clone());
    Ok(true)
  }

  async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>> {
    let rows = self.rows.lock();
    let mut mine: Vec<Notification> = rows.iter().filter(|n| n.user_id == user_id).cloned().collect();
    mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(mine)
  }
}
