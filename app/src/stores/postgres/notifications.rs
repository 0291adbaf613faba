// app/src/stores/postgres/notifications.rs

use crate::errors::Result;
use crate::models::Notification;
use crate::stores::NotificationStore;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgNotificationStore {
  pool: PgPool,
}

impl PgNotificationStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
  async fn insert_if_absent(&self, notification: &Notification) -> Result<bool> {
    let result = sqlx::query(
      "INSERT INTO notifications (id, user_id, order_id, message, created_at) VALUES ($1, $2, $3, $4, $5) \
       ON CONFLICT (user_id, order_id, message) DO NOTHING",
    )
    .bind(notification.id)
    .bind(notification.user_id)
    .bind(notification.order_id)
    .bind(&notification.message)
    .bind(notification.created_at)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>> {
    let rows = sqlx::query("SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC")
      .bind(user_id)
      .fetch_all(&self.pool)
      .await?;
    rows
      .iter()
      .map(|row| -> Result<Notification> {
        Ok(Notification {
          id: row.try_get("id")?,
          user_id: row.try_get("user_id")?,
          order_id: row.try_get("order_id")?,
          message: row.try_get("message")?,
          created_at: row.try_get("created_at")?,
        })
      })
      .collect()
  }
}
