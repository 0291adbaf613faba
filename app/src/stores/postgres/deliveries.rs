// app/src/stores/postgres/deliveries.rs

use super::outbox::{insert_envelopes, PgOutbox};
use crate::errors::Result;
use crate::models::{Delivery, DeliveryStatus, Location};
use crate::stores::DeliveryStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tiffin_core::{Envelope, OutboxStore};
use uuid::Uuid;

const OUTBOX_TABLE: &str = "delivery_outbox";

#[derive(Clone)]
pub struct PgDeliveryStore {
  pool: PgPool,
}

impl PgDeliveryStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

fn delivery_from_row(row: &PgRow) -> Result<Delivery> {
  let status: String = row.try_get("status")?;
  Ok(Delivery {
    id: row.try_get("id")?,
    order_id: row.try_get("order_id")?,
    user_id: row.try_get("user_id")?,
    driver_name: row.try_get("driver_name")?,
    status: status.parse::<DeliveryStatus>()?,
    location: Location {
      latitude: row.try_get("latitude")?,
      longitude: row.try_get("longitude")?,
    },
    due_at: row.try_get("due_at")?,
    assigned_at: row.try_get("assigned_at")?,
    completed_at: row.try_get("completed_at")?,
  })
}

#[async_trait]
impl DeliveryStore for PgDeliveryStore {
  async fn assign_if_absent(&self, delivery: &Delivery, events: Vec<Envelope>) -> Result<bool> {
    let mut tx = self.pool.begin().await?;
    let inserted = sqlx::query(
      "INSERT INTO deliveries \
       (id, order_id, user_id, driver_name, status, latitude, longitude, due_at, assigned_at, completed_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
       ON CONFLICT (order_id) DO NOTHING",
    )
    .bind(delivery.id)
    .bind(delivery.order_id)
    .bind(delivery.user_id)
    .bind(&delivery.driver_name)
    .bind(delivery.status.as_str())
    .bind(delivery.location.latitude)
    .bind(delivery.location.longitude)
    .bind(delivery.due_at)
    .bind(delivery.assigned_at)
    .bind(delivery.completed_at)
    .execute(&mut *tx)
    .await?;
    if inserted.rows_affected() == 0 {
      tx.rollback().await?;
      return Ok(false);
    }
    insert_envelopes(&mut tx, OUTBOX_TABLE, &events).await?;
    tx.commit().await?;
    Ok(true)
  }

  async fn get_for_order(&self, order_id: Uuid) -> Result<Option<Delivery>> {
    let row = sqlx::query("SELECT * FROM deliveries WHERE order_id = $1")
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await?;
    row.as_ref().map(delivery_from_row).transpose()
  }

  async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Delivery>> {
    let rows = sqlx::query(
      "SELECT * FROM deliveries WHERE status NOT IN ('completed', 'cancelled') AND due_at <= $1 \
       ORDER BY due_at LIMIT $2",
    )
    .bind(now)
    .bind(limit as i64)
    .fetch_all(&self.pool)
    .await?;
    rows.iter().map(delivery_from_row).collect()
  }

  async fn complete(&self, order_id: Uuid, at: DateTime<Utc>, events: Vec<Envelope>) -> Result<bool> {
    let mut tx = self.pool.begin().await?;
    let updated = sqlx::query(
      "UPDATE deliveries SET status = 'completed', completed_at = $2 \
       WHERE order_id = $1 AND status NOT IN ('completed', 'cancelled')",
    )
    .bind(order_id)
    .bind(at)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() != 1 {
      tx.rollback().await?;
      return Ok(false);
    }
    insert_envelopes(&mut tx, OUTBOX_TABLE, &events).await?;
    tx.commit().await?;
    Ok(true)
  }

  fn outbox(&self) -> Arc<dyn OutboxStore> {
    Arc::new(PgOutbox::new(self.pool.clone(), OUTBOX_TABLE))
  }
}
