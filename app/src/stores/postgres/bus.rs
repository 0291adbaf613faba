// app/src/stores/postgres/bus.rs

//! `EventBus` kept in Postgres: an append-only message log with contiguous
//! offsets per topic partition, and one committed-offset row per consumer
//! group and partition. Messages and offsets survive a restart.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tiffin_core::{partition_for_key, CoreError, CoreResult, Delivery, Envelope, EventBus, Position};
use tokio::sync::Notify;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgEventBus {
  pool: PgPool,
  partitions: u32,
  notify: Arc<Notify>,
}

fn bus_err(err: sqlx::Error) -> CoreError {
  CoreError::BusUnavailable(err.to_string())
}

fn to_i64(value: u64) -> CoreResult<i64> {
  i64::try_from(value).map_err(|_| CoreError::Internal(format!("offset {} out of range", value)))
}

fn position_from_row(row: &PgRow) -> Result<Position, sqlx::Error> {
  let part: i32 = row.try_get("part")?;
  let offset: i64 = row.try_get("msg_offset")?;
  Ok(Position {
    topic: row.try_get("topic")?,
    partition: part.max(0) as u32,
    offset: offset.max(0) as u64,
  })
}

impl PgEventBus {
  pub fn new(pool: PgPool, partitions: u32) -> Self {
    Self {
      pool,
      partitions: partitions.max(1),
      notify: Arc::new(Notify::new()),
    }
  }
}

#[async_trait]
impl EventBus for PgEventBus {
  #[instrument(name = "pg_bus::publish", skip_all, fields(topic = %envelope.topic, key = %envelope.key))]
  async fn publish(&self, envelope: Envelope) -> CoreResult<Position> {
    let partition = partition_for_key(&envelope.key, self.partitions);
    let mut tx = self.pool.begin().await.map_err(bus_err)?;
    // The head row stays locked until commit, so offsets become visible in order.
    let offset: i64 = sqlx::query_scalar(
      "INSERT INTO bus_partition_heads (topic, part, next_offset) VALUES ($1, $2, 1) \
       ON CONFLICT (topic, part) DO UPDATE SET next_offset = bus_partition_heads.next_offset + 1 \
       RETURNING next_offset - 1",
    )
    .bind(&envelope.topic)
    .bind(partition as i32)
    .fetch_one(&mut *tx)
    .await
    .map_err(bus_err)?;
    sqlx::query(
      "INSERT INTO bus_messages (topic, part, msg_offset, envelope_id, envelope, published_at) \
       VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&envelope.topic)
    .bind(partition as i32)
    .bind(offset)
    .bind(envelope.id)
    .bind(Json(&envelope))
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .map_err(bus_err)?;
    tx.commit().await.map_err(bus_err)?;

    debug!(partition, offset, "Envelope appended.");
    self.notify.notify_waiters();
    Ok(Position {
      topic: envelope.topic,
      partition,
      offset: offset.max(0) as u64,
    })
  }

  async fn fetch(&self, group: &str, topics: &[String], max: usize) -> CoreResult<Vec<Delivery>> {
    // Heads only: the message sitting exactly at each partition's committed offset.
    let rows = sqlx::query(
      "SELECT m.topic, m.part, m.msg_offset, m.envelope \
       FROM bus_messages m \
       LEFT JOIN bus_offsets o ON o.group_name = $1 AND o.topic = m.topic AND o.part = m.part \
       WHERE m.topic = ANY($2) AND m.msg_offset = COALESCE(o.next_offset, 0) \
       ORDER BY m.seq \
       LIMIT $3",
    )
    .bind(group)
    .bind(topics)
    .bind(to_i64(max as u64)?)
    .fetch_all(&self.pool)
    .await
    .map_err(bus_err)?;

    let mut deliveries = Vec::with_capacity(rows.len());
    for row in &rows {
      let position = position_from_row(row).map_err(bus_err)?;
      let envelope: Json<Envelope> = row.try_get("envelope").map_err(bus_err)?;
      let attempt: i32 = sqlx::query_scalar(
        "INSERT INTO bus_attempts (group_name, topic, part, msg_offset, attempts) VALUES ($1, $2, $3, $4, 1) \
         ON CONFLICT (group_name, topic, part, msg_offset) DO UPDATE SET attempts = bus_attempts.attempts + 1 \
         RETURNING attempts",
      )
      .bind(group)
      .bind(&position.topic)
      .bind(position.partition as i32)
      .bind(to_i64(position.offset)?)
      .fetch_one(&self.pool)
      .await
      .map_err(bus_err)?;
      deliveries.push(Delivery {
        envelope: envelope.0,
        position,
        attempt: attempt.max(1) as u32,
      });
    }
    Ok(deliveries)
  }

  async fn commit(&self, group: &str, position: &Position) -> CoreResult<()> {
    let offset = to_i64(position.offset)?;
    let mut tx = self.pool.begin().await.map_err(bus_err)?;
    sqlx::query(
      "INSERT INTO bus_offsets (group_name, topic, part, next_offset) VALUES ($1, $2, $3, $4) \
       ON CONFLICT (group_name, topic, part) \
       DO UPDATE SET next_offset = GREATEST(bus_offsets.next_offset, EXCLUDED.next_offset)",
    )
    .bind(group)
    .bind(&position.topic)
    .bind(position.partition as i32)
    .bind(offset + 1)
    .execute(&mut *tx)
    .await
    .map_err(bus_err)?;
    sqlx::query("DELETE FROM bus_attempts WHERE group_name = $1 AND topic = $2 AND part = $3 AND msg_offset <= $4")
      .bind(group)
      .bind(&position.topic)
      .bind(position.partition as i32)
      .bind(offset)
      .execute(&mut *tx)
      .await
      .map_err(bus_err)?;
    tx.commit().await.map_err(bus_err)
  }

  async fn dead_letter(&self, group: &str, delivery: &Delivery, reason: &str) -> CoreResult<()> {
    warn!(
      group,
      topic = %delivery.position.topic,
      offset = delivery.position.offset,
      reason,
      "Dead-lettering message."
    );
    sqlx::query(
      "INSERT INTO bus_dead_letters (id, group_name, topic, part, msg_offset, envelope, attempts, reason, created_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(Uuid::new_v4())
    .bind(group)
    .bind(&delivery.position.topic)
    .bind(delivery.position.partition as i32)
    .bind(to_i64(delivery.position.offset)?)
    .bind(Json(&delivery.envelope))
    .bind(i32::try_from(delivery.attempt).unwrap_or(i32::MAX))
    .bind(reason)
    .bind(Utc::now())
    .execute(&self.pool)
    .await
    .map_err(bus_err)?;
    Ok(())
  }

  /// Wakes early for publishes from this process; other writers are picked
  /// up on the next poll.
  async fn wait_for_messages(&self, timeout: Duration) {
    let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
  }

  fn is_durable(&self) -> bool {
    true
  }
}
