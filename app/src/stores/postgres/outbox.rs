// app/src/stores/postgres/outbox.rs

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tiffin_core::{CoreError, CoreResult, Envelope, OutboxRecord, OutboxStatus, OutboxStore};
use uuid::Uuid;

/// `OutboxStore` over one of the `*_outbox` tables.
#[derive(Clone)]
pub struct PgOutbox {
  pool: PgPool,
  table: &'static str,
}

fn outbox_err(err: sqlx::Error) -> CoreError {
  CoreError::Outbox { source: err.into() }
}

/// Appends `events` inside the caller's transaction.
pub(crate) async fn insert_envelopes(
  tx: &mut Transaction<'_, Postgres>,
  table: &'static str,
  events: &[Envelope],
) -> Result<(), sqlx::Error> {
  let sql = format!(
    "INSERT INTO {} (id, topic, key, schema_version, occurred_at, payload, status, attempts, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, 'pending', 0, $7)",
    table
  );
  for envelope in events {
    sqlx::query(&sql)
      .bind(envelope.id)
      .bind(&envelope.topic)
      .bind(&envelope.key)
      .bind(envelope.schema_version as i16)
      .bind(envelope.occurred_at)
      .bind(&envelope.payload)
      .bind(Utc::now())
      .execute(&mut **tx)
      .await?;
  }
  Ok(())
}

fn record_from_row(row: &PgRow) -> Result<OutboxRecord, sqlx::Error> {
  let status: String = row.try_get("status")?;
  let schema_version: i16 = row.try_get("schema_version")?;
  let attempts: i32 = row.try_get("attempts")?;
  Ok(OutboxRecord {
    id: row.try_get("id")?,
    envelope: Envelope {
      id: row.try_get("id")?,
      topic: row.try_get("topic")?,
      key: row.try_get("key")?,
      schema_version: schema_version as u16,
      occurred_at: row.try_get("occurred_at")?,
      payload: row.try_get("payload")?,
    },
    status: status.parse::<OutboxStatus>().map_err(|e| sqlx::Error::Decode(e.into()))?,
    attempts: attempts.max(0) as u32,
    created_at: row.try_get("created_at")?,
    locked_by: row.try_get("locked_by")?,
    locked_until: row.try_get("locked_until")?,
    published_at: row.try_get("published_at")?,
    last_error: row.try_get("last_error")?,
  })
}

impl PgOutbox {
  pub fn new(pool: PgPool, table: &'static str) -> Self {
    Self { pool, table }
  }
}

#[async_trait]
impl OutboxStore for PgOutbox {
  async fn claim_batch(
    &self,
    worker: &str,
    limit: usize,
    lease: Duration,
    now: DateTime<Utc>,
  ) -> CoreResult<Vec<OutboxRecord>> {
    // SKIP LOCKED lets several relays drain the same table without blocking each other.
    let sql = format!(
      "UPDATE {t} SET status = 'in_flight', attempts = attempts + 1, locked_by = $1, locked_until = $2 \
       WHERE id IN ( \
         SELECT id FROM {t} \
         WHERE status = 'pending' OR (status = 'in_flight' AND locked_until <= $3) \
         ORDER BY created_at \
         LIMIT $4 \
         FOR UPDATE SKIP LOCKED \
       ) RETURNING *",
      t = self.table
    );
    let rows = sqlx::query(&sql)
      .bind(worker)
      .bind(now + lease)
      .bind(now)
      .bind(limit as i64)
      .fetch_all(&self.pool)
      .await
      .map_err(outbox_err)?;
    let mut records = rows
      .iter()
      .map(record_from_row)
      .collect::<Result<Vec<_>, _>>()
      .map_err(outbox_err)?;
    records.sort_by_key(|r| r.created_at);
    Ok(records)
  }

  async fn mark_published(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<()> {
    let sql = format!(
      "UPDATE {} SET status = 'published', published_at = $2, locked_by = NULL, locked_until = NULL, last_error = NULL \
       WHERE id = $1",
      self.table
    );
    sqlx::query(&sql)
      .bind(id)
      .bind(now)
      .execute(&self.pool)
      .await
      .map_err(outbox_err)?;
    Ok(())
  }

  async fn release(&self, id: Uuid, error: &str) -> CoreResult<()> {
    let sql = format!(
      "UPDATE {} SET status = 'pending', locked_by = NULL, locked_until = NULL, last_error = $2 WHERE id = $1",
      self.table
    );
    sqlx::query(&sql)
      .bind(id)
      .bind(error)
      .execute(&self.pool)
      .await
      .map_err(outbox_err)?;
    Ok(())
  }

  async fn mark_failed(&self, id: Uuid, error: &str) -> CoreResult<()> {
    let sql = format!(
      "UPDATE {} SET status = 'failed', locked_by = NULL, locked_until = NULL, last_error = $2 WHERE id = $1",
      self.table
    );
    sqlx::query(&sql)
      .bind(id)
      .bind(error)
      .execute(&self.pool)
      .await
      .map_err(outbox_err)?;
    Ok(())
  }
}
