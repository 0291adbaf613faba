// app/src/stores/postgres/payments.rs

use super::is_unique_violation;
use super::outbox::{insert_envelopes, PgOutbox};
use crate::errors::{AppError, Result};
use crate::models::{Payment, PaymentState, Provider};
use crate::stores::{PaymentStore, PaymentTransition};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tiffin_core::{Envelope, OutboxStore};
use uuid::Uuid;

const OUTBOX_TABLE: &str = "payment_outbox";

#[derive(Clone)]
pub struct PgPaymentStore {
  pool: PgPool,
}

impl PgPaymentStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

fn payment_from_row(row: &PgRow) -> Result<Payment> {
  let provider: String = row.try_get("provider")?;
  let status: String = row.try_get("status")?;
  Ok(Payment {
    id: row.try_get("id")?,
    order_id: row.try_get("order_id")?,
    user_id: row.try_get("user_id")?,
    amount: row.try_get("amount")?,
    currency: row.try_get("currency")?,
    payment_method: row.try_get("payment_method")?,
    provider: provider.parse::<Provider>()?,
    provider_payment_id: row.try_get("provider_payment_id")?,
    client_secret: row.try_get("client_secret")?,
    status: status.parse::<PaymentState>()?,
    failure_reason: row.try_get("failure_reason")?,
    charge_id: row.try_get("charge_id")?,
    gateway_response: row.try_get("gateway_response")?,
    created_at: row.try_get("created_at")?,
    updated_at: row.try_get("updated_at")?,
  })
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
  async fn insert_payment(&self, payment: &Payment, events: Vec<Envelope>) -> Result<()> {
    let mut tx = self.pool.begin().await?;
    let inserted = sqlx::query(
      "INSERT INTO payments \
       (id, order_id, user_id, amount, currency, payment_method, provider, provider_payment_id, client_secret, \
        status, failure_reason, charge_id, gateway_response, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(payment.id)
    .bind(payment.order_id)
    .bind(payment.user_id)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(&payment.payment_method)
    .bind(payment.provider.as_str())
    .bind(&payment.provider_payment_id)
    .bind(&payment.client_secret)
    .bind(payment.status.as_str())
    .bind(&payment.failure_reason)
    .bind(&payment.charge_id)
    .bind(&payment.gateway_response)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(&mut *tx)
    .await;
    match inserted {
      Ok(_) => {}
      // The partial unique index on open payments per order is the race-free guard.
      Err(e) if is_unique_violation(&e) => return Err(AppError::DuplicatePayment(payment.order_id)),
      Err(e) => return Err(e.into()),
    }
    insert_envelopes(&mut tx, OUTBOX_TABLE, &events).await?;
    tx.commit().await?;
    Ok(())
  }

  async fn latest_for_order(&self, order_id: Uuid) -> Result<Option<Payment>> {
    let row = sqlx::query("SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at DESC LIMIT 1")
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await?;
    row.as_ref().map(payment_from_row).transpose()
  }

  async fn find_by_provider_id(&self, provider_payment_id: &str) -> Result<Option<Payment>> {
    let row = sqlx::query("SELECT * FROM payments WHERE provider_payment_id = $1")
      .bind(provider_payment_id)
      .fetch_optional(&self.pool)
      .await?;
    row.as_ref().map(payment_from_row).transpose()
  }

  async fn apply_transition(&self, transition: &PaymentTransition, events: Vec<Envelope>) -> Result<bool> {
    let mut tx = self.pool.begin().await?;
    let updated = sqlx::query(
      "UPDATE payments SET status = $2, failure_reason = $3, charge_id = $4, gateway_response = $5, updated_at = $6 \
       WHERE id = $1 AND status IN ('pending', 'processing')",
    )
    .bind(transition.payment_id)
    .bind(transition.to.as_str())
    .bind(&transition.failure_reason)
    .bind(&transition.charge_id)
    .bind(&transition.gateway_response)
    .bind(transition.at)
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
