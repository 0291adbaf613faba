// app/src/stores/memory/payments.rs

use crate::errors::{AppError, Result};
use crate::models::Payment;
use crate::stores::{PaymentStore, PaymentTransition};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tiffin_core::{Envelope, OutboxStore, OutboxTable, SharedOutbox};
use uuid::Uuid;

#[derive(Default)]
pub struct PaymentsDb {
  payments: Vec<Payment>,
  outbox: OutboxTable,
}

fn payments_outbox(db: &mut PaymentsDb) -> &mut OutboxTable {
  &mut db.outbox
}

#[derive(Default, Clone)]
pub struct MemoryPaymentStore {
  db: Arc<Mutex<PaymentsDb>>,
}

impl MemoryPaymentStore {
  pub fn payments_for_order(&self, order_id: Uuid) -> Vec<Payment> {
    self
      .db
      .lock()
      .payments
      .iter()
      .filter(|p| p.order_id == order_id)
      .cloned()
      .collect()
  }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
  async fn insert_payment(&self, payment: &Payment, events: Vec<Envelope>) -> Result<()> {
    let mut db = self.db.lock();
    let blocked = db
      .payments
      .iter()
      .any(|p| p.order_id == payment.order_id && p.status.blocks_new_attempt());
    if blocked {
      return Err(AppError::DuplicatePayment(payment.order_id));
    }
    db.payments.push(payment.clone());
    for envelope in events {
      db.outbox.push(envelope);
    }
    Ok(())
  }

  async fn latest_for_order(&self, order_id: Uuid) -> Result<Option<Payment>> {
    let db = self.db.lock();
    Ok(
      db.payments
        .iter()
        .filter(|p| p.order_id == order_id)
        .max_by_key(|p| p.created_at)
        .cloned(),
    )
  }

  async fn find_by_provider_id(&self, provider_payment_id: &str) -> Result<Option<Payment>> {
    let db = self.db.lock();
    Ok(
      db.payments
        .iter()
        .find(|p| p.provider_payment_id == provider_payment_id)
        .cloned(),
    )
  }

  async fn apply_transition(&self, transition: &PaymentTransition, events: Vec<Envelope>) -> Result<bool> {
    let mut db = self.db.lock();
    let Some(payment) = db.payments.iter_mut().find(|p| p.id == transition.payment_id) else {
      return Ok(false);
    };
    if !payment.status.accepts_transition() {
      return Ok(false);
    }
    payment.status = transition.to;
    payment.failure_reason = transition.failure_reason.clone();
    payment.charge_id = transition.charge_id.clone();
    payment.gateway_response = Some(transition.gateway_response.clone());
    payment.updated_at = transition.at;
    for envelope in events {
      db.outbox.push(envelope);
    }
    Ok(true)
  }

  fn outbox(&self) -> Arc<dyn OutboxStore> {
    Arc::new(SharedOutbox::new(self.db.clone(), payments_outbox))
  }
}
