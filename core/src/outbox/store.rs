// core/src/outbox/store.rs
use super::record::OutboxRecord;
use super::table::OutboxTable;
use crate::error::CoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Storage side of the relay. Implementations must make `claim_batch` atomic
/// so two relays never publish the same record concurrently under a live lease.
#[async_trait]
pub trait OutboxStore: Send + Sync {
  async fn claim_batch(
    &self,
    worker: &str,
    limit: usize,
    lease: Duration,
    now: DateTime<Utc>,
  ) -> CoreResult<Vec<OutboxRecord>>;

  async fn mark_published(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<()>;

  async fn release(&self, id: Uuid, error: &str) -> CoreResult<()>;

  async fn mark_failed(&self, id: Uuid, error: &str) -> CoreResult<()>;
}

/// Adapts any lock-protected struct holding an `OutboxTable` into an `OutboxStore`.
pub struct SharedOutbox<T: Send + 'static> {
  inner: Arc<Mutex<T>>,
  project: fn(&mut T) -> &mut OutboxTable,
}

impl<T: Send + 'static> SharedOutbox<T> {
  pub fn new(inner: Arc<Mutex<T>>, project: fn(&mut T) -> &mut OutboxTable) -> Self {
    Self { inner, project }
  }

  fn with<R>(&self, f: impl FnOnce(&mut OutboxTable) -> R) -> R {
    let mut guard = self.inner.lock();
    f((self.project)(&mut guard))
  }
}

#[async_trait]
impl<T: Send + 'static> OutboxStore for SharedOutbox<T> {
  async fn claim_batch(
    &self,
    worker: &str,
    limit: usize,
    lease: Duration,
    now: DateTime<Utc>,
  ) -> CoreResult<Vec<OutboxRecord>> {
    Ok(self.with(|t| t.claim_batch(worker, limit, lease, now)))
  }

  async fn mark_published(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<()> {
    self.with(|t| t.mark_published(id, now));
    Ok(())
  }

  async fn release(&self, id: Uuid, error: &str) -> CoreResult<()> {
    self.with(|t| t.release(id, error));
    Ok(())
  }

  async fn mark_failed(&self, id: Uuid, error: &str) -> CoreResult<()> {
    self.with(|t| t.mark_failed(id, error));
    Ok(())
  }
}
