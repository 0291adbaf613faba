// core/src/outbox/relay.rs

//! Background worker moving outbox records onto the bus.

use super::store::OutboxStore;
use crate::bus::EventBus;
use crate::error::CoreResult;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct RelaySettings {
  pub worker_id: String,
  pub batch_size: usize,
  /// How long a claimed record stays reserved for this worker.
  pub lease: chrono::Duration,
  /// Publish attempts before a record is marked `Failed`.
  pub max_attempts: u32,
  pub poll_interval: Duration,
}

impl Default for RelaySettings {
  fn default() -> Self {
    Self {
      worker_id: format!("relay-{}", uuid::Uuid::new_v4()),
      batch_size: 32,
      lease: chrono::Duration::seconds(30),
      max_attempts: 10,
      poll_interval: Duration::from_millis(200),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
  pub claimed: usize,
  pub published: usize,
  pub released: usize,
  pub failed: usize,
}

pub struct OutboxRelay {
  name: String,
  store: Arc<dyn OutboxStore>,
  bus: Arc<dyn EventBus>,
  settings: RelaySettings,
}

impl OutboxRelay {
  pub fn new(
    name: impl Into<String>,
    store: Arc<dyn OutboxStore>,
    bus: Arc<dyn EventBus>,
    settings: RelaySettings,
  ) -> Self {
    Self {
      name: name.into(),
      store,
      bus,
      settings,
    }
  }

  /// Claims one batch and publishes it in creation order.
  ///
  /// A record is marked published only after the bus accepted it. If marking
  /// fails after a successful publish, the lease expires and the record is
  /// published again; consumers absorb the duplicate.
  #[instrument(name = "outbox::drain", skip(self, now), fields(relay = %self.name))]
  pub async fn drain_once(&self, now: DateTime<Utc>) -> CoreResult<DrainReport> {
    let batch = self
      .store
      .claim_batch(&self.settings.worker_id, self.settings.batch_size, self.settings.lease, now)
      .await?;
    let mut report = DrainReport {
      claimed: batch.len(),
      ..DrainReport::default()
    };

    for record in batch {
      let topic = record.envelope.topic.clone();
      match self.bus.publish(record.envelope.clone()).await {
        Ok(position) => {
          self.store.mark_published(record.id, Utc::now()).await?;
          debug!(record_id = %record.id, topic = %topic, offset = position.offset, "Outbox record published.");
          report.published += 1;
        }
        Err(e) if record.attempts >= self.settings.max_attempts => {
          error!(record_id = %record.id, topic = %topic, attempts = record.attempts, error = %e, "Giving up on outbox record.");
          self.store.mark_failed(record.id, &e.to_string()).await?;
          report.failed += 1;
        }
        Err(e) => {
          warn!(record_id = %record.id, topic = %topic, attempts = record.attempts, error = %e, "Publish failed, record released.");
          self.store.release(record.id, &e.to_string()).await?;
          report.released += 1;
        }
      }
    }
    Ok(report)
  }

  pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
    info!(relay = %self.name, worker = %self.settings.worker_id, "Outbox relay started.");
    loop {
      if *shutdown.borrow() {
        break;
      }
      let busy = match self.drain_once(Utc::now()).await {
        Ok(report) => report.claimed == self.settings.batch_size && report.released == 0,
        Err(e) => {
          error!(relay = %self.name, error = %e, "Outbox drain failed.");
          false
        }
      };
      if !busy {
        tokio::select! {
          _ = tokio::time::sleep(self.settings.poll_interval) => {}
          _ = shutdown.changed() => {}
        }
      }
    }
    info!(relay = %self.name, "Outbox relay stopped.");
  }
}
