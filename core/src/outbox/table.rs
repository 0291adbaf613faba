// core/src/outbox/table.rs
use super::record::{OutboxRecord, OutboxStatus};
use crate::bus::Envelope;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Plain in-memory outbox.
///
/// Meant to live inside the same locked struct as a service's own tables, so
/// that a state change and its outbox row are written under one lock.
/// Published records are dropped once acknowledged; only their count is kept.
#[derive(Debug, Default, Clone)]
pub struct OutboxTable {
  records: Vec<OutboxRecord>,
  published: usize,
}

impl OutboxTable {
  pub fn push(&mut self, envelope: Envelope) -> Uuid {
    let record = OutboxRecord::new(envelope);
    let id = record.id;
    self.records.push(record);
    id
  }

  /// Claims up to `limit` records in creation order.
  pub fn claim_batch(&mut self, worker: &str, limit: usize, lease: Duration, now: DateTime<Utc>) -> Vec<OutboxRecord> {
    let mut claimed = Vec::new();
    for record in self.records.iter_mut() {
      if claimed.len() >= limit {
        break;
      }
      if record.is_claimable(now) {
        record.claim(worker, lease, now);
        claimed.push(record.clone());
      }
    }
    claimed
  }

  pub fn mark_published(&mut self, id: Uuid, now: DateTime<Utc>) -> bool {
    let Some(idx) = self.records.iter().position(|r| r.id == id) else {
      return false;
    };
    let mut record = self.records.remove(idx);
    record.complete(now);
    self.published += 1;
    true
  }

  pub fn release(&mut self, id: Uuid, error: &str) -> bool {
    self.find_mut(id).map(|r| r.release(error)).is_some()
  }

  pub fn mark_failed(&mut self, id: Uuid, error: &str) -> bool {
    self.find_mut(id).map(|r| r.fail(error)).is_some()
  }

  /// Records not yet published, in creation order.
  pub fn records(&self) -> &[OutboxRecord] {
    &self.records
  }

  pub fn count(&self, status: OutboxStatus) -> usize {
    match status {
      OutboxStatus::Published => self.published,
      other => self.records.iter().filter(|r| r.status == other).count(),
    }
  }

  fn find_mut(&mut self, id: Uuid) -> Option<&mut OutboxRecord> {
    self.records.iter_mut().find(|r| r.id == id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn envelope(n: u32) -> Envelope {
    Envelope::encode("order.created", format!("order-{}", n), 1, &json!({ "n": n })).unwrap()
  }

  #[test]
  fn published_records_are_compacted_away() {
    let mut table = OutboxTable::default();
    let now = Utc::now();
    for round in 0..50u32 {
      table.push(envelope(round));
      let claimed = table.claim_batch("relay-1", 10, Duration::seconds(30), now);
      assert_eq!(claimed.len(), 1);
      assert!(table.mark_published(claimed[0].id, now));
    }
    assert!(table.records().is_empty());
    assert_eq!(table.count(OutboxStatus::Published), 50);
    assert!(!table.mark_published(Uuid::new_v4(), now));
  }

  #[test]
  fn claims_skip_to_unpublished_records() {
    let mut table = OutboxTable::default();
    let now = Utc::now();
    let first = table.push(envelope(1));
    let second = table.push(envelope(2));
    let batch = table.claim_batch("relay-1", 1, Duration::seconds(30), now);
    assert_eq!(batch[0].id, first);
    table.mark_published(first, now);

    let batch = table.claim_batch("relay-1", 5, Duration::seconds(30), now);
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, second);
    assert_eq!(table.records().len(), 1);
    assert_eq!(table.count(OutboxStatus::InFlight), 1);
  }
}
