// core/src/bus/memory.rs

//! In-process `EventBus` with partitioned topics and per-group offsets.

use super::{partition_for_key, DeadLetter, Delivery, Envelope, EventBus, Position};
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, instrument, warn};

type PartitionKey = (String, u32);

#[derive(Default)]
struct BusState {
  /// topic -> partitions -> (global sequence, envelope)
  topics: HashMap<String, Vec<Vec<(u64, Envelope)>>>,
  /// (group, topic, partition) -> next offset to deliver
  committed: HashMap<(String, String, u32), u64>,
  /// (group, position) -> times delivered so far
  attempts: HashMap<(String, Position), u32>,
  dead_letters: Vec<DeadLetter>,
  next_sequence: u64,
}

/// Bus kept entirely in memory. Used by tests and by single-process deployments.
///
/// Messages are never dropped: committing only moves a group's offset, so a
/// group subscribing late still sees the full history of a topic.
pub struct InMemoryBus {
  partitions: u32,
  state: Mutex<BusState>,
  available: Mutex<bool>,
  notify: Notify,
}

impl InMemoryBus {
  pub fn new(partitions: u32) -> Self {
    Self {
      partitions: partitions.max(1),
      state: Mutex::new(BusState::default()),
      available: Mutex::new(true),
      notify: Notify::new(),
    }
  }

  pub fn partition_for(&self, key: &str) -> u32 {
    partition_for_key(key, self.partitions)
  }

  /// Simulates a broker outage: while unavailable, `publish` fails.
  pub fn set_available(&self, available: bool) {
    *self.available.lock() = available;
  }

  /// Every envelope published to `topic`, in publish order.
  pub fn published(&self, topic: &str) -> Vec<Envelope> {
    let state = self.state.lock();
    let mut all: Vec<(u64, Envelope)> = state
      .topics
      .get(topic)
      .map(|parts| parts.iter().flatten().cloned().collect())
      .unwrap_or_default();
    all.sort_by_key(|(seq, _)| *seq);
    all.into_iter().map(|(_, env)| env).collect()
  }

  pub fn dead_letters(&self) -> Vec<DeadLetter> {
    self.state.lock().dead_letters.clone()
  }

  /// Messages on `topics` that `group` has not committed yet.
  pub fn lag(&self, group: &str, topics: &[String]) -> u64 {
    let state = self.state.lock();
    let mut lag = 0;
    for topic in topics {
      let Some(parts) = state.topics.get(topic) else {
        continue;
      };
      for (idx, part) in parts.iter().enumerate() {
        let next = state
          .committed
          .get(&(group.to_string(), topic.clone(), idx as u32))
          .copied()
          .unwrap_or(0);
        lag += (part.len() as u64).saturating_sub(next);
      }
    }
    lag
  }
}

impl Default for InMemoryBus {
  fn default() -> Self {
    Self::new(4)
  }
}

#[async_trait]
impl EventBus for InMemoryBus {
  #[instrument(name = "bus::publish", skip_all, fields(topic = %envelope.topic, key = %envelope.key))]
  async fn publish(&self, envelope: Envelope) -> CoreResult<Position> {
    if !*self.available.lock() {
      warn!("Publish rejected, bus marked unavailable.");
      return Err(CoreError::BusUnavailable("in-memory bus is offline".to_string()));
    }
    let partition = self.partition_for(&envelope.key);
    let position = {
      let mut state = self.state.lock();
      let seq = state.next_sequence;
      state.next_sequence += 1;
      let partitions = self.partitions as usize;
      let parts = state
        .topics
        .entry(envelope.topic.clone())
        .or_insert_with(|| vec![Vec::new(); partitions]);
      let part = &mut parts[partition as usize];
      let offset = part.len() as u64;
      let topic = envelope.topic.clone();
      part.push((seq, envelope));
      Position {
        topic,
        partition,
        offset,
      }
    };
    debug!(partition, offset = position.offset, "Envelope appended.");
    self.notify.notify_waiters();
    Ok(position)
  }

  async fn fetch(&self, group: &str, topics: &[String], max: usize) -> CoreResult<Vec<Delivery>> {
    let mut state = self.state.lock();
    let mut heads: Vec<(u64, PartitionKey, u64, Envelope)> = Vec::new();
    for topic in topics {
      let Some(parts) = state.topics.get(topic) else {
        continue;
      };
      for (idx, part) in parts.iter().enumerate() {
        let next = state
          .committed
          .get(&(group.to_string(), topic.clone(), idx as u32))
          .copied()
          .unwrap_or(0);
        if let Some((seq, env)) = part.get(next as usize) {
          heads.push((*seq, (topic.clone(), idx as u32), next, env.clone()));
        }
      }
    }
    // Oldest first across partitions, so causally earlier events on other keys are not starved.
    heads.sort_by_key(|(seq, ..)| *seq);
    heads.truncate(max);

    let mut deliveries = Vec::with_capacity(heads.len());
    for (_, (topic, partition), offset, envelope) in heads {
      let position = Position {
        topic,
        partition,
        offset,
      };
      let attempt = state.attempts.entry((group.to_string(), position.clone())).or_insert(0);
      *attempt += 1;
      deliveries.push(Delivery {
        envelope,
        position,
        attempt: *attempt,
      });
    }
    Ok(deliveries)
  }

  async fn commit(&self, group: &str, position: &Position) -> CoreResult<()> {
    let mut state = self.state.lock();
    let key = (group.to_string(), position.topic.clone(), position.partition);
    let next = position.offset + 1;
    let entry = state.committed.entry(key).or_insert(0);
    if next > *entry {
      *entry = next;
    }
    state.attempts.remove(&(group.to_string(), position.clone()));
    Ok(())
  }

  async fn dead_letter(&self, group: &str, delivery: &Delivery, reason: &str) -> CoreResult<()> {
    warn!(
      group,
      topic = %delivery.position.topic,
      offset = delivery.position.offset,
      reason,
      "Dead-lettering message."
    );
    self.state.lock().dead_letters.push(DeadLetter {
      group: group.to_string(),
      envelope: delivery.envelope.clone(),
      position: delivery.position.clone(),
      attempts: delivery.attempt,
      reason: reason.to_string(),
    });
    Ok(())
  }

  async fn wait_for_messages(&self, timeout: Duration) {
    let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn env(topic: &str, key: &str, n: i64) -> Envelope {
    Envelope::encode(topic, key, 1, &json!({ "n": n })).unwrap()
  }

  #[tokio::test]
  async fn uncommitted_head_is_redelivered_and_blocks_its_partition() {
    let bus = InMemoryBus::new(1);
    bus.publish(env("t", "k", 1)).await.unwrap();
    bus.publish(env("t", "k", 2)).await.unwrap();
    let topics = vec!["t".to_string()];

    let first = bus.fetch("g", &topics, 10).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].attempt, 1);

    let again = bus.fetch("g", &topics, 10).await.unwrap();
    assert_eq!(again[0].envelope.id, first[0].envelope.id);
    assert_eq!(again[0].attempt, 2);

    bus.commit("g", &again[0].position).await.unwrap();
    let next = bus.fetch("g", &topics, 10).await.unwrap();
    assert_eq!(next[0].envelope.payload["n"], json!(2));
    assert_eq!(next[0].attempt, 1);
  }

  #[tokio::test]
  async fn groups_track_offsets_independently_and_commits_are_monotonic() {
    let bus = InMemoryBus::new(2);
    let p1 = bus.publish(env("t", "a", 1)).await.unwrap();
    let p2 = bus.publish(env("t", "a", 2)).await.unwrap();
    let topics = vec!["t".to_string()];

    bus.commit("orders", &p2).await.unwrap();
    bus.commit("orders", &p1).await.unwrap();
    assert_eq!(bus.lag("orders", &topics), 0);
    assert_eq!(bus.lag("delivery", &topics), 2);
  }

  #[tokio::test]
  async fn same_key_lands_on_same_partition() {
    let bus = InMemoryBus::new(8);
    let a = bus.publish(env("t", "order-42", 1)).await.unwrap();
    let b = bus.publish(env("t", "order-42", 2)).await.unwrap();
    assert_eq!(a.partition, b.partition);
    assert_eq!(b.offset, a.offset + 1);
    assert_eq!(a.partition, partition_for_key("order-42", 8));
    assert!(!bus.is_durable());
  }

  #[tokio::test]
  async fn offline_bus_rejects_publish() {
    let bus = InMemoryBus::default();
    bus.set_available(false);
    let err = bus.publish(env("t", "k", 1)).await.unwrap_err();
    assert!(matches!(err, CoreError::BusUnavailable(_)));
    assert!(bus.published("t").is_empty());
  }
}
