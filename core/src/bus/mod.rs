// core/src/bus/mod.rs

//! At-least-once event bus abstraction.
//!
//! Messages are appended to a topic partition chosen from their key, so all
//! messages sharing a key (an order id in practice) are delivered in publish
//! order. Each consumer group tracks its own committed offset per partition;
//! anything not committed is delivered again.

pub mod envelope;
pub mod memory;

pub use envelope::Envelope;
pub use memory::InMemoryBus;

use crate::error::CoreResult;
use async_trait::async_trait;
use std::time::Duration;

/// Partition of `key` among `partitions`. Every bus implementation uses this,
/// so a key lands on the same partition whichever backend carries it.
pub fn partition_for_key(key: &str, partitions: u32) -> u32 {
  (fnv1a(key.as_bytes()) % u64::from(partitions.max(1))) as u32
}

fn fnv1a(bytes: &[u8]) -> u64 {
  let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
  for b in bytes {
    hash ^= u64::from(*b);
    hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
  }
  hash
}

/// Location of a message inside the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
  pub topic: String,
  pub partition: u32,
  pub offset: u64,
}

/// A message handed to a consumer group, with its position and how many times
/// the group has now received it (1 on the first delivery).
#[derive(Debug, Clone)]
pub struct Delivery {
  pub envelope: Envelope,
  pub position: Position,
  pub attempt: u32,
}

/// A message a consumer group gave up on.
#[derive(Debug, Clone)]
pub struct DeadLetter {
  pub group: String,
  pub envelope: Envelope,
  pub position: Position,
  pub attempts: u32,
  pub reason: String,
}

#[async_trait]
pub trait EventBus: Send + Sync {
  /// Appends an envelope to its topic. Ordering is guaranteed per key only.
  async fn publish(&self, envelope: Envelope) -> CoreResult<Position>;

  /// Returns, for each partition of `topics`, the oldest message `group` has
  /// not yet committed. At most `max` deliveries are returned.
  ///
  /// Only the head of each partition is handed out, so a message that keeps
  /// failing holds back later messages with the same key until it is
  /// committed or dead-lettered.
  async fn fetch(&self, group: &str, topics: &[String], max: usize) -> CoreResult<Vec<Delivery>>;

  /// Marks everything up to and including `position` as processed by `group`.
  /// Committing an older position than the current one is a no-op.
  async fn commit(&self, group: &str, position: &Position) -> CoreResult<()>;

  /// Records a message `group` will never process. Callers commit it afterwards.
  async fn dead_letter(&self, group: &str, delivery: &Delivery, reason: &str) -> CoreResult<()>;

  /// Waits until something is published or `timeout` elapses.
  async fn wait_for_messages(&self, timeout: Duration);

  /// Whether published messages and committed offsets survive a restart.
  fn is_durable(&self) -> bool {
    false
  }
}
