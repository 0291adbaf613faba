// tests/outbox_relay_tests.rs
mod common;

use chrono::Utc;
use common::*;
use parking_lot::Mutex;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tiffin_core::{InMemoryBus, OutboxRelay, OutboxStatus, OutboxTable, RelaySettings, SharedOutbox};

#[derive(Default)]
struct OrdersDb {
  order_ids: Vec<String>,
  outbox: OutboxTable,
}

fn orders_outbox(db: &mut OrdersDb) -> &mut OutboxTable {
  &mut db.outbox
}

fn relay(db: &Arc<Mutex<OrdersDb>>, bus: &Arc<InMemoryBus>, max_attempts: u32) -> OutboxRelay {
  let store = SharedOutbox::new(db.clone(), orders_outbox);
  OutboxRelay::new(
    "orders",
    Arc::new(store),
    bus.clone(),
    RelaySettings {
      worker_id: "relay-test".into(),
      batch_size: 8,
      lease: chrono::Duration::seconds(30),
      max_attempts,
      poll_interval: Duration::from_millis(5),
    },
  )
}

#[tokio::test]
#[serial]
async fn test_state_and_event_written_together_are_published_once() {
  setup_tracing();
  let db = Arc::new(Mutex::new(OrdersDb::default()));
  let bus = Arc::new(InMemoryBus::new(2));
  {
    let mut guard = db.lock();
    guard.order_ids.push("order-1".into());
    guard.outbox.push(order_event("order.created", "order-1"));
  }

  let relay = relay(&db, &bus, 3);
  let report = relay.drain_once(Utc::now()).await.unwrap();
  assert_eq!(report.published, 1);
  let again = relay.drain_once(Utc::now()).await.unwrap();
  assert_eq!(again.claimed, 0);

  assert_eq!(bus.published("order.created").len(), 1);
  assert_eq!(db.lock().outbox.count(OutboxStatus::Published), 1);
}

#[tokio::test]
#[serial]
async fn test_bus_outage_keeps_records_pending_until_recovery() {
  setup_tracing();
  let db = Arc::new(Mutex::new(OrdersDb::default()));
  let bus = Arc::new(InMemoryBus::new(2));
  db.lock().outbox.push(order_event("payment.succeeded", "order-2"));
  let relay = relay(&db, &bus, 5);

  bus.set_available(false);
  let report = relay.drain_once(Utc::now()).await.unwrap();
  assert_eq!(report.released, 1);
  {
    let guard = db.lock();
    assert_eq!(guard.outbox.count(OutboxStatus::Pending), 1);
    assert!(guard.outbox.records()[0].last_error.is_some());
  }

  bus.set_available(true);
  assert_eq!(relay.drain_once(Utc::now()).await.unwrap().published, 1);
  assert_eq!(bus.published("payment.succeeded").len(), 1);
}

#[tokio::test]
#[serial]
async fn test_record_is_marked_failed_after_max_attempts() {
  setup_tracing();
  let db = Arc::new(Mutex::new(OrdersDb::default()));
  let bus = Arc::new(InMemoryBus::new(1));
  db.lock().outbox.push(order_event("delivery.assigned", "order-3"));
  let relay = relay(&db, &bus, 2);

  bus.set_available(false);
  relay.drain_once(Utc::now()).await.unwrap();
  let report = relay.drain_once(Utc::now()).await.unwrap();
  assert_eq!(report.failed, 1);
  assert_eq!(db.lock().outbox.count(OutboxStatus::Failed), 1);

  bus.set_available(true);
  assert_eq!(relay.drain_once(Utc::now()).await.unwrap().claimed, 0);
}

#[tokio::test]
#[serial]
async fn test_records_publish_in_creation_order() {
  setup_tracing();
  let db = Arc::new(Mutex::new(OrdersDb::default()));
  let bus = Arc::new(InMemoryBus::new(1));
  {
    let mut guard = db.lock();
    guard.outbox.push(order_event("order.created", "a"));
    guard.outbox.push(order_event("order.created", "b"));
    guard.outbox.push(order_event("order.created", "c"));
  }
  relay(&db, &bus, 3).drain_once(Utc::now()).await.unwrap();
  let keys: Vec<String> = bus.published("order.created").into_iter().map(|e| e.key).collect();
  assert_eq!(keys, vec!["a", "b", "c"]);
}
