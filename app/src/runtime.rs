// app/src/runtime.rs

//! Wires stores, services, outbox relays and consumers into one process.

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::models::Location;
use crate::services::{
  DeliveryService, HttpInitiator, InProcessInitiator, MockGateway, NotificationService, OrderService,
  PaymentGateway, PaymentInitiator, PaymentService, PaymentSettings, RosterDispatcher, StripeGateway, TokenSigner,
};
use crate::state::AppState;
use crate::stores::Stores;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tiffin_core::{Consumer, ConsumerSettings, EventBus, OutboxRelay, RelaySettings};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Rounds `settle` runs before giving up on reaching quiescence.
const SETTLE_ROUNDS: usize = 64;

/// Background work of this process: outbox relays, consumers and the delivery sweep.
pub struct Workers {
  relays: Vec<OutboxRelay>,
  consumers: Vec<Consumer<AppError>>,
  sweep: Option<(Arc<DeliveryService>, Duration)>,
}

impl Workers {
  pub fn consumer_groups(&self) -> Vec<&str> {
    self.consumers.iter().map(|c| c.group()).collect()
  }

  /// Drains every relay, runs one round of every consumer and completes
  /// deliveries due at `now`. Returns how many records and messages moved.
  pub async fn pump_once(&self, now: DateTime<Utc>) -> Result<usize> {
    let mut touched = 0;
    for relay in &self.relays {
      touched += relay.drain_once(now).await?.claimed;
    }
    for consumer in &self.consumers {
      touched += consumer.process_available().await?.fetched;
    }
    if let Some((deliveries, _)) = &self.sweep {
      touched += deliveries.complete_due(now).await?;
    }
    Ok(touched)
  }

  /// Pumps until nothing moves. Lets callers observe the end state of a
  /// choreography without background tasks.
  pub async fn settle(&self, now: DateTime<Utc>) -> Result<usize> {
    let mut total = 0;
    for _ in 0..SETTLE_ROUNDS {
      let touched = self.pump_once(now).await?;
      if touched == 0 {
        break;
      }
      total += touched;
    }
    Ok(total)
  }

  pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    for relay in self.relays {
      handles.push(tokio::spawn(relay.run(shutdown.clone())));
    }
    for consumer in self.consumers {
      handles.push(tokio::spawn(consumer.run(shutdown.clone())));
    }
    if let Some((service, interval)) = self.sweep {
      handles.push(tokio::spawn(service.run_sweep(interval, shutdown.clone())));
    }
    info!(tasks = handles.len(), "Background workers spawned.");
    handles
  }
}

pub struct Runtime {
  pub state: AppState,
  pub stores: Stores,
  pub workers: Workers,
}

fn consumer_settings(config: &AppConfig) -> ConsumerSettings {
  ConsumerSettings {
    poll_interval: Duration::from_millis(config.consumer_poll_interval_ms),
    max_deliveries: config.consumer_max_deliveries,
    ..ConsumerSettings::default()
  }
}

fn relay_settings(config: &AppConfig, service: &str) -> RelaySettings {
  RelaySettings {
    worker_id: format!("{}-relay-{}", service, uuid::Uuid::new_v4().simple()),
    batch_size: config.outbox_batch_size,
    max_attempts: config.outbox_max_attempts,
    poll_interval: Duration::from_millis(config.outbox_poll_interval_ms),
    ..RelaySettings::default()
  }
}

/// Builds every service. `timers` enables per-delivery completion timers.
pub fn build(config: AppConfig, stores: Stores, bus: Arc<dyn EventBus>, timers: bool) -> Result<Runtime> {
  if stores.durable && !bus.is_durable() {
    return Err(AppError::Config(
      "durable stores need a durable event bus; relayed events would be lost on restart".to_string(),
    ));
  }
  let config = Arc::new(config);

  let gateway: Arc<dyn PaymentGateway> = match &config.stripe_secret_key {
    Some(key) => Arc::new(StripeGateway::new(&config.stripe_api_base, key)),
    None => Arc::new(MockGateway),
  };
  let payments = Arc::new(PaymentService::new(
    stores.payments.clone(),
    gateway,
    PaymentSettings::from_config(&config),
  ));

  let initiator: Arc<dyn PaymentInitiator> = match &config.payments_base_url {
    Some(base_url) => Arc::new(HttpInitiator::new(base_url)),
    None => Arc::new(InProcessInitiator::new(payments.clone())),
  };
  let orders = Arc::new(OrderService::new(stores.orders.clone(), initiator));

  let dispatcher = Arc::new(RosterDispatcher::new(
    config.delivery_drivers.clone(),
    Location {
      latitude: config.delivery_start_lat,
      longitude: config.delivery_start_lng,
    },
  ));
  let transit = chrono::Duration::try_seconds(config.delivery_transit_secs)
    .ok_or_else(|| AppError::Config("DELIVERY_TRANSIT_SECS out of range".to_string()))?;
  let deliveries = Arc::new(DeliveryService::new(stores.deliveries.clone(), dispatcher, transit));
  let notifications = Arc::new(NotificationService::new(stores.notifications.clone()));

  let services = config.services;
  let settings = consumer_settings(&config);
  let mut relays = Vec::new();
  let mut consumers = Vec::new();
  let mut sweep = None;

  if services.order {
    relays.push(OutboxRelay::new(
      "order-outbox",
      stores.orders.outbox(),
      bus.clone(),
      relay_settings(&config, "order"),
    ));
    consumers.push(orders.consumer(bus.clone(), settings.clone()));
  }
  if services.payment {
    relays.push(OutboxRelay::new(
      "payment-outbox",
      stores.payments.outbox(),
      bus.clone(),
      relay_settings(&config, "payment"),
    ));
    consumers.push(payments.consumer(bus.clone(), settings.clone()));
  }
  if services.delivery {
    relays.push(OutboxRelay::new(
      "delivery-outbox",
      stores.deliveries.outbox(),
      bus.clone(),
      relay_settings(&config, "delivery"),
    ));
    consumers.push(deliveries.consumer(bus.clone(), settings.clone(), timers));
    sweep = Some((
      deliveries.clone(),
      Duration::from_millis(config.delivery_sweep_interval_ms),
    ));
  }
  if services.notification {
    consumers.push(notifications.consumer(bus.clone(), settings));
  }

  let state = AppState {
    tokens: Arc::new(TokenSigner::new(&config.auth_token_secret)),
    config,
    orders,
    payments,
    deliveries,
    notifications,
  };
  Ok(Runtime {
    state,
    stores,
    workers: Workers {
      relays,
      consumers,
      sweep,
    },
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::EnabledServices;
  use tiffin_core::InMemoryBus;

  #[test]
  fn only_enabled_services_get_workers() {
    let mut config = AppConfig::for_local("auth", "whsec");
    config.services = EnabledServices::parse("delivery,notification").unwrap();
    let runtime = build(config, Stores::in_memory(), Arc::new(InMemoryBus::new(2)), false).unwrap();
    assert_eq!(runtime.workers.consumer_groups(), vec!["delivery-service", "notification-service"]);
    assert_eq!(runtime.workers.relays.len(), 1);
    assert!(runtime.workers.sweep.is_some());
  }

  #[test]
  fn durable_stores_refuse_a_volatile_bus() {
    let config = AppConfig::for_local("auth", "whsec");
    let stores = Stores {
      durable: true,
      ..Stores::in_memory()
    };
    let result = build(config, stores, Arc::new(InMemoryBus::new(2)), false);
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("durable event bus")));
  }

  #[test]
  fn transit_out_of_range_is_a_config_error() {
    let mut config = AppConfig::for_local("auth", "whsec");
    config.delivery_transit_secs = i64::MAX;
    let result = build(config, Stores::in_memory(), Arc::new(InMemoryBus::new(2)), false);
    assert!(matches!(result, Err(AppError::Config(_))));
  }
}
