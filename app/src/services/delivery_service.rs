// app/src/services/delivery_service.rs

//! Courier assignment on payment success and completion once transit is over.
//!
//! The due time is stored on the delivery, so completion does not depend on
//! the process that assigned it: a per-delivery timer completes it on time
//! when the process stays up, and the sweep picks up anything the timer missed.

use crate::contracts::{topics, DeliveryUpdate, DomainEvent, PaymentSucceeded};
use crate::errors::{AppError, Result};
use crate::models::{Delivery, DeliveryStatus};
use crate::services::dispatch::CourierDispatcher;
use crate::stores::DeliveryStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tiffin_core::{Consumer, ConsumerSettings, EventBus};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

pub const CONSUMER_GROUP: &str = "delivery-service";

const SWEEP_BATCH: usize = 100;

pub struct DeliveryService {
  deliveries: Arc<dyn DeliveryStore>,
  dispatcher: Arc<dyn CourierDispatcher>,
  transit: Duration,
}

impl DeliveryService {
  pub fn new(deliveries: Arc<dyn DeliveryStore>, dispatcher: Arc<dyn CourierDispatcher>, transit: Duration) -> Self {
    Self {
      deliveries,
      dispatcher,
      transit,
    }
  }

  pub async fn get_for_order(&self, order_id: Uuid) -> Result<Delivery> {
    self
      .deliveries
      .get_for_order(order_id)
      .await?
      .ok_or_else(|| AppError::NotFound(format!("No delivery for order {}", order_id)))
  }

  /// Assigns a courier unless the order already has a delivery. Returns the
  /// new delivery, or `None` for a replayed event.
  #[instrument(name = "delivery_service::on_payment_succeeded", skip_all, fields(order_id = %event.order_id))]
  pub async fn on_payment_succeeded(&self, event: &PaymentSucceeded) -> Result<Option<Delivery>> {
    if self.deliveries.get_for_order(event.order_id).await?.is_some() {
      debug!("Delivery already assigned.");
      return Ok(None);
    }
    let courier = self.dispatcher.assign(event.order_id);
    let now = Utc::now();
    let delivery = Delivery {
      id: Uuid::new_v4(),
      order_id: event.order_id,
      user_id: event.user_id,
      driver_name: courier.driver_name,
      status: DeliveryStatus::Assigned,
      location: courier.location,
      due_at: now + self.transit,
      assigned_at: now,
      completed_at: None,
    };
    let envelope = DomainEvent::DeliveryAssigned(DeliveryUpdate::from_delivery(&delivery)).to_envelope()?;
    if !self.deliveries.assign_if_absent(&delivery, vec![envelope]).await? {
      debug!("Delivery assigned concurrently.");
      return Ok(None);
    }
    info!(driver = %delivery.driver_name, due_at = %delivery.due_at, "Courier assigned.");
    Ok(Some(delivery))
  }

  /// Completes every open delivery due at `now`. Returns how many were completed here.
  #[instrument(name = "delivery_service::complete_due", skip(self))]
  pub async fn complete_due(&self, now: DateTime<Utc>) -> Result<usize> {
    let mut completed = 0;
    loop {
      let due = self.deliveries.due(now, SWEEP_BATCH).await?;
      let batch_len = due.len();
      let mut progressed = 0;
      for mut delivery in due {
        delivery.status = DeliveryStatus::Completed;
        delivery.completed_at = Some(now);
        let envelope = DomainEvent::DeliveryCompleted(DeliveryUpdate::from_delivery(&delivery)).to_envelope()?;
        if self.deliveries.complete(delivery.order_id, now, vec![envelope]).await? {
          info!(order_id = %delivery.order_id, "Delivery completed.");
          progressed += 1;
        }
      }
      completed += progressed;
      if batch_len < SWEEP_BATCH || progressed == 0 {
        break;
      }
    }
    Ok(completed)
  }

  /// Best-effort completion at the delivery's due time.
  pub fn schedule_completion(self: &Arc<Self>, delivery: &Delivery) {
    let service = Arc::clone(self);
    let order_id = delivery.order_id;
    let wait = (delivery.due_at - Utc::now()).to_std().unwrap_or_default();
    tokio::spawn(async move {
      tokio::time::sleep(wait).await;
      if let Err(e) = service.complete_due(Utc::now()).await {
        error!(%order_id, error = %e, "Timed delivery completion failed; the sweep will retry.");
      }
    });
  }

  /// Completes overdue deliveries right away, then every `interval` until shutdown.
  pub async fn run_sweep(self: Arc<Self>, interval: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
    info!(interval_ms = interval.as_millis() as u64, "Delivery sweep started.");
    loop {
      if *shutdown.borrow() {
        break;
      }
      match self.complete_due(Utc::now()).await {
        Ok(0) => {}
        Ok(n) => info!(completed = n, "Delivery sweep completed overdue deliveries."),
        Err(e) => error!(error = %e, "Delivery sweep failed."),
      }
      tokio::select! {
        _ = tokio::time::sleep(interval) => {}
        _ = shutdown.changed() => {}
      }
    }
    info!("Delivery sweep stopped.");
  }

  /// `timers` spawns a completion timer per new delivery; tests drive `complete_due` instead.
  pub fn consumer(
    self: &Arc<Self>,
    bus: Arc<dyn EventBus>,
    settings: ConsumerSettings,
    timers: bool,
  ) -> Consumer<AppError> {
    let mut consumer = Consumer::new(CONSUMER_GROUP, bus, settings);
    let service = Arc::clone(self);
    consumer.on_topic(topics::PAYMENT_SUCCEEDED, move |delivery| {
      let service = service.clone();
      async move {
        let event = match DomainEvent::from_envelope(&delivery.envelope)? {
          DomainEvent::PaymentSucceeded(event) => event,
          other => {
            return Err(AppError::Contract(format!(
              "unexpected {} on {}",
              other.topic(),
              topics::PAYMENT_SUCCEEDED
            )))
          }
        };
        if let Some(assigned) = service.on_payment_succeeded(&event).await? {
          if timers {
            service.schedule_completion(&assigned);
          }
        }
        Ok(())
      }
    });
    consumer
  }
}
