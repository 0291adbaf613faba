// app/src/services/notification_service.rs

use crate::contracts::{topics, DeliveryUpdate, DomainEvent};
use crate::errors::{AppError, Result};
use crate::models::{Notification, DELIVERED_MESSAGE};
use crate::stores::NotificationStore;
use std::sync::Arc;
use tiffin_core::{Consumer, ConsumerSettings, EventBus};
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub const CONSUMER_GROUP: &str = "notification-service";

pub struct NotificationService {
  notifications: Arc<dyn NotificationStore>,
}

impl NotificationService {
  pub fn new(notifications: Arc<dyn NotificationStore>) -> Self {
    Self { notifications }
  }

  #[instrument(name = "notification_service::on_delivery_completed", skip_all, fields(order_id = %event.order_id))]
  pub async fn on_delivery_completed(&self, event: &DeliveryUpdate) -> Result<()> {
    let notification = Notification::new(event.user_id, event.order_id, DELIVERED_MESSAGE);
    if self.notifications.insert_if_absent(&notification).await? {
      info!(user_id = %event.user_id, "Delivery notification recorded.");
    } else {
      debug!("Delivery notification already recorded.");
    }
    Ok(())
  }

  pub async fn list_for_user(&self, requester: Uuid, user_id: Uuid) -> Result<Vec<Notification>> {
    if requester != user_id {
      return Err(AppError::Forbidden("Cannot read another user's notifications".to_string()));
    }
    self.notifications.list_for_user(user_id).await
  }

  pub fn consumer(self: &Arc<Self>, bus: Arc<dyn EventBus>, settings: ConsumerSettings) -> Consumer<AppError> {
    let mut consumer = Consumer::new(CONSUMER_GROUP, bus, settings);
    let service = Arc::clone(self);
    consumer.on_topic(topics::DELIVERY_COMPLETED, move |delivery| {
      let service = service.clone();
      async move {
        match DomainEvent::from_envelope(&delivery.envelope)? {
          DomainEvent::DeliveryCompleted(event) => service.on_delivery_completed(&event).await,
          other => Err(AppError::Contract(format!(
            "unexpected {} on {}",
            other.topic(),
            topics::DELIVERY_COMPLETED
          ))),
        }
      }
    });
    consumer
  }
}
