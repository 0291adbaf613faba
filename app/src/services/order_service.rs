// app/src/services/order_service.rs

//! Carts, checkout and the order projection fed by payment and delivery events.

use crate::contracts::{topics, DeliveryUpdate, DomainEvent, PaymentFailed, PaymentSucceeded};
use crate::errors::{AppError, Result};
use crate::models::{Cart, DeliveryProgress, NewCartItem, Order, OrderPage, PaymentReceipt, PaymentStatus};
use crate::pipelines::contexts::{CheckoutCtxData, ProcessPaymentCtxData};
use crate::pipelines::{build_checkout_pipeline, build_process_payment_pipeline};
use crate::services::payment_initiator::PaymentInitiator;
use crate::stores::OrderStore;
use serde::Serialize;
use std::sync::Arc;
use tiffin_core::{ContextData, Consumer, ConsumerSettings, EventBus, Pipeline};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub const CONSUMER_GROUP: &str = "order-service";

/// Optimistic cart writes retried on a concurrent change before giving up.
const CART_WRITE_ATTEMPTS: usize = 3;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Result of the deferred checkout flow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiation {
  pub success: bool,
  pub order_id: Uuid,
  pub message: String,
  pub client_secret: Option<String>,
  pub payment_id: Uuid,
}

pub struct OrderService {
  orders: Arc<dyn OrderStore>,
  initiator: Arc<dyn PaymentInitiator>,
  checkout_pipeline: Pipeline<CheckoutCtxData, AppError>,
  process_payment_pipeline: Pipeline<ProcessPaymentCtxData, AppError>,
}

enum CartWrite {
  Saved(Option<Cart>),
  Raced,
}

/// An order is only marked paid for exactly what was charged.
fn ensure_charged_total(event: &PaymentSucceeded, total_amount: i64) -> Result<()> {
  if event.amount == total_amount {
    return Ok(());
  }
  error!(
    payment_id = %event.payment_id,
    charged = event.amount,
    total_amount,
    "Charged amount does not match the order total."
  );
  Err(AppError::Contract(format!(
    "payment {} charged {} but order {} totals {}",
    event.payment_id, event.amount, event.order_id, total_amount
  )))
}

impl OrderService {
  pub fn new(orders: Arc<dyn OrderStore>, initiator: Arc<dyn PaymentInitiator>) -> Self {
    Self {
      orders,
      initiator,
      checkout_pipeline: build_checkout_pipeline(),
      process_payment_pipeline: build_process_payment_pipeline(),
    }
  }

  pub async fn get_cart(&self, user_id: Uuid) -> Result<Option<Cart>> {
    self.orders.active_cart(user_id).await
  }

  #[instrument(
    name = "order_service::add_item",
    skip(self, item),
    fields(restaurant_id = %item.restaurant_id, menu_item_id = %item.menu_item_id),
    err(Display)
  )]
  pub async fn add_item(&self, user_id: Uuid, item: NewCartItem) -> Result<Cart> {
    item.validate()?;
    for _ in 0..CART_WRITE_ATTEMPTS {
      match self.orders.active_cart(user_id).await? {
        None => {
          let mut cart = Cart::new(user_id, &item.restaurant_id, &item.restaurant_name);
          cart.add_item(&item)?;
          match self.orders.insert_cart(&cart).await {
            Ok(()) => {
              info!(cart_id = %cart.id, "Cart created.");
              return Ok(cart);
            }
            // Another request created the user's cart first; add to that one.
            Err(AppError::Conflict(_)) => continue,
            Err(e) => return Err(e),
          }
        }
        Some(mut cart) => {
          let expected = cart.version;
          cart.add_item(&item)?;
          cart.version += 1;
          if self.orders.save_cart(&cart, expected).await? {
            return Ok(cart);
          }
        }
      }
    }
    Err(AppError::Conflict("Cart is being modified concurrently".to_string()))
  }

  /// Sets a line's quantity; zero removes it. Returns `None` once the cart is emptied and deleted.
  #[instrument(name = "order_service::update_item", skip(self), err(Display))]
  pub async fn update_item(&self, user_id: Uuid, menu_item_id: &str, quantity: i32) -> Result<Option<Cart>> {
    if quantity < 0 {
      return Err(AppError::Validation("quantity cannot be negative".to_string()));
    }
    self
      .write_cart(user_id, |cart| cart.set_quantity(menu_item_id, quantity))
      .await
  }

  pub async fn remove_item(&self, user_id: Uuid, menu_item_id: &str) -> Result<Option<Cart>> {
    self.write_cart(user_id, |cart| cart.remove_item(menu_item_id)).await
  }

  /// Deletes the active cart. A checkout already reserved from it keeps its priced copy.
  pub async fn clear_cart(&self, user_id: Uuid) -> Result<()> {
    for _ in 0..CART_WRITE_ATTEMPTS {
      let cart = self
        .orders
        .active_cart(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No active cart".to_string()))?;
      if self.orders.delete_cart(cart.id, cart.version).await? {
        info!(%user_id, cart_id = %cart.id, "Cart cleared.");
        return Ok(());
      }
    }
    Err(AppError::Conflict("Cart is being modified concurrently".to_string()))
  }

  async fn write_cart<F>(&self, user_id: Uuid, mut change: F) -> Result<Option<Cart>>
  where
    F: FnMut(&mut Cart) -> Result<()>,
  {
    for _ in 0..CART_WRITE_ATTEMPTS {
      let mut cart = self
        .orders
        .active_cart(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No active cart".to_string()))?;
      let expected = cart.version;
      change(&mut cart)?;
      let outcome = if cart.is_empty() {
        if self.orders.delete_cart(cart.id, expected).await? {
          debug!(cart_id = %cart.id, "Emptied cart deleted.");
          CartWrite::Saved(None)
        } else {
          CartWrite::Raced
        }
      } else {
        cart.version += 1;
        if self.orders.save_cart(&cart, expected).await? {
          CartWrite::Saved(Some(cart))
        } else {
          CartWrite::Raced
        }
      };
      if let CartWrite::Saved(cart) = outcome {
        return Ok(cart);
      }
    }
    Err(AppError::Conflict("Cart is being modified concurrently".to_string()))
  }

  /// Turns the active cart into an order and emits `order.created`.
  #[instrument(name = "order_service::checkout", skip(self), err(Display))]
  pub async fn checkout(&self, user_id: Uuid) -> Result<Order> {
    let ctx_data = ContextData::new(CheckoutCtxData::new(self.orders.clone(), user_id));
    self.checkout_pipeline.run(ctx_data.clone()).await?;
    let order = ctx_data.read().order.clone();
    order.ok_or_else(|| AppError::Internal("checkout finished without an order".to_string()))
  }

  /// Deferred checkout: opens a payment for the cart; the order appears once it succeeds.
  #[instrument(name = "order_service::process_payment", skip(self, bearer_token), err(Display))]
  pub async fn process_payment(
    &self,
    user_id: Uuid,
    bearer_token: &str,
    payment_method: Option<String>,
  ) -> Result<PaymentInitiation> {
    let ctx_data = ContextData::new(ProcessPaymentCtxData::new(
      self.orders.clone(),
      self.initiator.clone(),
      user_id,
      bearer_token,
      payment_method,
    ));
    self.process_payment_pipeline.run(ctx_data.clone()).await?;
    let guard = ctx_data.read();
    let receipt: &PaymentReceipt = guard
      .receipt
      .as_ref()
      .ok_or_else(|| AppError::Internal("payment initiation finished without a receipt".to_string()))?;
    let message = if guard.reused_existing {
      "Payment already in progress for this cart"
    } else {
      "Payment initiated"
    };
    Ok(PaymentInitiation {
      success: true,
      order_id: receipt.order_id,
      message: message.to_string(),
      client_secret: receipt.client_secret.clone(),
      payment_id: receipt.payment_id,
    })
  }

  pub async fn get_order(&self, requester: Uuid, order_id: Uuid) -> Result<Order> {
    let order = self
      .orders
      .get_order(order_id)
      .await?
      .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
    if order.user_id != requester {
      return Err(AppError::Forbidden("Order belongs to another user".to_string()));
    }
    Ok(order)
  }

  pub async fn orders_for_user(
    &self,
    requester: Uuid,
    user_id: Uuid,
    page: Option<u32>,
    limit: Option<u32>,
  ) -> Result<OrderPage> {
    if requester != user_id {
      return Err(AppError::Forbidden("Cannot list another user's orders".to_string()));
    }
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = u64::from(page - 1) * u64::from(limit);
    let (orders, total) = self.orders.orders_for_user(user_id, offset, limit).await?;
    Ok(OrderPage {
      orders,
      page,
      limit,
      total,
      total_pages: total.div_ceil(u64::from(limit)),
    })
  }

  #[instrument(name = "order_service::on_payment_succeeded", skip_all, fields(order_id = %event.order_id))]
  pub async fn on_payment_succeeded(&self, event: &PaymentSucceeded) -> Result<()> {
    let Some(order) = self.orders.get_order(event.order_id).await? else {
      return self.materialize(event).await;
    };
    ensure_charged_total(event, order.total_amount)?;
    if self
      .orders
      .set_payment_status(event.order_id, PaymentStatus::Pending, PaymentStatus::Paid)
      .await?
    {
      info!(payment_id = %event.payment_id, "Order marked paid.");
    } else {
      debug!("Order payment status already settled.");
    }
    Ok(())
  }

  /// Builds the order of a deferred checkout from the priced reservation, which
  /// outlives edits to the cart and the cart itself.
  async fn materialize(&self, event: &PaymentSucceeded) -> Result<()> {
    let Some(reservation) = self.orders.reservation(event.order_id).await? else {
      warn!(user_id = %event.user_id, "Payment succeeded for an order that was never placed or reserved.");
      return Ok(());
    };
    if reservation.user_id != event.user_id {
      error!(
        reserved_for = %reservation.user_id,
        paid_by = %event.user_id,
        "Payment succeeded for another user's reservation."
      );
      return Err(AppError::Contract(format!(
        "payment {} does not belong to the user of order {}",
        event.payment_id, event.order_id
      )));
    }
    ensure_charged_total(event, reservation.total_amount)?;

    let mut order = Order::from_reservation(&reservation);
    order.payment_status = PaymentStatus::Paid;
    if self.orders.materialize_order(&order, reservation.cart_id).await? {
      info!(cart_id = %reservation.cart_id, total_amount = order.total_amount, "Order materialized from reservation.");
    } else {
      debug!("Order already materialized.");
    }
    Ok(())
  }

  /// `payment.failed` and `payment.cancelled` both end the order's payment as failed.
  #[instrument(name = "order_service::on_payment_failed", skip_all, fields(order_id = %event.order_id))]
  pub async fn on_payment_failed(&self, event: &PaymentFailed) -> Result<()> {
    if self.orders.get_order(event.order_id).await?.is_none() {
      warn!(reason = %event.failure_reason, "Payment failed for an order that was never materialized.");
      return Ok(());
    }
    if self
      .orders
      .set_payment_status(event.order_id, PaymentStatus::Pending, PaymentStatus::Failed)
      .await?
    {
      info!(reason = %event.failure_reason, "Order payment failed.");
    }
    Ok(())
  }

  pub async fn on_delivery_assigned(&self, event: &DeliveryUpdate) -> Result<()> {
    if self.orders.get_order(event.order_id).await?.is_none() {
      return Err(AppError::OrderNotReady(event.order_id));
    }
    debug!(order_id = %event.order_id, driver = %event.driver_name, "Courier assigned.");
    Ok(())
  }

  #[instrument(name = "order_service::on_delivery_completed", skip_all, fields(order_id = %event.order_id))]
  pub async fn on_delivery_completed(&self, event: &DeliveryUpdate) -> Result<()> {
    if self.orders.get_order(event.order_id).await?.is_none() {
      return Err(AppError::OrderNotReady(event.order_id));
    }
    if self
      .orders
      .set_delivery_status(event.order_id, DeliveryProgress::Pending, DeliveryProgress::Completed)
      .await?
    {
      info!("Order delivered.");
    }
    Ok(())
  }

  pub async fn apply(&self, event: DomainEvent) -> Result<()> {
    match event {
      DomainEvent::PaymentSucceeded(e) => self.on_payment_succeeded(&e).await,
      DomainEvent::PaymentFailed(e) | DomainEvent::PaymentCancelled(e) => self.on_payment_failed(&e).await,
      DomainEvent::DeliveryAssigned(e) => self.on_delivery_assigned(&e).await,
      DomainEvent::DeliveryCompleted(e) => self.on_delivery_completed(&e).await,
      other => Err(AppError::Contract(format!("order service does not consume {}", other.topic()))),
    }
  }

  pub fn consumer(self: &Arc<Self>, bus: Arc<dyn EventBus>, settings: ConsumerSettings) -> Consumer<AppError> {
    let mut consumer = Consumer::new(CONSUMER_GROUP, bus, settings);
    for topic in [
      topics::PAYMENT_SUCCEEDED,
      topics::PAYMENT_FAILED,
      topics::PAYMENT_CANCELLED,
      topics::DELIVERY_ASSIGNED,
      topics::DELIVERY_COMPLETED,
    ] {
      let service = Arc::clone(self);
      consumer.on_topic(topic, move |delivery| {
        let service = service.clone();
        async move { service.apply(DomainEvent::from_envelope(&delivery.envelope)?).await }
      });
    }
    consumer
  }
}
