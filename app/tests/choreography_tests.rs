// tests/choreography_tests.rs
mod common;

use common::*;
use serial_test::serial;
use tiffin::contracts::topics;
use tiffin::errors::AppError;
use tiffin::models::{DeliveryProgress, DeliveryStatus, PaymentState, PaymentStatus, DELIVERED_MESSAGE};
use tiffin::pipelines::WebhookOutcome;
use tiffin_core::EventBus;
use uuid::Uuid;

const SUCCEEDED: &str = "payment_intent.succeeded";
const FAILED: &str = "payment_intent.payment_failed";
const CANCELED: &str = "payment_intent.canceled";

#[tokio::test]
#[serial]
async fn test_paid_order_is_delivered_and_notified_once() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();
  h.fill_sample_cart(user).await;

  let order = h.state.orders.checkout(user).await.unwrap();
  assert_eq!(order.total_amount, 200);
  assert_eq!(order.payment_status, PaymentStatus::Pending);
  assert!(h.state.orders.get_cart(user).await.unwrap().is_none());

  h.settle().await;
  let payment = h.only_payment(order.id);
  assert_eq!(payment.status, PaymentState::Processing);
  assert_eq!(payment.amount, 200);
  assert_eq!(payment.currency, "inr");

  let outcome = h.deliver_webhook(SUCCEEDED, &payment.provider_payment_id).await.unwrap();
  assert_eq!(outcome, WebhookOutcome::Applied);
  h.settle().await;

  let paid = h.state.orders.get_order(user, order.id).await.unwrap();
  assert_eq!(paid.payment_status, PaymentStatus::Paid);
  assert_eq!(paid.delivery_status, DeliveryProgress::Pending);
  let delivery = h.state.deliveries.get_for_order(order.id).await.unwrap();
  assert_eq!(delivery.status, DeliveryStatus::Assigned);
  assert_eq!(delivery.user_id, user);

  h.settle_after_transit().await;

  let delivery = h.state.deliveries.get_for_order(order.id).await.unwrap();
  assert_eq!(delivery.status, DeliveryStatus::Completed);
  assert!(delivery.completed_at.is_some());
  let delivered = h.state.orders.get_order(user, order.id).await.unwrap();
  assert_eq!(delivered.delivery_status, DeliveryProgress::Completed);

  let notifications = h.state.notifications.list_for_user(user, user).await.unwrap();
  assert_eq!(notifications.len(), 1);
  assert_eq!(notifications[0].order_id, order.id);
  assert_eq!(notifications[0].message, DELIVERED_MESSAGE);
  assert!(h.bus.dead_letters().is_empty());
}

#[tokio::test]
#[serial]
async fn test_replayed_events_and_webhooks_change_nothing() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();
  h.fill_sample_cart(user).await;
  let order = h.state.orders.checkout(user).await.unwrap();
  h.settle().await;
  let payment = h.only_payment(order.id);
  h.deliver_webhook(SUCCEEDED, &payment.provider_payment_id).await.unwrap();
  h.settle().await;
  h.settle_after_transit().await;

  let replay = h.deliver_webhook(SUCCEEDED, &payment.provider_payment_id).await.unwrap();
  assert_eq!(replay, WebhookOutcome::AlreadySettled);

  // Redeliver every event the bus has seen, as a broker would after a consumer crash.
  for topic in [topics::ORDER_CREATED, topics::PAYMENT_SUCCEEDED, topics::DELIVERY_COMPLETED] {
    for envelope in h.bus.published(topic) {
      h.bus.publish(envelope).await.unwrap();
    }
  }
  h.settle_after_transit().await;

  assert_eq!(h.bus.published(topics::PAYMENT_SUCCEEDED).len(), 2);
  assert_eq!(h.payments.payments_for_order(order.id).len(), 1);
  assert_eq!(h.deliveries.delivery_count(), 1);
  assert_eq!(h.bus.published(topics::DELIVERY_ASSIGNED).len(), 1);
  assert_eq!(h.orders.order_count(), 1);
  let notifications = h.state.notifications.list_for_user(user, user).await.unwrap();
  assert_eq!(notifications.len(), 1);
}

#[tokio::test]
#[serial]
async fn test_failed_payment_never_assigns_a_courier() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();
  h.fill_sample_cart(user).await;
  let order = h.state.orders.checkout(user).await.unwrap();
  h.settle().await;
  let payment = h.only_payment(order.id);

  let outcome = h.deliver_webhook(FAILED, &payment.provider_payment_id).await.unwrap();
  assert_eq!(outcome, WebhookOutcome::Applied);
  h.settle_after_transit().await;

  let failed = h.only_payment(order.id);
  assert_eq!(failed.status, PaymentState::Failed);
  assert_eq!(failed.failure_reason.as_deref(), Some("Your card was declined."));
  let stored = h.state.orders.get_order(user, order.id).await.unwrap();
  assert_eq!(stored.payment_status, PaymentStatus::Failed);
  assert_eq!(h.deliveries.delivery_count(), 0);
  assert!(matches!(
    h.state.deliveries.get_for_order(order.id).await,
    Err(AppError::NotFound(_))
  ));

  // A success arriving after the failure is a no-op.
  let late = h.deliver_webhook(SUCCEEDED, &payment.provider_payment_id).await.unwrap();
  assert_eq!(late, WebhookOutcome::AlreadySettled);
}

#[tokio::test]
#[serial]
async fn test_cancelled_intent_fails_the_order() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();
  h.fill_sample_cart(user).await;
  let order = h.state.orders.checkout(user).await.unwrap();
  h.settle().await;
  let payment = h.only_payment(order.id);

  h.deliver_webhook(CANCELED, &payment.provider_payment_id).await.unwrap();
  h.settle().await;

  assert_eq!(h.only_payment(order.id).status, PaymentState::Cancelled);
  assert_eq!(h.bus.published(topics::PAYMENT_CANCELLED).len(), 1);
  let stored = h.state.orders.get_order(user, order.id).await.unwrap();
  assert_eq!(stored.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
#[serial]
async fn test_bad_signature_is_rejected_without_state_change() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();
  h.fill_sample_cart(user).await;
  let order = h.state.orders.checkout(user).await.unwrap();
  h.settle().await;
  let payment = h.only_payment(order.id);

  let body = webhook_body(SUCCEEDED, &payment.provider_payment_id);
  let forged = sign("whsec_someone_else", &body);
  let result = h
    .state
    .payments
    .handle_stripe_webhook(body.clone().into(), Some(forged), chrono::Utc::now())
    .await;
  assert!(matches!(result, Err(AppError::InvalidSignature(_))));

  let unsigned = h
    .state
    .payments
    .handle_stripe_webhook(body.into(), None, chrono::Utc::now())
    .await;
  assert!(matches!(unsigned, Err(AppError::InvalidSignature(_))));

  h.settle().await;
  assert_eq!(h.only_payment(order.id).status, PaymentState::Processing);
  assert!(h.bus.published(topics::PAYMENT_SUCCEEDED).is_empty());
  assert_eq!(h.deliveries.delivery_count(), 0);
}

#[tokio::test]
#[serial]
async fn test_webhook_for_unknown_payment_is_acknowledged() {
  setup_tracing();
  let h = Harness::new();
  let outcome = h.deliver_webhook(SUCCEEDED, "pi_never_recorded").await.unwrap();
  assert_eq!(outcome, WebhookOutcome::UnknownPayment);

  let ignored = h.deliver_webhook("charge.refunded", "pi_never_recorded").await.unwrap();
  assert_eq!(ignored, WebhookOutcome::Ignored);

  h.settle().await;
  assert!(h.bus.published(topics::PAYMENT_SUCCEEDED).is_empty());
}

#[tokio::test]
#[serial]
async fn test_second_payment_for_open_order_is_a_duplicate() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();
  let order_id = Uuid::new_v4();
  let request = tiffin::models::CreatePaymentRequest {
    order_id,
    user_id: user,
    amount: 200,
    currency: None,
    payment_method: Some("upi".to_string()),
  };

  let receipt = h.state.payments.create_payment(request.clone()).await.unwrap();
  assert_eq!(receipt.status, PaymentState::Processing);
  assert!(receipt.provider_payment_id.starts_with("mock_pi_"));
  assert!(receipt.client_secret.is_some());

  let again = h.state.payments.create_payment(request.clone()).await;
  assert!(matches!(again, Err(AppError::DuplicatePayment(id)) if id == order_id));
  assert_eq!(h.payments.payments_for_order(order_id).len(), 1);

  // A failed attempt no longer blocks a retry.
  h.deliver_webhook(FAILED, &receipt.provider_payment_id).await.unwrap();
  let retry = h.state.payments.create_payment(request).await.unwrap();
  assert_ne!(retry.payment_id, receipt.payment_id);
  assert_eq!(h.payments.payments_for_order(order_id).len(), 2);
}

#[tokio::test]
#[serial]
async fn test_payment_requests_are_validated() {
  setup_tracing();
  let h = Harness::new();
  let base = tiffin::models::CreatePaymentRequest {
    order_id: Uuid::new_v4(),
    user_id: Uuid::new_v4(),
    amount: 0,
    currency: None,
    payment_method: None,
  };
  let zero = h.state.payments.create_payment(base.clone()).await;
  assert!(matches!(zero, Err(AppError::Validation(_))));

  let yen = tiffin::models::CreatePaymentRequest {
    amount: 500,
    currency: Some("jpy".to_string()),
    ..base.clone()
  };
  assert!(matches!(h.state.payments.create_payment(yen).await, Err(AppError::Validation(_))));

  let barter = tiffin::models::CreatePaymentRequest {
    amount: 500,
    payment_method: Some("barter".to_string()),
    ..base.clone()
  };
  assert!(matches!(h.state.payments.create_payment(barter).await, Err(AppError::Validation(_))));
  assert!(h.payments.payments_for_order(base.order_id).is_empty());
}

#[tokio::test]
#[serial]
async fn test_empty_cart_cannot_be_checked_out() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();
  let token = h.token_for(user);

  assert!(matches!(h.state.orders.checkout(user).await, Err(AppError::EmptyCart)));
  assert!(matches!(
    h.state.orders.process_payment(user, &token, None).await,
    Err(AppError::EmptyCart)
  ));

  h.state.orders.add_item(user, menu_item("dal", 80, 1)).await.unwrap();
  h.state.orders.update_item(user, "dal", 0).await.unwrap();
  assert!(h.state.orders.get_cart(user).await.unwrap().is_none());
  assert!(matches!(h.state.orders.checkout(user).await, Err(AppError::EmptyCart)));
  assert_eq!(h.orders.order_count(), 0);
}

#[tokio::test]
#[serial]
async fn test_concurrent_adds_share_one_active_cart() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();

  let (a, b, c) = tokio::join!(
    h.state.orders.add_item(user, menu_item("idli", 40, 1)),
    h.state.orders.add_item(user, menu_item("vada", 30, 2)),
    h.state.orders.add_item(user, menu_item("idli", 40, 1)),
  );
  a.unwrap();
  b.unwrap();
  c.unwrap();

  assert_eq!(h.orders.active_cart_count(user), 1);
  let cart = h.state.orders.get_cart(user).await.unwrap().unwrap();
  assert_eq!(cart.items.len(), 2);
  assert_eq!(cart.total_amount, 140);

  let other_restaurant = tiffin::models::NewCartItem {
    restaurant_id: "rest-2".to_string(),
    ..menu_item("dosa", 90, 1)
  };
  assert!(matches!(
    h.state.orders.add_item(user, other_restaurant).await,
    Err(AppError::RestaurantMismatch(_))
  ));
}

#[tokio::test]
#[serial]
async fn test_deferred_checkout_materializes_order_on_payment() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();
  let token = h.token_for(user);
  h.fill_sample_cart(user).await;

  let first = h.state.orders.process_payment(user, &token, Some("upi".to_string())).await.unwrap();
  assert!(first.success);
  assert!(first.client_secret.is_some());
  assert!(matches!(
    h.state.orders.get_order(user, first.order_id).await,
    Err(AppError::NotFound(_))
  ));

  let second = h.state.orders.process_payment(user, &token, None).await.unwrap();
  assert_eq!(second.order_id, first.order_id);
  assert_eq!(second.payment_id, first.payment_id);
  assert_eq!(h.payments.payments_for_order(first.order_id).len(), 1);

  h.settle().await;
  assert!(h.bus.published(topics::ORDER_CREATED).is_empty());

  let payment = h.only_payment(first.order_id);
  assert_eq!(payment.payment_method, "upi");
  h.deliver_webhook(SUCCEEDED, &payment.provider_payment_id).await.unwrap();
  h.settle().await;

  let order = h.state.orders.get_order(user, first.order_id).await.unwrap();
  assert_eq!(order.total_amount, 200);
  assert_eq!(order.payment_status, PaymentStatus::Paid);
  assert_eq!(h.orders.order_count(), 1);
  assert!(h.state.orders.get_cart(user).await.unwrap().is_none());

  h.settle_after_transit().await;
  let delivered = h.state.orders.get_order(user, first.order_id).await.unwrap();
  assert_eq!(delivered.delivery_status, DeliveryProgress::Completed);
  assert_eq!(h.state.notifications.list_for_user(user, user).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_delivery_event_for_unknown_order_is_dead_lettered() {
  setup_tracing();
  let h = Harness::new();
  let stray = tiffin::contracts::DomainEvent::DeliveryAssigned(tiffin::contracts::DeliveryUpdate {
    order_id: Uuid::new_v4(),
    user_id: Uuid::new_v4(),
    driver_name: "Ravi".to_string(),
    location: tiffin::models::Location {
      latitude: 12.97,
      longitude: 77.59,
    },
    status: "assigned".to_string(),
  });
  h.bus.publish(stray.to_envelope().unwrap()).await.unwrap();

  h.settle().await;

  let dead = h.bus.dead_letters();
  assert_eq!(dead.len(), 1);
  assert_eq!(dead[0].group, tiffin::services::order_service::CONSUMER_GROUP);
  assert_eq!(dead[0].envelope.topic, topics::DELIVERY_ASSIGNED);
}

#[tokio::test]
#[serial]
async fn test_orders_are_private_and_paginated() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();
  let stranger = Uuid::new_v4();
  let mut placed = Vec::new();
  for _ in 0..3 {
    h.fill_sample_cart(user).await;
    placed.push(h.state.orders.checkout(user).await.unwrap().id);
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
  }

  let first_page = h.state.orders.orders_for_user(user, user, Some(1), Some(2)).await.unwrap();
  assert_eq!(first_page.total, 3);
  assert_eq!(first_page.total_pages, 2);
  assert_eq!(first_page.orders.len(), 2);
  assert_eq!(first_page.orders[0].id, placed[2]);
  let second_page = h.state.orders.orders_for_user(user, user, Some(2), Some(2)).await.unwrap();
  assert_eq!(second_page.orders.len(), 1);
  assert_eq!(second_page.orders[0].id, placed[0]);

  assert!(matches!(
    h.state.orders.orders_for_user(stranger, user, None, None).await,
    Err(AppError::Forbidden(_))
  ));
  assert!(matches!(
    h.state.orders.get_order(stranger, placed[0]).await,
    Err(AppError::Forbidden(_))
  ));
  assert!(matches!(
    h.state.orders.get_order(user, Uuid::new_v4()).await,
    Err(AppError::NotFound(_))
  ));
}

#[tokio::test]
#[serial]
async fn test_checkout_after_process_payment_keeps_one_order_and_one_payment() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();
  let token = h.token_for(user);
  h.fill_sample_cart(user).await;

  let initiated = h.state.orders.process_payment(user, &token, None).await.unwrap();
  let order = h.state.orders.checkout(user).await.unwrap();
  assert_eq!(order.id, initiated.order_id);
  assert_eq!(order.total_amount, 200);

  h.settle().await;
  assert_eq!(h.bus.published(topics::ORDER_CREATED).len(), 1);
  let payment = h.only_payment(order.id);
  assert_eq!(payment.id, initiated.payment_id);

  h.deliver_webhook(SUCCEEDED, &payment.provider_payment_id).await.unwrap();
  h.settle().await;

  let paid = h.state.orders.get_order(user, order.id).await.unwrap();
  assert_eq!(paid.payment_status, PaymentStatus::Paid);
  assert_eq!(h.orders.order_count(), 1);
  assert_eq!(h.payments.payments_for_order(order.id).len(), 1);
  assert!(h.bus.dead_letters().is_empty());
}

#[tokio::test]
#[serial]
async fn test_editing_cart_after_process_payment_reprices_the_checkout() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();
  let token = h.token_for(user);
  h.fill_sample_cart(user).await;

  let first = h.state.orders.process_payment(user, &token, None).await.unwrap();
  let cart = h.state.orders.add_item(user, menu_item("biryani", 500, 2)).await.unwrap();
  assert_eq!(cart.total_amount, 1200);
  assert_eq!(cart.checkout_ref, None);

  let second = h.state.orders.process_payment(user, &token, None).await.unwrap();
  assert_ne!(second.order_id, first.order_id);
  assert_ne!(second.payment_id, first.payment_id);
  assert_eq!(second.message, "Payment initiated");
  assert_eq!(h.only_payment(second.order_id).amount, 1200);

  // The earlier attempt still charges what it priced, and its order says so.
  let stale = h.only_payment(first.order_id);
  assert_eq!(stale.amount, 200);
  h.deliver_webhook(SUCCEEDED, &stale.provider_payment_id).await.unwrap();
  h.settle().await;

  let first_order = h.state.orders.get_order(user, first.order_id).await.unwrap();
  assert_eq!(first_order.total_amount, 200);
  assert_eq!(first_order.items.len(), 2);
  assert_eq!(first_order.payment_status, PaymentStatus::Paid);
  let cart = h.state.orders.get_cart(user).await.unwrap().expect("cart stays reserved for the new attempt");
  assert_eq!(cart.checkout_ref, Some(second.order_id));

  let fresh = h.only_payment(second.order_id);
  h.deliver_webhook(SUCCEEDED, &fresh.provider_payment_id).await.unwrap();
  h.settle().await;

  let second_order = h.state.orders.get_order(user, second.order_id).await.unwrap();
  assert_eq!(second_order.total_amount, 1200);
  assert_eq!(second_order.payment_status, PaymentStatus::Paid);
  assert!(h.state.orders.get_cart(user).await.unwrap().is_none());
  assert!(h.bus.dead_letters().is_empty());
}

#[tokio::test]
#[serial]
async fn test_open_attempt_for_another_amount_is_not_reused() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();
  let token = h.token_for(user);
  h.fill_sample_cart(user).await;

  let first = h.state.orders.process_payment(user, &token, None).await.unwrap();
  let declined = h.only_payment(first.order_id);
  h.deliver_webhook(FAILED, &declined.provider_payment_id).await.unwrap();
  h.settle().await;

  let mismatched = tiffin::models::CreatePaymentRequest {
    order_id: first.order_id,
    user_id: user,
    amount: 999,
    currency: None,
    payment_method: Some("card".to_string()),
  };
  h.state.payments.create_payment(mismatched).await.unwrap();

  let again = h.state.orders.process_payment(user, &token, None).await;
  assert!(matches!(again, Err(AppError::Conflict(_))));
  assert_eq!(h.payments.payments_for_order(first.order_id).len(), 2);
}

#[tokio::test]
#[serial]
async fn test_cleared_cart_still_materializes_the_paid_reservation() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();
  let token = h.token_for(user);
  h.fill_sample_cart(user).await;

  let initiated = h.state.orders.process_payment(user, &token, None).await.unwrap();
  h.state.orders.clear_cart(user).await.unwrap();
  assert!(h.state.orders.get_cart(user).await.unwrap().is_none());

  let payment = h.only_payment(initiated.order_id);
  h.deliver_webhook(SUCCEEDED, &payment.provider_payment_id).await.unwrap();
  h.settle().await;

  let order = h.state.orders.get_order(user, initiated.order_id).await.unwrap();
  assert_eq!(order.total_amount, 200);
  assert_eq!(order.payment_status, PaymentStatus::Paid);

  h.settle_after_transit().await;
  let delivered = h.state.orders.get_order(user, initiated.order_id).await.unwrap();
  assert_eq!(delivered.delivery_status, DeliveryProgress::Completed);
  assert_eq!(h.state.notifications.list_for_user(user, user).await.unwrap().len(), 1);
  assert!(h.bus.dead_letters().is_empty());
}

#[tokio::test]
#[serial]
async fn test_charge_not_matching_the_order_total_is_dead_lettered() {
  setup_tracing();
  let h = Harness::new();
  let user = Uuid::new_v4();
  h.fill_sample_cart(user).await;
  let order = h.state.orders.checkout(user).await.unwrap();

  let receipt = h
    .state
    .payments
    .create_payment(tiffin::models::CreatePaymentRequest {
      order_id: order.id,
      user_id: user,
      amount: 999,
      currency: None,
      payment_method: None,
    })
    .await
    .unwrap();
  h.settle().await;
  assert_eq!(h.payments.payments_for_order(order.id).len(), 1);

  h.deliver_webhook(SUCCEEDED, &receipt.provider_payment_id).await.unwrap();
  h.settle().await;

  let unpaid = h.state.orders.get_order(user, order.id).await.unwrap();
  assert_eq!(unpaid.payment_status, PaymentStatus::Pending);
  assert!(h.bus.dead_letters().iter().any(|dead| {
    dead.group == tiffin::services::order_service::CONSUMER_GROUP && dead.envelope.topic == topics::PAYMENT_SUCCEEDED
  }));
}
