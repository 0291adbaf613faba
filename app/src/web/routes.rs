// app/src/web/routes.rs

use crate::web::handlers::{
  cart_handlers, delivery_handlers, notification_handlers, order_handlers, payment_handlers,
};
use actix_web::web;

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.route("/health", web::get().to(health_check_handler)).service(
    web::scope("/api")
      .service(
        web::scope("/cart")
          .route("", web::get().to(cart_handlers::get_cart_handler))
          .route("", web::delete().to(cart_handlers::clear_cart_handler))
          .route("/items", web::post().to(cart_handlers::add_item_handler))
          .route("/items/{menu_item_id}", web::patch().to(cart_handlers::update_item_handler))
          .route("/items/{menu_item_id}", web::delete().to(cart_handlers::remove_item_handler))
          .route("/checkout", web::post().to(cart_handlers::checkout_handler)),
      )
      .service(
        web::scope("/orders")
          .route("", web::get().to(order_handlers::list_own_orders_handler))
          .route("/process-payment", web::post().to(order_handlers::process_payment_handler))
          .route("/user/{user_id}", web::get().to(order_handlers::list_user_orders_handler))
          .route("/{order_id}", web::get().to(order_handlers::get_order_handler)),
      )
      .service(
        web::scope("/payments")
          .route("", web::post().to(payment_handlers::create_payment_handler))
          .route("/webhooks/stripe", web::post().to(payment_handlers::stripe_webhook_handler))
          .route("/{order_id}", web::get().to(payment_handlers::get_payment_handler)),
      )
      .route("/deliveries/{order_id}", web::get().to(delivery_handlers::get_delivery_handler))
      .route("/notifications", web::get().to(notification_handlers::list_notifications_handler)),
  );
}
