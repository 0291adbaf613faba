// tests/http_tests.rs
mod common;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use common::*;
use serde_json::{json, Value};
use serial_test::serial;
use tiffin::web::configure_app_routes;
use uuid::Uuid;

macro_rules! app {
  ($harness:expr) => {
    test::init_service(
      App::new()
        .app_data(web::Data::new($harness.state.clone()))
        .configure(configure_app_routes),
    )
    .await
  };
}

fn bearer(token: &str) -> (&'static str, String) {
  ("Authorization", format!("Bearer {}", token))
}

#[actix_web::test]
#[serial]
async fn test_health_needs_no_token() {
  setup_tracing();
  let h = Harness::new();
  let app = app!(h);
  let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
#[serial]
async fn test_cart_routes_require_a_valid_token() {
  setup_tracing();
  let h = Harness::new();
  let app = app!(h);

  let missing = test::call_service(&app, test::TestRequest::get().uri("/api/cart").to_request()).await;
  assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

  let forged = test::TestRequest::get()
    .uri("/api/cart")
    .insert_header(bearer(&format!("v1.{}.9999999999.deadbeef", Uuid::new_v4())))
    .to_request();
  let resp = test::call_service(&app, forged).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["error"], "unauthorized");
}

#[actix_web::test]
#[serial]
async fn test_cart_to_checkout_over_http() {
  setup_tracing();
  let h = Harness::new();
  let app = app!(h);
  let user = Uuid::new_v4();
  let token = h.token_for(user);

  for (item, price, quantity) in [("paneer-tikka", 100, 1), ("garlic-naan", 50, 3)] {
    let req = test::TestRequest::post()
      .uri("/api/cart/items")
      .insert_header(bearer(&token))
      .set_json(json!({
        "restaurantId": "rest-1",
        "restaurantName": "Spice Route",
        "menuItemId": item,
        "name": item,
        "price": price,
        "quantity": quantity,
      }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
  }

  let patch = test::TestRequest::patch()
    .uri("/api/cart/items/garlic-naan")
    .insert_header(bearer(&token))
    .set_json(json!({ "quantity": 2 }))
    .to_request();
  let cart: Value = test::call_and_read_body_json(&app, patch).await;
  assert_eq!(cart["cart"]["totalAmount"], 200);

  let checkout = test::TestRequest::post()
    .uri("/api/cart/checkout")
    .insert_header(bearer(&token))
    .to_request();
  let resp = test::call_service(&app, checkout).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["order"]["totalAmount"], 200);
  assert_eq!(body["order"]["paymentStatus"], "pending");
  let order_id = body["order"]["id"].as_str().unwrap().to_string();

  let again = test::TestRequest::post()
    .uri("/api/cart/checkout")
    .insert_header(bearer(&token))
    .to_request();
  let resp = test::call_service(&app, again).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["error"], "empty_cart");

  let get = test::TestRequest::get()
    .uri(&format!("/api/orders/{}", order_id))
    .insert_header(bearer(&token))
    .to_request();
  let order: Value = test::call_and_read_body_json(&app, get).await;
  assert_eq!(order["id"], order_id.as_str());

  let stranger = h.token_for(Uuid::new_v4());
  let peek = test::TestRequest::get()
    .uri(&format!("/api/orders/{}", order_id))
    .insert_header(bearer(&stranger))
    .to_request();
  assert_eq!(test::call_service(&app, peek).await.status(), StatusCode::FORBIDDEN);

  let delivery = test::TestRequest::get()
    .uri(&format!("/api/deliveries/{}", order_id))
    .insert_header(bearer(&token))
    .to_request();
  assert_eq!(test::call_service(&app, delivery).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
#[serial]
async fn test_payments_and_webhook_over_http() {
  setup_tracing();
  let h = Harness::new();
  let app = app!(h);
  let user = Uuid::new_v4();
  let token = h.token_for(user);
  let order_id = Uuid::new_v4();
  let request = json!({ "orderId": order_id, "userId": user, "amount": 200, "paymentMethod": "card" });

  let on_behalf = test::TestRequest::post()
    .uri("/api/payments")
    .insert_header(bearer(&h.token_for(Uuid::new_v4())))
    .set_json(&request)
    .to_request();
  assert_eq!(test::call_service(&app, on_behalf).await.status(), StatusCode::FORBIDDEN);

  let create = test::TestRequest::post()
    .uri("/api/payments")
    .insert_header(bearer(&token))
    .set_json(&request)
    .to_request();
  let resp = test::call_service(&app, create).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let receipt: Value = test::read_body_json(resp).await;
  assert_eq!(receipt["status"], "processing");
  let provider_id = receipt["providerPaymentId"].as_str().unwrap().to_string();

  let duplicate = test::TestRequest::post()
    .uri("/api/payments")
    .insert_header(bearer(&token))
    .set_json(&request)
    .to_request();
  let resp = test::call_service(&app, duplicate).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["error"], "duplicate_payment");

  let body = webhook_body("payment_intent.succeeded", &provider_id);
  let unsigned = test::TestRequest::post()
    .uri("/api/payments/webhooks/stripe")
    .set_payload(body.clone())
    .to_request();
  assert_eq!(test::call_service(&app, unsigned).await.status(), StatusCode::BAD_REQUEST);

  let signed = test::TestRequest::post()
    .uri("/api/payments/webhooks/stripe")
    .insert_header(("Stripe-Signature", sign(WEBHOOK_SECRET, &body)))
    .set_payload(body)
    .to_request();
  let ack: Value = test::call_and_read_body_json(&app, signed).await;
  assert_eq!(ack["outcome"], "applied");

  let view = test::TestRequest::get()
    .uri(&format!("/api/payments/{}", order_id))
    .insert_header(bearer(&token))
    .to_request();
  let view: Value = test::call_and_read_body_json(&app, view).await;
  assert_eq!(view["payment"]["status"], "succeeded");
  assert_eq!(view["payment"]["chargeId"], "ch_test_1");
}

#[actix_web::test]
#[serial]
async fn test_process_payment_over_http() {
  setup_tracing();
  let h = Harness::new();
  let app = app!(h);
  let user = Uuid::new_v4();
  let token = h.token_for(user);

  let empty = test::TestRequest::post()
    .uri("/api/orders/process-payment")
    .insert_header(bearer(&token))
    .to_request();
  assert_eq!(test::call_service(&app, empty).await.status(), StatusCode::BAD_REQUEST);

  h.fill_sample_cart(user).await;
  let req = test::TestRequest::post()
    .uri("/api/orders/process-payment")
    .insert_header(bearer(&token))
    .set_json(json!({ "paymentMethod": "wallet" }))
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["success"], true);
  assert!(body["orderId"].is_string());
  assert!(body["message"].is_string());

  let notifications = test::TestRequest::get()
    .uri("/api/notifications")
    .insert_header(bearer(&token))
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, notifications).await;
  assert_eq!(body["notifications"].as_array().map(Vec::len), Some(0));
}
