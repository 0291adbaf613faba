// app/src/stores/postgres/orders.rs

use super::is_unique_violation;
use super::outbox::{insert_envelopes, PgOutbox};
use crate::errors::{AppError, Result};
use crate::models::{Cart, CartItem, CartStatus, CheckoutReservation, DeliveryProgress, Order, OrderItem, PaymentStatus};
use crate::stores::OrderStore;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tiffin_core::{Envelope, OutboxStore};
use uuid::Uuid;

const OUTBOX_TABLE: &str = "order_outbox";

#[derive(Clone)]
pub struct PgOrderStore {
  pool: PgPool,
}

impl PgOrderStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

fn cart_from_row(row: &PgRow) -> Result<Cart> {
  let items: Json<Vec<CartItem>> = row.try_get("items")?;
  let status: String = row.try_get("status")?;
  Ok(Cart {
    id: row.try_get("id")?,
    user_id: row.try_get("user_id")?,
    restaurant_id: row.try_get("restaurant_id")?,
    restaurant_name: row.try_get("restaurant_name")?,
    items: items.0,
    total_amount: row.try_get("total_amount")?,
    status: status.parse::<CartStatus>()?,
    checkout_ref: row.try_get("checkout_ref")?,
    version: row.try_get("version")?,
    created_at: row.try_get("created_at")?,
    updated_at: row.try_get("updated_at")?,
  })
}

fn reservation_from_row(row: &PgRow) -> Result<CheckoutReservation> {
  let items: Json<Vec<CartItem>> = row.try_get("items")?;
  Ok(CheckoutReservation {
    order_id: row.try_get("order_id")?,
    cart_id: row.try_get("cart_id")?,
    user_id: row.try_get("user_id")?,
    restaurant_id: row.try_get("restaurant_id")?,
    restaurant_name: row.try_get("restaurant_name")?,
    items: items.0,
    total_amount: row.try_get("total_amount")?,
    created_at: row.try_get("created_at")?,
  })
}

fn order_from_row(row: &PgRow) -> Result<Order> {
  let items: Json<Vec<OrderItem>> = row.try_get("items")?;
  let payment_status: String = row.try_get("payment_status")?;
  let delivery_status: String = row.try_get("delivery_status")?;
  Ok(Order {
    id: row.try_get("id")?,
    user_id: row.try_get("user_id")?,
    restaurant_id: row.try_get("restaurant_id")?,
    restaurant_name: row.try_get("restaurant_name")?,
    items: items.0,
    total_amount: row.try_get("total_amount")?,
    payment_status: payment_status.parse::<PaymentStatus>()?,
    delivery_status: delivery_status.parse::<DeliveryProgress>()?,
    created_at: row.try_get("created_at")?,
    updated_at: row.try_get("updated_at")?,
  })
}

const INSERT_ORDER: &str = "INSERT INTO orders \
  (id, user_id, restaurant_id, restaurant_name, items, total_amount, payment_status, delivery_status, created_at, updated_at) \
  VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)";

fn bind_order<'q>(
  query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
  order: &'q Order,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
  query
    .bind(order.id)
    .bind(order.user_id)
    .bind(&order.restaurant_id)
    .bind(&order.restaurant_name)
    .bind(Json(&order.items))
    .bind(order.total_amount)
    .bind(order.payment_status.as_str())
    .bind(order.delivery_status.as_str())
    .bind(order.created_at)
    .bind(order.updated_at)
}

const UPDATE_CART: &str = "UPDATE carts SET restaurant_id = $2, restaurant_name = $3, items = $4, total_amount = $5, \
  checkout_ref = $6, version = $7, updated_at = $8 \
  WHERE id = $1 AND status = 'active' AND version = $9";

fn bind_cart_update<'q>(
  query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
  cart: &'q Cart,
  expected_version: i32,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
  query
    .bind(cart.id)
    .bind(&cart.restaurant_id)
    .bind(&cart.restaurant_name)
    .bind(Json(&cart.items))
    .bind(cart.total_amount)
    .bind(cart.checkout_ref)
    .bind(cart.version)
    .bind(cart.updated_at)
    .bind(expected_version)
}

#[async_trait]
impl OrderStore for PgOrderStore {
  async fn active_cart(&self, user_id: Uuid) -> Result<Option<Cart>> {
    let row = sqlx::query("SELECT * FROM carts WHERE user_id = $1 AND status = 'active'")
      .bind(user_id)
      .fetch_optional(&self.pool)
      .await?;
    row.as_ref().map(cart_from_row).transpose()
  }

  async fn get_cart(&self, cart_id: Uuid) -> Result<Option<Cart>> {
    let row = sqlx::query("SELECT * FROM carts WHERE id = $1")
      .bind(cart_id)
      .fetch_optional(&self.pool)
      .await?;
    row.as_ref().map(cart_from_row).transpose()
  }

  async fn insert_cart(&self, cart: &Cart) -> Result<()> {
    let result = sqlx::query(
      "INSERT INTO carts \
       (id, user_id, restaurant_id, restaurant_name, items, total_amount, status, checkout_ref, version, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(cart.id)
    .bind(cart.user_id)
    .bind(&cart.restaurant_id)
    .bind(&cart.restaurant_name)
    .bind(Json(&cart.items))
    .bind(cart.total_amount)
    .bind(cart.status.as_str())
    .bind(cart.checkout_ref)
    .bind(cart.version)
    .bind(cart.created_at)
    .bind(cart.updated_at)
    .execute(&self.pool)
    .await;
    match result {
      Ok(_) => Ok(()),
      Err(e) if is_unique_violation(&e) => Err(AppError::Conflict(format!(
        "User {} already has an active cart",
        cart.user_id
      ))),
      Err(e) => Err(e.into()),
    }
  }

  async fn save_cart(&self, cart: &Cart, expected_version: i32) -> Result<bool> {
    let result = bind_cart_update(sqlx::query(UPDATE_CART), cart, expected_version)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() == 1)
  }

  async fn delete_cart(&self, cart_id: Uuid, expected_version: i32) -> Result<bool> {
    let result = sqlx::query("DELETE FROM carts WHERE id = $1 AND status = 'active' AND version = $2")
      .bind(cart_id)
      .bind(expected_version)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() == 1)
  }

  async fn place_order(
    &self,
    order: &Order,
    cart_id: Uuid,
    expected_version: i32,
    events: Vec<Envelope>,
  ) -> Result<bool> {
    let mut tx = self.pool.begin().await?;
    let flipped = sqlx::query(
      "UPDATE carts SET status = 'ordered', version = version + 1, updated_at = $3 \
       WHERE id = $1 AND status = 'active' AND version = $2",
    )
    .bind(cart_id)
    .bind(expected_version)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    if flipped.rows_affected() != 1 {
      tx.rollback().await?;
      return Ok(false);
    }
    bind_order(sqlx::query(INSERT_ORDER), order).execute(&mut *tx).await?;
    insert_envelopes(&mut tx, OUTBOX_TABLE, &events).await?;
    tx.commit().await?;
    Ok(true)
  }

  async fn reserve_checkout(
    &self,
    cart: &Cart,
    expected_version: i32,
    reservation: &CheckoutReservation,
  ) -> Result<bool> {
    let mut tx = self.pool.begin().await?;
    let saved = bind_cart_update(sqlx::query(UPDATE_CART), cart, expected_version)
      .execute(&mut *tx)
      .await?;
    if saved.rows_affected() != 1 {
      tx.rollback().await?;
      return Ok(false);
    }
    sqlx::query(
      "INSERT INTO checkout_reservations \
       (order_id, cart_id, user_id, restaurant_id, restaurant_name, items, total_amount, created_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(reservation.order_id)
    .bind(reservation.cart_id)
    .bind(reservation.user_id)
    .bind(&reservation.restaurant_id)
    .bind(&reservation.restaurant_name)
    .bind(Json(&reservation.items))
    .bind(reservation.total_amount)
    .bind(reservation.created_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(true)
  }

  async fn reservation(&self, order_id: Uuid) -> Result<Option<CheckoutReservation>> {
    let row = sqlx::query("SELECT * FROM checkout_reservations WHERE order_id = $1")
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await?;
    row.as_ref().map(reservation_from_row).transpose()
  }

  async fn materialize_order(&self, order: &Order, cart_id: Uuid) -> Result<bool> {
    let mut tx = self.pool.begin().await?;
    let insert_sql = format!("{} ON CONFLICT (id) DO NOTHING", INSERT_ORDER);
    let inserted = bind_order(sqlx::query(&insert_sql), order).execute(&mut *tx).await?;
    if inserted.rows_affected() == 0 {
      tx.rollback().await?;
      return Ok(false);
    }
    sqlx::query(
      "UPDATE carts SET status = 'ordered', version = version + 1, updated_at = $2 \
       WHERE id = $1 AND status = 'active' AND checkout_ref = $3",
    )
    .bind(cart_id)
    .bind(Utc::now())
    .bind(order.id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(true)
  }

  async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>> {
    let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await?;
    row.as_ref().map(order_from_row).transpose()
  }

  async fn orders_for_user(&self, user_id: Uuid, offset: u64, limit: u32) -> Result<(Vec<Order>, u64)> {
    let rows = sqlx::query("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC OFFSET $2 LIMIT $3")
      .bind(user_id)
      .bind(offset as i64)
      .bind(i64::from(limit))
      .fetch_all(&self.pool)
      .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
      .bind(user_id)
      .fetch_one(&self.pool)
      .await?;
    let orders = rows.iter().map(order_from_row).collect::<Result<Vec<_>>>()?;
    Ok((orders, total.max(0) as u64))
  }

  async fn set_payment_status(&self, order_id: Uuid, from: PaymentStatus, to: PaymentStatus) -> Result<bool> {
    let result =
      sqlx::query("UPDATE orders SET payment_status = $3, updated_at = $4 WHERE id = $1 AND payment_status = $2")
        .bind(order_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
    Ok(result.rows_affected() == 1)
  }

  async fn set_delivery_status(&self, order_id: Uuid, from: DeliveryProgress, to: DeliveryProgress) -> Result<bool> {
    let result =
      sqlx::query("UPDATE orders SET delivery_status = $3, updated_at = $4 WHERE id = $1 AND delivery_status = $2")
        .bind(order_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
    Ok(result.rows_affected() == 1)
  }

  fn outbox(&self) -> Arc<dyn OutboxStore> {
    Arc::new(PgOutbox::new(self.pool.clone(), OUTBOX_TABLE))
  }
}
