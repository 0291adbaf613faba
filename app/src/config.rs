// app/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

/// Which services' background workers (consumers, relays, sweeps) this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnabledServices {
  pub order: bool,
  pub payment: bool,
  pub delivery: bool,
  pub notification: bool,
}

impl EnabledServices {
  pub fn all() -> Self {
    Self {
      order: true,
      payment: true,
      delivery: true,
      notification: true,
    }
  }

  pub fn parse(list: &str) -> Result<Self> {
    let mut enabled = Self {
      order: false,
      payment: false,
      delivery: false,
      notification: false,
    };
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
      match name {
        "order" => enabled.order = true,
        "payment" => enabled.payment = true,
        "delivery" => enabled.delivery = true,
        "notification" => enabled.notification = true,
        other => return Err(AppError::Config(format!("Unknown service '{}' in TIFFIN_SERVICES", other))),
      }
    }
    Ok(enabled)
  }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  /// In-memory stores are used when absent.
  pub database_url: Option<String>,
  pub services: EnabledServices,

  pub auth_token_secret: String,

  /// The mock gateway is used when absent.
  pub stripe_secret_key: Option<String>,
  pub stripe_api_base: String,
  pub stripe_webhook_secret: String,
  pub stripe_webhook_tolerance_secs: i64,
  pub payment_default_currency: String,
  /// When set, the deferred checkout flow reaches the payment service over HTTP.
  pub payments_base_url: Option<String>,

  pub delivery_transit_secs: i64,
  pub delivery_sweep_interval_ms: u64,
  pub delivery_drivers: Vec<String>,
  pub delivery_start_lat: f64,
  pub delivery_start_lng: f64,

  pub bus_partitions: u32,
  pub consumer_poll_interval_ms: u64,
  pub consumer_max_deliveries: u32,
  pub outbox_poll_interval_ms: u64,
  pub outbox_batch_size: usize,
  pub outbox_max_attempts: u32,
}

fn optional(var_name: &str) -> Option<String> {
  env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

fn required(var_name: &str) -> Result<String> {
  optional(var_name).ok_or_else(|| AppError::Config(format!("Missing environment variable '{}'", var_name)))
}

fn parsed<T>(var_name: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match optional(var_name) {
    Some(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {}: {}", var_name, e))),
    None => Ok(default),
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();

    let services = match optional("TIFFIN_SERVICES") {
      Some(list) => EnabledServices::parse(&list)?,
      None => EnabledServices::all(),
    };

    let delivery_drivers = optional("DELIVERY_DRIVERS")
      .map(|list| {
        list
          .split(',')
          .map(|s| s.trim().to_string())
          .filter(|s| !s.is_empty())
          .collect::<Vec<_>>()
      })
      .filter(|drivers| !drivers.is_empty())
      .unwrap_or_else(|| vec!["ServiceEats Delivery".to_string()]);

    let payment_default_currency = optional("PAYMENT_DEFAULT_CURRENCY")
      .unwrap_or_else(|| "inr".to_string())
      .to_lowercase();

    let config = Self {
      server_host: optional("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
      server_port: parsed("SERVER_PORT", 8080)?,
      database_url: optional("DATABASE_URL"),
      services,
      auth_token_secret: required("AUTH_TOKEN_SECRET")?,
      stripe_secret_key: optional("STRIPE_SECRET_KEY"),
      stripe_api_base: optional("STRIPE_API_BASE").unwrap_or_else(|| "https://api.stripe.com".to_string()),
      stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
      stripe_webhook_tolerance_secs: parsed("STRIPE_WEBHOOK_TOLERANCE_SECS", 300)?,
      payment_default_currency,
      payments_base_url: optional("PAYMENTS_BASE_URL"),
      delivery_transit_secs: parsed("DELIVERY_TRANSIT_SECS", 15)?,
      delivery_sweep_interval_ms: parsed("DELIVERY_SWEEP_INTERVAL_MS", 1000)?,
      delivery_drivers,
      delivery_start_lat: parsed("DELIVERY_START_LAT", 12.9716)?,
      delivery_start_lng: parsed("DELIVERY_START_LNG", 77.5946)?,
      bus_partitions: parsed("BUS_PARTITIONS", 4)?,
      consumer_poll_interval_ms: parsed("CONSUMER_POLL_INTERVAL_MS", 200)?,
      consumer_max_deliveries: parsed("CONSUMER_MAX_DELIVERIES", 8)?,
      outbox_poll_interval_ms: parsed("OUTBOX_POLL_INTERVAL_MS", 200)?,
      outbox_batch_size: parsed("OUTBOX_BATCH_SIZE", 32)?,
      outbox_max_attempts: parsed("OUTBOX_MAX_ATTEMPTS", 10)?,
    };

    tracing::info!(
      services = ?config.services,
      persistent = config.database_url.is_some(),
      stripe = config.stripe_secret_key.is_some(),
      "Application configuration loaded successfully."
    );
    Ok(config)
  }

  /// Configuration for tests and local runs: in-memory stores, mock gateway, all services.
  pub fn for_local(auth_token_secret: &str, stripe_webhook_secret: &str) -> Self {
    Self {
      server_host: "127.0.0.1".to_string(),
      server_port: 8080,
      database_url: None,
      services: EnabledServices::all(),
      auth_token_secret: auth_token_secret.to_string(),
      stripe_secret_key: None,
      stripe_api_base: "https://api.stripe.com".to_string(),
      stripe_webhook_secret: stripe_webhook_secret.to_string(),
      stripe_webhook_tolerance_secs: 300,
      payment_default_currency: "inr".to_string(),
      payments_base_url: None,
      delivery_transit_secs: 15,
      delivery_sweep_interval_ms: 1000,
      delivery_drivers: vec!["ServiceEats Delivery".to_string()],
      delivery_start_lat: 12.9716,
      delivery_start_lng: 77.5946,
      bus_partitions: 4,
      consumer_poll_interval_ms: 200,
      consumer_max_deliveries: 8,
      outbox_poll_interval_ms: 200,
      outbox_batch_size: 32,
      outbox_max_attempts: 10,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn service_list_parsing() {
    let only = EnabledServices::parse("delivery, notification").unwrap();
    assert!(!only.order && !only.payment && only.delivery && only.notification);
    assert!(matches!(EnabledServices::parse("order,billing"), Err(AppError::Config(_))));
  }
}
