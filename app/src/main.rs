// app/src/main.rs

use actix_web::{web as actix_data, App, HttpServer};
use sqlx::PgPool;
use std::sync::Arc;
use tiffin::config::AppConfig;
use tiffin::errors::AppError;
use tiffin::runtime;
use tiffin::stores::postgres::PgEventBus;
use tiffin::stores::Stores;
use tiffin::web::configure_app_routes;
use tiffin_core::{EventBus, InMemoryBus};
use tokio::sync::watch;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

/// Postgres stores come with the Postgres bus; without a database both live in memory.
async fn open_backends(config: &AppConfig) -> Result<(Stores, Arc<dyn EventBus>), AppError> {
  let Some(database_url) = &config.database_url else {
    tracing::warn!("DATABASE_URL not set; using in-memory stores and bus.");
    return Ok((Stores::in_memory(), Arc::new(InMemoryBus::new(config.bus_partitions))));
  };
  let pool = PgPool::connect(database_url).await?;
  tracing::info!("Successfully connected to the database.");
  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .map_err(|e| AppError::Internal(format!("migration failed: {}", e)))?;
  let bus: Arc<dyn EventBus> = Arc::new(PgEventBus::new(pool.clone(), config.bus_partitions));
  Ok((Stores::postgres(pool), bus))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting tiffin server...");

  let app_config = AppConfig::from_env().map_err(|e| {
    tracing::error!(error = %e, "Failed to load application configuration.");
    std::io::Error::other(e.to_string())
  })?;

  let (stores, bus) = open_backends(&app_config).await.map_err(|e| {
    tracing::error!(error = %e, "Failed to open stores.");
    std::io::Error::other(e.to_string())
  })?;

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);

  let runtime = runtime::build(app_config, stores, bus, true).map_err(|e| {
    tracing::error!(error = %e, "Failed to wire services.");
    std::io::Error::other(e.to_string())
  })?;

  let (shutdown_tx, shutdown_rx) = watch::channel(false);
  tracing::info!(groups = ?runtime.workers.consumer_groups(), "Starting background workers.");
  let workers = runtime.workers.spawn(shutdown_rx);

  let app_state = runtime.state;
  tracing::info!("Attempting to bind server to {}...", server_address);
  let server = HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run();

  let result = server.await;

  tracing::info!("HTTP server stopped; stopping background workers.");
  let _ = shutdown_tx.send(true);
  for handle in workers {
    if let Err(e) = handle.await {
      tracing::error!(error = %e, "Background worker ended abnormally.");
    }
  }
  result
}
