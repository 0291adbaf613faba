// app/src/pipelines/mod.rs

//! Multi-step request handling, one pipeline per operation.
//!
//! Pipelines are built once when a service is constructed and run per request
//! against a fresh `ContextData`.

pub mod common_steps;
pub mod contexts;

pub mod checkout_pipeline;
pub mod create_payment_pipeline;
pub mod process_payment_pipeline;
pub mod webhook_pipeline;

pub use checkout_pipeline::build_checkout_pipeline;
pub use create_payment_pipeline::build_create_payment_pipeline;
pub use process_payment_pipeline::build_process_payment_pipeline;
pub use webhook_pipeline::{build_webhook_pipeline, ProviderEvent, WebhookOutcome};
