// app/src/lib.rs

//! tiffin: order, payment, delivery and notification services choreographed
//! over the `tiffin_core` event bus.

pub mod config;
pub mod contracts;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod runtime;
pub mod services;
pub mod state;
pub mod stores;
pub mod web;
