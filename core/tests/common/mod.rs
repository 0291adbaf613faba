// tests/common/mod.rs
#![allow(dead_code)]

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::json;
use tiffin_core::{ContextData, CoreError, Envelope, FailureKind, PipelineControl};
use tracing::Level;

#[derive(Clone, Debug, Default)]
pub struct TestContext {
  pub counter: i32,
  pub message: String,
  pub steps_executed: Vec<String>,
  pub should_stop_at: Option<String>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("Kernel error: {0}")]
  Core(String),

  #[error("Test handler failed: {0}")]
  Handler(String),

  #[error("Store temporarily unavailable: {0}")]
  Unavailable(String),
}

impl From<CoreError> for TestError {
  fn from(err: CoreError) -> Self {
    TestError::Core(format!("{:?}", err))
  }
}

impl FailureKind for TestError {
  fn is_transient(&self) -> bool {
    matches!(self, TestError::Unavailable(_))
  }
}

pub fn create_simple_handler(
  step_name: &'static str,
  message_to_append: &'static str,
) -> tiffin_core::Handler<TestContext, TestError> {
  Box::new(move |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.counter += 1;
      guard.message.push_str(message_to_append);
      guard.steps_executed.push(step_name.to_string());
      if guard.should_stop_at.as_deref() == Some(step_name) {
        return Ok(PipelineControl::Stop);
      }
      Ok(PipelineControl::Continue)
    })
  })
}

pub fn create_failing_handler(
  step_name: &'static str,
  error_message: &'static str,
) -> tiffin_core::Handler<TestContext, TestError> {
  Box::new(move |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      ctx.write().steps_executed.push(step_name.to_string());
      Err(TestError::Handler(error_message.to_string()))
    })
  })
}

pub fn order_event(topic: &str, order_id: &str) -> Envelope {
  Envelope::encode(topic, order_id, 1, &json!({ "orderId": order_id })).unwrap()
}

pub fn topics(names: &[&str]) -> Vec<String> {
  names.iter().map(|s| s.to_string()).collect()
}

pub type Seen = Arc<parking_lot::Mutex<Vec<String>>>;

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
