// tests/pipeline_execution_tests.rs
mod common;

use common::*;
use serial_test::serial;
use std::sync::Arc;
use tiffin_core::{ContextData, Pipeline, PipelineControl, PipelineResult};

#[tokio::test]
#[serial]
async fn test_pipeline_runs_steps_in_order() {
  setup_tracing();
  let mut pipeline =
    Pipeline::<TestContext, TestError>::new(&[("step1", false, None), ("step2", false, None), ("step3", false, None)]);

  pipeline.on("step1", create_simple_handler("step1", " S1"));
  pipeline.on("step2", create_simple_handler("step2", " S2"));
  pipeline.on("step3", create_simple_handler("step3", " S3"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  let guard = ctx.read();
  assert_eq!(guard.counter, 3);
  assert_eq!(guard.message, " S1 S2 S3");
  assert_eq!(guard.steps_executed, vec!["step1", "step2", "step3"]);
}

#[tokio::test]
#[serial]
async fn test_pipeline_stops_on_pipeline_control_stop() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("validate", false, None),
    ("reserve", false, None),
    ("emit", false, None),
  ]);

  pipeline.on("validate", create_simple_handler("validate", "V"));
  pipeline.on("reserve", create_simple_handler("reserve", "R"));
  pipeline.on("emit", create_simple_handler("emit", "E"));

  let ctx = ContextData::new(TestContext {
    should_stop_at: Some("reserve".to_string()),
    ..TestContext::default()
  });
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Stopped);
  assert_eq!(ctx.read().steps_executed, vec!["validate", "reserve"]);
}

#[tokio::test]
#[serial]
async fn test_pipeline_propagates_handler_error() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("good_step", false, None),
    ("bad_step", false, None),
    ("another_step", false, None),
  ]);

  pipeline.on("good_step", create_simple_handler("good_step", "Good"));
  pipeline.on("bad_step", create_failing_handler("bad_step", "card declined"));
  pipeline.on("another_step", create_simple_handler("another_step", "NeverRun"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap_err(), TestError::Handler("card declined".to_string()));
  let guard = ctx.read();
  assert_eq!(guard.message, "Good");
  assert_eq!(guard.steps_executed, vec!["good_step", "bad_step"]);
}

#[tokio::test]
#[serial]
async fn test_pipeline_skips_step_if_condition_met() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("step1", false, None),
    (
      "step_to_skip",
      false,
      Some(Arc::new(|ctx: &ContextData<TestContext>| ctx.read().counter > 0)),
    ),
    ("step3", false, None),
  ]);

  pipeline.on("step1", create_simple_handler("step1", " S1"));
  pipeline.on("step_to_skip", create_simple_handler("step_to_skip", " SKIPPED"));
  pipeline.on("step3", create_simple_handler("step3", " S3"));

  let ctx = ContextData::new(TestContext::default());
  assert_eq!(pipeline.run(ctx.clone()).await.unwrap(), PipelineResult::Completed);
  assert_eq!(ctx.read().steps_executed, vec!["step1", "step3"]);
}

#[tokio::test]
#[serial]
async fn test_optional_step_missing_handler_succeeds() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("audit", true, None), ("main", false, None)]);
  pipeline.on("main", create_simple_handler("main", "M"));

  let ctx = ContextData::new(TestContext::default());
  assert_eq!(pipeline.run(ctx.clone()).await.unwrap(), PipelineResult::Completed);
  assert_eq!(ctx.read().steps_executed, vec!["main"]);
}

#[tokio::test]
#[serial]
async fn test_before_on_after_execution_order() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("main_step", false, None)]);

  pipeline.after("main_step", create_simple_handler("after_main", "After;"));
  pipeline.on("main_step", create_simple_handler("on_main", "On;"));
  pipeline.before("main_step", create_simple_handler("before_main", "Before;"));

  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();

  let guard = ctx.read();
  assert_eq!(guard.message, "Before;On;After;");
  assert_eq!(guard.steps_executed, vec!["before_main", "on_main", "after_main"]);
}

#[tokio::test]
#[serial]
async fn test_closure_handlers_can_await_between_short_guards() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("io", false, None)]);
  pipeline.on("io", |ctx: ContextData<TestContext>| async move {
    let current = ctx.read().counter;
    tokio::task::yield_now().await;
    ctx.write().counter = current + 10;
    Ok::<_, TestError>(PipelineControl::Continue)
  });

  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();
  assert_eq!(ctx.read().counter, 10);
}

#[test]
#[should_panic(expected = "not found in pipeline definition")]
fn test_registering_unknown_step_panics() {
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("known", false, None)]);
  pipeline.on("unknown", create_simple_handler("unknown", ""));
}
