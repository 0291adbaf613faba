// tests/error_handling_tests.rs
mod common;
use common::*;
use serial_test::serial;
use tiffin_core::{ContextData, CoreError, Pipeline, PipelineControl};

#[tokio::test]
#[serial]
async fn test_pipeline_run_catches_handler_missing() {
  setup_tracing();
  let pipeline = Pipeline::<TestContext, TestError>::new(&[("missing", false, None)]);
  let result = pipeline.run(ContextData::new(TestContext::default())).await;
  match result.unwrap_err() {
    TestError::Core(s) => {
      assert!(s.contains("HandlerMissing"));
      assert!(s.contains("missing"));
    }
    other => panic!("Expected TestError::Core(HandlerMissing), got {:?}", other),
  }
}

#[tokio::test]
#[serial]
async fn test_pipeline_with_core_error_type() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, CoreError>::new(&[("task", false, None)]);
  pipeline.on("task", |ctx: ContextData<TestContext>| async move {
    ctx.write().counter = 1;
    Ok::<PipelineControl, CoreError>(PipelineControl::Continue)
  });
  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();
  assert_eq!(ctx.read().counter, 1);

  let mut failing = Pipeline::<TestContext, CoreError>::new(&[("fail_task", false, None)]);
  failing.on("fail_task", |_ctx: ContextData<TestContext>| async move {
    Err::<PipelineControl, _>(anyhow::anyhow!("upstream refused"))
  });
  match failing.run(ContextData::new(TestContext::default())).await.unwrap_err() {
    CoreError::HandlerError { source } => assert_eq!(source.to_string(), "upstream refused"),
    other => panic!("Expected CoreError::HandlerError, got {:?}", other),
  }
}
