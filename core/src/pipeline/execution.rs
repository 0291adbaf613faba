// core/src/pipeline/execution.rs

//! `Pipeline::run()`: executes steps in order against the shared context.

use crate::core::context::Handler;
use crate::core::context_data::ContextData;
use crate::core::control::{PipelineControl, PipelineResult};
use crate::error::CoreError;
use crate::pipeline::definition::Pipeline;
use tracing::{event, instrument, span, Instrument, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<CoreError> + Send + Sync + 'static,
{
  /// Runs every step's `before`, `on` and `after` handlers in order.
  ///
  /// A handler error aborts the run and is returned as-is. A non-optional step
  /// with no handlers at all fails with `CoreError::HandlerMissing` converted into `Err`.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(context_type = %std::any::type_name::<TData>(), num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();

      if let Some(skip_if) = &step_def.skip_if {
        if skip_if(&ctx_data) {
          event!(Level::DEBUG, step_name, "Step skipped by its skip condition.");
          continue;
        }
      }

      let has_handlers = [&self.before, &self.on, &self.after]
        .iter()
        .any(|table| table.get(step_name).is_some_and(|v| !v.is_empty()));
      if !has_handlers {
        if step_def.optional {
          event!(Level::DEBUG, step_name, "Optional step has no handlers, skipping.");
          continue;
        }
        event!(Level::ERROR, step_name, "Non-optional step has no handlers.");
        return Err(Err::from(CoreError::HandlerMissing {
          step_name: step_def.name.clone(),
        }));
      }

      let step_span = span!(Level::INFO, "pipeline_step", step_name, step_index = step_idx);
      let phases = [("before", &self.before), ("on", &self.on), ("after", &self.after)];
      for (phase, table) in phases {
        let Some(handlers) = table.get(step_name) else {
          continue;
        };
        let control = run_phase(handlers, &ctx_data, phase).instrument(step_span.clone()).await?;
        if control == PipelineControl::Stop {
          event!(Level::INFO, step_name, phase, "Pipeline stopped by a handler.");
          return Ok(PipelineResult::Stopped);
        }
      }
    }

    event!(Level::DEBUG, "Pipeline completed.");
    Ok(PipelineResult::Completed)
  }
}

async fn run_phase<TData, Err>(
  handlers: &[Handler<TData, Err>],
  ctx_data: &ContextData<TData>,
  phase: &'static str,
) -> Result<PipelineControl, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + Send + Sync + 'static,
{
  for (handler_idx, handler) in handlers.iter().enumerate() {
    match handler(ctx_data.clone()).await {
      Ok(PipelineControl::Continue) => {}
      Ok(PipelineControl::Stop) => return Ok(PipelineControl::Stop),
      Err(e) => {
        event!(Level::ERROR, phase, handler_index = handler_idx, error = %e, "Handler failed.");
        return Err(e);
      }
    }
  }
  Ok(PipelineControl::Continue)
}
