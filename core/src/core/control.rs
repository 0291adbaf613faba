// core/src/core/control.rs

//! Signals for controlling pipeline flow and the outcome of a run.

/// Returned by a handler to continue with the next handler/step or halt the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineControl {
  Continue,
  /// Halt now. No further handlers or steps run and the run reports `Stopped`.
  Stop,
}

/// Outcome of a full pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineResult {
  /// Every non-skipped step ran to completion.
  Completed,
  /// A handler returned `PipelineControl::Stop`.
  Stopped,
}
