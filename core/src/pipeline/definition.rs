// core/src/pipeline/definition.rs

//! The `Pipeline<TData, Err>` struct and its construction.

use crate::core::context::Handler;
use crate::core::step::{SkipCondition, StepDef};
use crate::error::CoreError;
use std::collections::HashMap;

/// An ordered list of named steps, each with `before`/`on`/`after` handlers,
/// run against one shared `ContextData<TData>`.
///
/// `Err` is the error type handlers return; it must absorb `CoreError` so
/// configuration problems (a non-optional step without handlers) surface
/// through the same channel.
pub struct Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<CoreError> + Send + Sync + 'static,
{
  pub(crate) steps: Vec<StepDef<TData>>,
  pub(crate) before: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) on: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) after: HashMap<String, Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<CoreError> + Send + Sync + 'static,
{
  /// Creates a pipeline from `(name, optional, skip_if)` step definitions.
  pub fn new(step_defs: &[(&str, bool, Option<SkipCondition<TData>>)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(name, optional, skip_if)| StepDef {
        name: (*name).to_string(),
        optional: *optional,
        skip_if: skip_if.clone(),
      })
      .collect();

    Self {
      steps,
      before: HashMap::new(),
      on: HashMap::new(),
      after: HashMap::new(),
    }
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  /// Panics when `step_name` is not part of the definition. Registering a
  /// handler for an unknown step is a wiring mistake, caught at startup.
  pub(crate) fn ensure_step_exists(&self, step_name: &str) {
    if !self.steps.iter().any(|s| s.name == step_name) {
      panic!("Pipeline setup error: step '{}' not found in pipeline definition.", step_name);
    }
  }

  pub fn set_skip_condition(&mut self, step_name: &str, skip_if: Option<SkipCondition<TData>>) {
    self.ensure_step_exists(step_name);
    if let Some(step) = self.steps.iter_mut().find(|s| s.name == step_name) {
      step.skip_if = skip_if;
    }
  }
}
