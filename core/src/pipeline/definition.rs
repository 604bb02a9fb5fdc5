// core/src/pipeline/definition.rs

use super::context_data::ContextData;
use super::control::PipelineControl;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed step handler. Takes a clone of the shared context and resolves to
/// the control signal for the rest of the run.
pub type Handler<TData, Err> = Box<
  dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<PipelineControl, Err>> + Send>>
    + Send
    + Sync,
>;

/// Evaluated before a step runs; `true` skips the step.
pub type SkipCondition<TData> = Arc<dyn Fn(&TData) -> bool + Send + Sync + 'static>;

#[derive(Clone)]
pub struct StepDef<TData: 'static + Send + Sync> {
  pub name: String,
  pub optional: bool,
  pub skip_if: Option<SkipCondition<TData>>,
}

impl<TData: 'static + Send + Sync> std::fmt::Debug for StepDef<TData> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepDef")
      .field("name", &self.name)
      .field("optional", &self.optional)
      .field("skip_if_present", &self.skip_if.is_some())
      .finish()
  }
}

/// Ordered named steps over `ContextData<TData>`, with handlers returning `Err`.
///
/// `Err` must absorb the crate error so that configuration faults (a
/// required step with no handler) surface through the same channel.
pub struct Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<crate::error::Error> + Send + Sync + 'static,
{
  pub(crate) name: String,
  pub(crate) steps: Vec<StepDef<TData>>,
  pub(crate) on: HashMap<String, Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<crate::error::Error> + Send + Sync + 'static,
{
  /// Creates a pipeline from `(step_name, optional)` pairs, in run order.
  pub fn new(name: &str, step_defs: &[(&str, bool)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(step, optional)| StepDef {
        name: (*step).to_string(),
        optional: *optional,
        skip_if: None,
      })
      .collect();

    Self {
      name: name.to_string(),
      steps,
      on: HashMap::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  // Step names are fixed at construction; a typo is a programming error.
  fn ensure_step_exists(&self, step_name: &str) {
    if !self.steps.iter().any(|s| s.name == step_name) {
      panic!(
        "Pipeline setup error: step '{}' not found in pipeline '{}'.",
        step_name, self.name
      );
    }
  }

  pub fn set_skip_condition(&mut self, step_name: &str, skip_if: impl Fn(&TData) -> bool + Send + Sync + 'static) {
    self.ensure_step_exists(step_name);
    if let Some(step) = self.steps.iter_mut().find(|s| s.name == step_name) {
      step.skip_if = Some(Arc::new(skip_if));
    }
  }

  /// Registers a handler for a step. Handlers for one step run in
  /// registration order.
  pub fn on_root<F, UserProvidedErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<PipelineControl, UserProvidedErr>> + Send + 'static,
    UserProvidedErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    let final_handler: Handler<TData, Err> = Box::new(move |ctx_data| {
      let user_fut = handler_fn(ctx_data);
      Box::pin(async move { user_fut.await.map_err(Into::into) })
    });
    self.on.entry(step_name.to_string()).or_default().push(final_handler);
  }
}
