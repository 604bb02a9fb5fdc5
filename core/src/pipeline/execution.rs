// core/src/pipeline/execution.rs

use super::context_data::ContextData;
use super::control::{PipelineControl, PipelineResult};
use super::definition::Pipeline;
use crate::error::Error;
use tracing::{event, Instrument, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<Error> + Send + Sync + 'static,
{
  /// Runs every step in order against `ctx_data`.
  ///
  /// A handler error aborts the run and is returned as-is. A required step
  /// with no handler yields `Error::HandlerMissing` converted into `Err`.
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    let run_span = tracing::info_span!("pipeline_run", pipeline = %self.name, num_steps = self.steps.len());
    self.run_steps(ctx_data).instrument(run_span).await
  }

  async fn run_steps(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    event!(Level::DEBUG, "Pipeline execution starting.");

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();

      if let Some(skip_cond) = &step_def.skip_if {
        // Guard dropped before anything is awaited.
        let skip = skip_cond(&ctx_data.read());
        if skip {
          event!(Level::DEBUG, step = step_name, "Step skipped by its skip condition.");
          continue;
        }
      }

      let handlers = match self.on.get(step_name) {
        Some(handlers) if !handlers.is_empty() => handlers,
        _ if step_def.optional => {
          event!(Level::DEBUG, step = step_name, "Optional step has no handlers, skipping.");
          continue;
        }
        _ => {
          event!(Level::ERROR, step = step_name, "Non-optional step has no handlers.");
          return Err(Err::from(Error::HandlerMissing {
            step_name: step_def.name.clone(),
          }));
        }
      };

      let step_span = tracing::debug_span!("pipeline_step", step = step_name, step_index = step_idx);
      for handler_fn in handlers {
        match handler_fn(ctx_data.clone()).instrument(step_span.clone()).await {
          Ok(PipelineControl::Continue) => {}
          Ok(PipelineControl::Stop) => {
            event!(Level::DEBUG, step = step_name, "Pipeline stopped by handler.");
            return Ok(PipelineResult::Stopped);
          }
          Err(e) => {
            event!(Level::WARN, step = step_name, error = %e, "Step handler failed.");
            return Err(e);
          }
        }
      }
    }

    event!(Level::DEBUG, "Pipeline execution completed.");
    Ok(PipelineResult::Completed)
  }
}
