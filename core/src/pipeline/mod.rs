// core/src/pipeline/mod.rs

//! A small named-step pipeline runner. The webhook receiver and the active
//! poller are expressed as ordered steps over a shared `ContextData<T>`, each
//! step free to stop the run early once it has produced an outcome.

pub mod context_data;
pub mod control;
pub mod definition;
pub mod execution;

pub use context_data::ContextData;
pub use control::{PipelineControl, PipelineResult};
pub use definition::{Handler, Pipeline, SkipCondition, StepDef};
