//! `engine` crate — step graph, value-reference resolution, and the executor.

pub mod models;
pub mod error;
pub mod dag;
pub mod resolve;
pub mod executor;

pub use models::{ParamValue, Step, StepResult, StepStatus, ValueRef};
pub use error::{EngineError, ResolveError, StepError};
pub use dag::Graph;
pub use resolve::{resolve_params, RunState};
pub use executor::{Executor, ExecutorConfig, RunReport};
