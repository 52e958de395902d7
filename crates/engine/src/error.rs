//! Engine-level error types.

use thiserror::Error;

use resources::ClientError;

/// Graph construction and validation errors.
///
/// All of these are fatal to [`Executor::run`](crate::Executor::run): they are
/// returned before any step is invoked.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Two steps share the same name.
    #[error("duplicate step name: '{0}'")]
    DuplicateStep(String),

    /// A step was given an empty name.
    #[error("step name must not be empty")]
    EmptyStepName,

    /// A step lists itself in `depends_on`.
    #[error("step '{0}' depends on itself")]
    SelfDependency(String),

    /// A `depends_on` entry names a step that is not in the graph.
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    /// The dependency relation contains a cycle.
    #[error("dependency cycle among steps: {}", .steps.join(", "))]
    CyclicDependency { steps: Vec<String> },

    /// A value reference points at a step the referencing step does not depend on.
    #[error("step '{step}' param '{param}' references '{source_step}', which is not in its depends_on")]
    DanglingReference {
        step: String,
        param: String,
        source_step: String,
    },

    /// A read/update/delete step has no `id` param.
    #[error("step '{step}' ({operation}) requires an 'id' param")]
    MissingResourceId { step: String, operation: resources::Operation },
}

/// Failures while substituting value references into a step's params.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The source step has no recorded result yet.
    #[error("param '{param}': step '{source_step}' has no recorded result")]
    UnresolvedReference { param: String, source_step: String },

    /// The source step did not succeed.
    #[error("param '{param}': step '{source_step}' did not succeed ({status})")]
    UpstreamFailed {
        param: String,
        source_step: String,
        status: crate::StepStatus,
    },

    /// The field path does not exist in the source step's output.
    #[error("param '{param}': field '{field_path}' not found in output of '{source_step}'")]
    MissingField {
        param: String,
        source_step: String,
        field_path: String,
    },

    /// The resolved `id` param is not usable as a resource ID.
    #[error("resource id must be a string or number, got {0}")]
    InvalidResourceId(String),
}

/// Why a single step failed. Recorded on the step, never thrown out of a run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Client(#[from] ClientError),

    /// The run deadline passed while the client call was in flight.
    #[error("timed out")]
    TimedOut,
}
