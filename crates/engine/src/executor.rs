//! Graph execution engine.
//!
//! `Executor` is the central orchestrator:
//! 1. Validates the graph and produces a topological ordering.
//! 2. Walks the steps in that order, one at a time.
//! 3. Skips any step whose dependency failed or was skipped.
//! 4. Resolves value references against results recorded so far.
//! 5. Dispatches the step's operation through the `ResourceClient` and records
//!    the outcome. A failed step never aborts the run; only its dependents are
//!    affected.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use resources::{ClientError, Operation, Params, ResourceClient, ID_PARAM};

use crate::dag::Graph;
use crate::error::{EngineError, ResolveError, StepError};
use crate::models::{Step, StepResult, StepStatus};
use crate::resolve::{resolve_params, RunState};

/// Skip reason recorded for steps not started before the run deadline.
pub const TIMEOUT_REASON: &str = "timeout";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Wall-clock budget for a whole run. `None` means unbounded.
    pub run_timeout: Option<Duration>,
}

// ---------------------------------------------------------------------------
// Output of a completed run
// ---------------------------------------------------------------------------

/// Every step's result for one run, in the order the steps were processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub results: IndexMap<String, StepResult>,
}

impl RunReport {
    /// True iff no step failed. Skipped steps do not count as failures on
    /// their own; they only occur downstream of one or on timeout.
    pub fn all_succeeded(&self) -> bool {
        self.results.values().all(|r| r.status != StepStatus::Failed)
    }

    pub fn get(&self, step_name: &str) -> Option<&StepResult> {
        self.results.get(step_name)
    }

    pub fn status_of(&self, step_name: &str) -> Option<StepStatus> {
        self.get(step_name).map(|r| r.status)
    }

    /// Number of steps that ended in `status`.
    pub fn count(&self, status: StepStatus) -> usize {
        self.results.values().filter(|r| r.status == status).count()
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Runs graphs against a single polymorphic client.
///
/// Holds no per-run state, so one executor can serve any number of runs.
pub struct Executor {
    client: Arc<dyn ResourceClient>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(client: Arc<dyn ResourceClient>, config: ExecutorConfig) -> Self {
        Self { client, config }
    }

    /// Run the graph and report every step's outcome.
    ///
    /// # Errors
    /// Returns `EngineError` only when the graph is invalid, in which case no
    /// step has been invoked. Step failures are recorded in the report.
    pub async fn run(&self, graph: &Graph) -> Result<RunReport, EngineError> {
        self.run_with_id(graph, Uuid::new_v4()).await
    }

    /// [`Executor::run`] with a caller-chosen run ID for log correlation.
    #[instrument(skip(self, graph), fields(steps = graph.len()))]
    pub async fn run_with_id(&self, graph: &Graph, run_id: Uuid) -> Result<RunReport, EngineError> {
        // ------------------------------------------------------------------
        // Validate and topologically sort the graph.
        // ------------------------------------------------------------------
        graph.validate()?;
        let order = graph.topological_order()?;
        info!("graph validated, executing {} steps in order: {:?}", order.len(), order);

        // A deadline past the clock's range is no deadline.
        let deadline = self.config.run_timeout.and_then(|t| Instant::now().checked_add(t));
        let mut state = RunState::new();

        // ------------------------------------------------------------------
        // Execute steps sequentially.
        // ------------------------------------------------------------------
        for name in &order {
            let Some(step) = graph.get(name) else { continue };

            let result = if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!("step '{}' skipped: run deadline passed", name);
                StepResult::skipped(name, TIMEOUT_REASON)
            } else if let Some(reason) = blocked_by(step, &state) {
                warn!("step '{}' skipped: {}", name, reason);
                StepResult::skipped(name, reason)
            } else {
                self.execute_step(step, &state, deadline).await
            };

            state.record(result);
        }

        let report = RunReport { run_id, results: state.into_results() };

        info!(
            "run {} finished: {} succeeded, {} failed, {} skipped",
            run_id,
            report.count(StepStatus::Succeeded),
            report.count(StepStatus::Failed),
            report.count(StepStatus::Skipped),
        );

        Ok(report)
    }

    async fn execute_step(&self, step: &Step, state: &RunState, deadline: Option<Instant>) -> StepResult {
        let started_at = Utc::now();

        match self.invoke(step, state, deadline).await {
            Ok(output) => {
                info!("step '{}' succeeded", step.name);
                StepResult::succeeded(&step.name, output, started_at)
            }
            Err(err) => {
                error!("step '{}' failed: {}", step.name, err);
                StepResult::failed(&step.name, err.to_string(), started_at)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal: resolve params and dispatch one client call.
    // -----------------------------------------------------------------------

    async fn invoke(&self, step: &Step, state: &RunState, deadline: Option<Instant>) -> Result<Value, StepError> {
        let mut params = resolve_params(&step.params, state)?;
        let kind = step.resource_kind.as_str();

        match step.operation {
            Operation::Create => within(deadline, self.client.create(kind, &params)).await,
            Operation::Read => {
                let id = take_resource_id(&mut params)?;
                within(deadline, self.client.read(kind, &id)).await
            }
            Operation::Update => {
                let id = take_resource_id(&mut params)?;
                within(deadline, self.client.update(kind, &id, &params)).await
            }
            Operation::Delete => {
                let id = take_resource_id(&mut params)?;
                within(deadline, self.client.delete(kind, &id)).await
            }
        }
    }
}

/// Await a client call, giving up once `deadline` passes.
async fn within<F>(deadline: Option<Instant>, call: F) -> Result<Value, StepError>
where
    F: Future<Output = Result<Value, ClientError>>,
{
    match deadline {
        Some(d) => tokio::time::timeout_at(d, call)
            .await
            .map_err(|_| StepError::TimedOut)?
            .map_err(StepError::from),
        None => call.await.map_err(StepError::from),
    }
}

/// The first dependency that keeps `step` from running, as a skip reason.
fn blocked_by(step: &Step, state: &RunState) -> Option<String> {
    step.depends_on.iter().find_map(|dep| match state.status_of(dep) {
        Some(StepStatus::Succeeded) => None,
        Some(StepStatus::Failed) => Some(format!("upstream step '{dep}' failed")),
        Some(StepStatus::Skipped) => Some(format!("upstream step '{dep}' was skipped")),
        None => Some(format!("upstream step '{dep}' has no result")),
    })
}

/// Pull the resolved `id` out of `params`; the rest is the request body.
fn take_resource_id(params: &mut Params) -> Result<String, ResolveError> {
    match params.remove(ID_PARAM) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(ResolveError::InvalidResourceId(other.to_string())),
        None => Err(ResolveError::InvalidResourceId("null".into())),
    }
}
