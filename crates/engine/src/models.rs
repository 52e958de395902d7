//! Core domain models for the orchestrator.
//!
//! Steps and their params are plain serde types, so a graph can be loaded
//! from a JSON array of step descriptors and a run report written back out.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use resources::{Operation, ID_PARAM};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// ValueRef / ParamValue
// ---------------------------------------------------------------------------

/// Placeholder for a field of an earlier step's output.
///
/// `field_path` is dot-separated. Each segment is an object key, or an array
/// index when the value at that point is an array. An empty path selects the
/// whole output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueRef {
    pub source_step: String,
    pub field_path: String,
}

impl ValueRef {
    pub fn new(source_step: impl Into<String>, field_path: impl Into<String>) -> Self {
        Self {
            source_step: source_step.into(),
            field_path: field_path.into(),
        }
    }
}

/// A step parameter: either known up front or taken from an earlier step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    Literal(Value),
    Ref(ValueRef),
}

impl ParamValue {
    pub fn as_value_ref(&self) -> Option<&ValueRef> {
        match self {
            Self::Ref(r) => Some(r),
            Self::Literal(_) => None,
        }
    }
}

impl From<ValueRef> for ParamValue {
    fn from(r: ValueRef) -> Self {
        Self::Ref(r)
    }
}

impl From<Value> for ParamValue {
    fn from(v: Value) -> Self {
        Self::Literal(v)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Literal(Value::String(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A single unit of work in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique within the graph; results are keyed by it.
    pub name: String,
    pub operation: Operation,
    /// Passed through to the client untouched.
    pub resource_kind: String,
    /// For read/update/delete the `id` param addresses the resource.
    #[serde(default)]
    pub params: IndexMap<String, ParamValue>,
    #[serde(default)]
    pub depends_on: IndexSet<String>,
}

impl Step {
    pub fn new(name: impl Into<String>, operation: Operation, resource_kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operation,
            resource_kind: resource_kind.into(),
            params: IndexMap::new(),
            depends_on: IndexSet::new(),
        }
    }

    pub fn create(name: impl Into<String>, resource_kind: impl Into<String>) -> Self {
        Self::new(name, Operation::Create, resource_kind)
    }

    pub fn read(name: impl Into<String>, resource_kind: impl Into<String>, id: impl Into<ParamValue>) -> Self {
        Self::new(name, Operation::Read, resource_kind).param(ID_PARAM, id)
    }

    pub fn update(name: impl Into<String>, resource_kind: impl Into<String>, id: impl Into<ParamValue>) -> Self {
        Self::new(name, Operation::Update, resource_kind).param(ID_PARAM, id)
    }

    pub fn delete(name: impl Into<String>, resource_kind: impl Into<String>, id: impl Into<ParamValue>) -> Self {
        Self::new(name, Operation::Delete, resource_kind).param(ID_PARAM, id)
    }

    /// Add or replace a param.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Declare that this step must run after `step`.
    pub fn after(mut self, step: impl Into<String>) -> Self {
        self.depends_on.insert(step.into());
        self
    }

    /// Every value reference among the params, with its param key.
    pub fn value_refs(&self) -> impl Iterator<Item = (&str, &ValueRef)> {
        self.params
            .iter()
            .filter_map(|(k, v)| v.as_value_ref().map(|r| (k.as_str(), r)))
    }
}

// ---------------------------------------------------------------------------
// StepResult
// ---------------------------------------------------------------------------

/// Terminal state of a step within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        })
    }
}

/// The recorded outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub status: StepStatus,
    /// Client output, present only on success.
    pub output: Option<Value>,
    /// Failure or skip reason.
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepResult {
    pub fn succeeded(step_name: impl Into<String>, output: Value, started_at: DateTime<Utc>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Succeeded,
            output: Some(output),
            error: None,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
        }
    }

    pub fn failed(step_name: impl Into<String>, error: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Failed,
            output: None,
            error: Some(error.into()),
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
        }
    }

    /// A step that was never invoked.
    pub fn skipped(step_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Skipped,
            output: None,
            error: Some(reason.into()),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}
