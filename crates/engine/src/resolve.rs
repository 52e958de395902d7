//! Run state and value-reference resolution.
//!
//! A step only ever sees earlier results through [`resolve_params`], which
//! reads [`RunState`] and never writes to it.

use indexmap::IndexMap;
use resources::Params;
use serde_json::Value;
use tracing::warn;

use crate::error::ResolveError;
use crate::models::{ParamValue, StepResult, StepStatus, ValueRef};

/// Results recorded so far in one run, keyed by step name.
///
/// Each key is written at most once.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    results: IndexMap<String, StepResult>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, step_name: &str) -> Option<&StepResult> {
        self.results.get(step_name)
    }

    pub fn status_of(&self, step_name: &str) -> Option<StepStatus> {
        self.get(step_name).map(|r| r.status)
    }

    /// Record a terminal result. Returns `false`, keeping the first result,
    /// if the step already has one.
    pub(crate) fn record(&mut self, result: StepResult) -> bool {
        if self.results.contains_key(&result.step_name) {
            warn!("result for step '{}' already recorded; ignoring", result.step_name);
            return false;
        }
        self.results.insert(result.step_name.clone(), result);
        true
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_results(self) -> IndexMap<String, StepResult> {
        self.results
    }
}

/// Walk a dot-separated path into `value`. Numeric segments index arrays.
pub fn lookup<'a>(value: &'a Value, field_path: &str) -> Option<&'a Value> {
    if field_path.is_empty() {
        return Some(value);
    }
    field_path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn resolve_ref(param: &str, value_ref: &ValueRef, state: &RunState) -> Result<Value, ResolveError> {
    let result = state
        .get(&value_ref.source_step)
        .ok_or_else(|| ResolveError::UnresolvedReference {
            param: param.to_owned(),
            source_step: value_ref.source_step.clone(),
        })?;

    if !result.is_succeeded() {
        return Err(ResolveError::UpstreamFailed {
            param: param.to_owned(),
            source_step: value_ref.source_step.clone(),
            status: result.status,
        });
    }

    result
        .output
        .as_ref()
        .and_then(|output| lookup(output, &value_ref.field_path))
        .cloned()
        .ok_or_else(|| ResolveError::MissingField {
            param: param.to_owned(),
            source_step: value_ref.source_step.clone(),
            field_path: value_ref.field_path.clone(),
        })
}

/// Replace every value reference in `params` with the value it points at.
///
/// # Errors
/// - [`ResolveError::UnresolvedReference`] if the source step has no result.
/// - [`ResolveError::UpstreamFailed`] if the source step did not succeed.
/// - [`ResolveError::MissingField`] if the field path is absent from its output.
pub fn resolve_params(
    params: &IndexMap<String, ParamValue>,
    state: &RunState,
) -> Result<Params, ResolveError> {
    params
        .iter()
        .map(|(key, value)| {
            let resolved = match value {
                ParamValue::Literal(v) => v.clone(),
                ParamValue::Ref(r) => resolve_ref(key, r, state)?,
            };
            Ok::<_, ResolveError>((key.clone(), resolved))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn state_with(results: Vec<StepResult>) -> RunState {
        let mut state = RunState::new();
        for r in results {
            state.record(r);
        }
        state
    }

    fn refs(pairs: &[(&str, ParamValue)]) -> IndexMap<String, ParamValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn literals_pass_through_and_refs_are_substituted() {
        let state = state_with(vec![StepResult::succeeded(
            "create_template",
            json!({ "name": "tpl-123", "config": { "types": ["PHONE", "EMAIL"] } }),
            Utc::now(),
        )]);
        let params = refs(&[
            ("project", "example-project".into()),
            ("templateName", ValueRef::new("create_template", "name").into()),
            ("second", ValueRef::new("create_template", "config.types.1").into()),
        ]);

        let resolved = resolve_params(&params, &state).unwrap();

        assert_eq!(resolved["project"], "example-project");
        assert_eq!(resolved["templateName"], "tpl-123");
        assert_eq!(resolved["second"], "EMAIL");
    }

    #[test]
    fn empty_path_selects_whole_output() {
        let output = json!({ "a": 1 });
        let state = state_with(vec![StepResult::succeeded("s", output.clone(), Utc::now())]);
        let resolved = resolve_params(&refs(&[("all", ValueRef::new("s", "").into())]), &state).unwrap();
        assert_eq!(resolved["all"], output);
    }

    #[test]
    fn missing_source_is_unresolved() {
        let params = refs(&[("x", ValueRef::new("later", "name").into())]);
        assert_eq!(
            resolve_params(&params, &RunState::new()),
            Err(ResolveError::UnresolvedReference {
                param: "x".into(),
                source_step: "later".into(),
            })
        );
    }

    #[test]
    fn failed_or_skipped_source_is_upstream_failed() {
        let state = state_with(vec![
            StepResult::failed("bad", "boom", Utc::now()),
            StepResult::skipped("gone", "upstream step 'bad' failed"),
        ]);

        for (source, status) in [("bad", StepStatus::Failed), ("gone", StepStatus::Skipped)] {
            let params = refs(&[("x", ValueRef::new(source, "name").into())]);
            assert!(matches!(
                resolve_params(&params, &state),
                Err(ResolveError::UpstreamFailed { status: s, .. }) if s == status
            ));
        }
    }

    #[test]
    fn absent_field_is_missing() {
        let state = state_with(vec![StepResult::succeeded("s", json!({ "list": [1] }), Utc::now())]);

        for path in ["name", "list.5", "list.x", "list.0.deeper"] {
            let params = refs(&[("x", ValueRef::new("s", path).into())]);
            assert!(
                matches!(resolve_params(&params, &state), Err(ResolveError::MissingField { .. })),
                "path {path} should be missing"
            );
        }
    }

    #[test]
    fn resolution_is_deterministic() {
        let state = state_with(vec![StepResult::succeeded("s", json!({ "name": "n", "n": 2 }), Utc::now())]);
        let params = refs(&[
            ("b", ValueRef::new("s", "n").into()),
            ("a", ValueRef::new("s", "name").into()),
            ("lit", json!({ "k": [1, 2] }).into()),
        ]);

        let first = resolve_params(&params, &state).unwrap();
        let second = resolve_params(&params, &state).unwrap();

        assert_eq!(first, second);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn results_are_write_once() {
        let mut state = RunState::new();
        assert!(state.record(StepResult::succeeded("s", json!({ "v": 1 }), Utc::now())));
        assert!(!state.record(StepResult::failed("s", "late", Utc::now())));
        assert_eq!(state.status_of("s"), Some(StepStatus::Succeeded));
    }
}
