//! `MockClient` — a test double for `ResourceClient`.
//!
//! Useful in unit and integration tests where a real backend is either
//! unavailable or irrelevant. Behaviour is scripted per `(operation, kind)`;
//! unscripted calls echo their params back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{ClientError, Operation, Params, ResourceClient, ID_PARAM};

/// Behaviour injected into `MockClient` for one `(operation, kind)` pair.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with a `Transient` error.
    FailTransient(String),
    /// Fail with a `Permanent` error.
    FailPermanent(String),
    /// Fail transiently `failures` more times, then return `value`.
    FlakyThen { failures: u32, value: Value },
    /// Sleep for `delay`, then return `value`.
    Delayed { delay: Duration, value: Value },
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub operation: Operation,
    pub kind: String,
    pub id: Option<String>,
    pub params: Params,
}

/// A mock client that records every call it receives and returns a
/// programmer-specified result.
#[derive(Default)]
pub struct MockClient {
    behaviours: Mutex<HashMap<(Operation, String), MockBehaviour>>,
    /// All calls seen by this client (in call order).
    pub calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the behaviour of `operation` on `kind`.
    pub fn with(self, operation: Operation, kind: impl Into<String>, behaviour: MockBehaviour) -> Self {
        if let Ok(mut map) = self.behaviours.lock() {
            map.insert((operation, kind.into()), behaviour);
        }
        self
    }

    /// Succeed with the given value.
    pub fn returning(self, operation: Operation, kind: impl Into<String>, value: Value) -> Self {
        self.with(operation, kind, MockBehaviour::ReturnValue(value))
    }

    /// Always fail with a `Transient` error.
    pub fn failing_transient(self, operation: Operation, kind: impl Into<String>, msg: impl Into<String>) -> Self {
        self.with(operation, kind, MockBehaviour::FailTransient(msg.into()))
    }

    /// Always fail with a `Permanent` error.
    pub fn failing_permanent(self, operation: Operation, kind: impl Into<String>, msg: impl Into<String>) -> Self {
        self.with(operation, kind, MockBehaviour::FailPermanent(msg.into()))
    }

    pub fn flaky_then(self, operation: Operation, kind: impl Into<String>, failures: u32, value: Value) -> Self {
        self.with(operation, kind, MockBehaviour::FlakyThen { failures, value })
    }

    pub fn delayed(self, operation: Operation, kind: impl Into<String>, delay: Duration, value: Value) -> Self {
        self.with(operation, kind, MockBehaviour::Delayed { delay, value })
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Snapshot of every recorded call.
    pub fn recorded(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls received for one `(operation, kind)` pair.
    pub fn calls_for(&self, operation: Operation, kind: &str) -> Vec<MockCall> {
        self.recorded()
            .into_iter()
            .filter(|c| c.operation == operation && c.kind == kind)
            .collect()
    }

    async fn dispatch(
        &self,
        operation: Operation,
        kind: &str,
        id: Option<&str>,
        params: Params,
    ) -> Result<Value, ClientError> {
        self.calls.lock().unwrap().push(MockCall {
            operation,
            kind: kind.to_owned(),
            id: id.map(str::to_owned),
            params: params.clone(),
        });

        // Decide under the lock, sleep outside it.
        let behaviour = {
            let mut map = self.behaviours.lock().unwrap();
            match map.get_mut(&(operation, kind.to_owned())) {
                Some(MockBehaviour::FlakyThen { failures, value }) => {
                    if *failures > 0 {
                        *failures -= 1;
                        Some(MockBehaviour::FailTransient(format!("{operation} {kind} flaked")))
                    } else {
                        Some(MockBehaviour::ReturnValue(value.clone()))
                    }
                }
                other => other.cloned(),
            }
        };

        match behaviour {
            Some(MockBehaviour::ReturnValue(v)) => Ok(v),
            Some(MockBehaviour::FailTransient(msg)) => Err(ClientError::Transient(msg)),
            Some(MockBehaviour::FailPermanent(msg)) => Err(ClientError::Permanent(msg)),
            Some(MockBehaviour::Delayed { delay, value }) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            Some(MockBehaviour::FlakyThen { value, .. }) => Ok(value),
            None => {
                // Echo the request so tests can trace data flowing through the graph.
                let mut out = json!({ "kind": kind, "operation": operation.as_str() });
                if let Some(obj) = out.as_object_mut() {
                    if let Some(id) = id {
                        obj.insert(ID_PARAM.into(), Value::String(id.to_owned()));
                    }
                    for (k, v) in params {
                        obj.insert(k, v);
                    }
                }
                Ok(out)
            }
        }
    }
}

#[async_trait]
impl ResourceClient for MockClient {
    async fn create(&self, kind: &str, params: &Params) -> Result<Value, ClientError> {
        self.dispatch(Operation::Create, kind, None, params.clone()).await
    }

    async fn read(&self, kind: &str, id: &str) -> Result<Value, ClientError> {
        self.dispatch(Operation::Read, kind, Some(id), Params::new()).await
    }

    async fn update(&self, kind: &str, id: &str, params: &Params) -> Result<Value, ClientError> {
        self.dispatch(Operation::Update, kind, Some(id), params.clone()).await
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<Value, ClientError> {
        self.dispatch(Operation::Delete, kind, Some(id), Params::new()).await
    }
}
