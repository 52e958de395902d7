//! `InMemoryClient` — a process-local backend with idempotent lifecycle calls.
//!
//! Mirrors how the remote classification service treats caller-supplied IDs:
//! creating an ID that already exists hands back the existing resource, and
//! deleting an ID that is already gone is not an error.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{ClientError, Params, ResourceClient, ID_PARAM};

type Key = (String, String);

#[derive(Debug, Default)]
pub struct InMemoryClient {
    store: Mutex<HashMap<Key, Map<String, Value>>>,
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live resources across all kinds.
    pub fn len(&self) -> Result<usize, ClientError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, ClientError> {
        Ok(self.lock()?.is_empty())
    }

    /// Whether `kind/id` currently exists.
    pub fn contains(&self, kind: &str, id: &str) -> Result<bool, ClientError> {
        Ok(self.lock()?.contains_key(&(kind.to_owned(), id.to_owned())))
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Key, Map<String, Value>>>, ClientError> {
        self.store
            .lock()
            .map_err(|_| ClientError::Transient("in-memory store lock poisoned".into()))
    }
}

/// Render a stored resource the way the remote service does: its fields plus
/// `id` and a fully-qualified `name`.
fn render(kind: &str, id: &str, fields: &Map<String, Value>) -> Value {
    let mut out = fields.clone();
    out.insert(ID_PARAM.into(), Value::String(id.to_owned()));
    out.insert("name".into(), Value::String(format!("{kind}/{id}")));
    Value::Object(out)
}

fn caller_id(params: &Params) -> Result<Option<String>, ClientError> {
    match params.get(ID_PARAM) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(ClientError::Permanent(format!(
            "'{ID_PARAM}' must be a non-empty string or number, got {other}"
        ))),
    }
}

fn without_id(params: &Params) -> Map<String, Value> {
    params
        .iter()
        .filter(|(k, _)| k.as_str() != ID_PARAM)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[async_trait]
impl ResourceClient for InMemoryClient {
    async fn create(&self, kind: &str, params: &Params) -> Result<Value, ClientError> {
        let id = caller_id(params)?.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut store = self.lock()?;
        let key = (kind.to_owned(), id.clone());

        if let Some(existing) = store.get(&key) {
            info!("{kind} '{id}' already exists, returning existing resource");
            return Ok(render(kind, &id, existing));
        }

        let fields = without_id(params);
        let out = render(kind, &id, &fields);
        store.insert(key, fields);
        debug!("created {kind} '{id}'");
        Ok(out)
    }

    async fn read(&self, kind: &str, id: &str) -> Result<Value, ClientError> {
        let store = self.lock()?;
        store
            .get(&(kind.to_owned(), id.to_owned()))
            .map(|fields| render(kind, id, fields))
            .ok_or_else(|| ClientError::not_found(kind, id))
    }

    async fn update(&self, kind: &str, id: &str, params: &Params) -> Result<Value, ClientError> {
        let mut store = self.lock()?;
        let fields = store
            .get_mut(&(kind.to_owned(), id.to_owned()))
            .ok_or_else(|| ClientError::not_found(kind, id))?;

        for (k, v) in without_id(params) {
            fields.insert(k, v);
        }
        debug!("updated {kind} '{id}'");
        Ok(render(kind, id, fields))
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<Value, ClientError> {
        let mut store = self.lock()?;
        let deleted = store.remove(&(kind.to_owned(), id.to_owned())).is_some();
        if !deleted {
            warn!("{kind} '{id}' not found, nothing to delete");
        }
        Ok(serde_json::json!({ "id": id, "deleted": deleted }))
    }
}
