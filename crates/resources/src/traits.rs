//! The `ResourceClient` trait — the contract every backend must fulfil.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ClientError;

/// Resolved request parameters handed to a client call.
pub type Params = Map<String, Value>;

/// Param key carrying the resource ID for read, update and delete.
pub const ID_PARAM: &str = "id";

/// The four lifecycle verbs a step can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    /// Whether the operation addresses an existing resource by ID.
    pub fn requires_id(self) -> bool {
        !matches!(self, Self::Create)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Create/read/update/delete against a remote service, by resource kind.
///
/// Every method returns the JSON representation of the affected resource;
/// later steps can pull fields out of it.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Create a resource of `kind`. A caller-supplied `id` param, if any,
    /// identifies the resource.
    async fn create(&self, kind: &str, params: &Params) -> Result<Value, ClientError>;

    /// Fetch the resource `id` of `kind`.
    async fn read(&self, kind: &str, id: &str) -> Result<Value, ClientError>;

    /// Replace the mutable fields of resource `id` with `params`.
    async fn update(&self, kind: &str, id: &str, params: &Params) -> Result<Value, ClientError>;

    /// Remove resource `id` of `kind`.
    async fn delete(&self, kind: &str, id: &str) -> Result<Value, ClientError>;
}
