//! Client-level error type.

use thiserror::Error;

/// Errors returned by a [`ResourceClient`](crate::ResourceClient) call.
///
/// The variant tells the *caller* whether retrying can help:
/// - `Transient` — the remote side may succeed on a later attempt.
/// - `Permanent` — the request itself is wrong; never retry.
///
/// The engine records both as a failed step and does not retry on its own.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Temporary failure (throttling, unavailable backend, network blip).
    #[error("transient client error: {0}")]
    Transient(String),

    /// Request rejected (not found, invalid argument, permission denied).
    #[error("permanent client error: {0}")]
    Permanent(String),
}

impl ClientError {
    /// Shorthand for the not-found case every backend reports.
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::Permanent(format!("{kind} '{id}' not found"))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
