//! `RetryingClient` — caller-side retry around individual client calls.
//!
//! The engine never retries a failed step. Callers that want retries wrap
//! their client in this type before handing it to the executor, so the policy
//! applies per call and stays invisible to step bookkeeping.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::{ClientError, Params, ResourceClient};

/// Tuning knobs for [`RetryingClient`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self { max_retries: 0, base_delay: Duration::ZERO }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Wraps a client and retries `Transient` errors with exponential back-off.
/// `Permanent` errors pass straight through.
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: ResourceClient> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn with_retry<F, Fut>(&self, label: String, mut call: F) -> Result<Value, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Value, ClientError>>,
    {
        let mut attempts = 0u32;

        loop {
            match call().await {
                Ok(output) => return Ok(output),

                Err(ClientError::Transient(msg)) if attempts < self.policy.max_retries => {
                    attempts += 1;
                    let delay = self.policy.delay_for(attempts);

                    warn!(
                        "{} transient error (attempt {}/{}), retrying in {:?}: {}",
                        label, attempts, self.policy.max_retries, delay, msg
                    );

                    tokio::time::sleep(delay).await;
                }

                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<C: ResourceClient> ResourceClient for RetryingClient<C> {
    async fn create(&self, kind: &str, params: &Params) -> Result<Value, ClientError> {
        self.with_retry(format!("create {kind}"), || self.inner.create(kind, params))
            .await
    }

    async fn read(&self, kind: &str, id: &str) -> Result<Value, ClientError> {
        self.with_retry(format!("read {kind} '{id}'"), || self.inner.read(kind, id))
            .await
    }

    async fn update(&self, kind: &str, id: &str, params: &Params) -> Result<Value, ClientError> {
        self.with_retry(format!("update {kind} '{id}'"), || self.inner.update(kind, id, params))
            .await
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<Value, ClientError> {
        self.with_retry(format!("delete {kind} '{id}'"), || self.inner.delete(kind, id))
            .await
    }
}
