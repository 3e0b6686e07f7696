//! Durable step execution on top of a [`RunStore`].
//!
//! Side-effecting work is addressed by a deterministic step key. Once a step's
//! output is recorded, re-running the same step (after a crash, or when a run
//! is resumed) replays the recorded output instead of repeating the effect.
//! Only a step that was in flight when the process died can run twice.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use db::{DbError, RunStore};
use tools::ToolError;

use crate::EngineError;

/// Exponential back-off for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time.
    pub base_delay: Duration,
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `op` until it succeeds, fails non-transiently, or retries run out.
///
/// The last error is returned unchanged; callers decide what exhaustion means.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempts < policy.max_retries => {
                attempts += 1;
                let delay = policy.delay(attempts);
                warn!(
                    "{} transient error (attempt {}/{}), retrying in {:?}: {}",
                    what, attempts, policy.max_retries, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Store call with transient-fault retry.
pub async fn store_call<T, F, Fut>(policy: &RetryPolicy, what: &str, op: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    with_retry(policy, what, DbError::is_transient, op)
        .await
        .map_err(|e| {
            if e.is_transient() {
                EngineError::RetryExhausted { what: what.to_owned(), message: e.to_string() }
            } else {
                EngineError::Database(e)
            }
        })
}

/// Journal of completed steps for one run.
pub struct StepJournal<'a> {
    store: &'a dyn RunStore,
    run_id: Uuid,
    policy: RetryPolicy,
}

impl<'a> StepJournal<'a> {
    pub fn new(store: &'a dyn RunStore, run_id: Uuid, policy: RetryPolicy) -> Self {
        Self { store, run_id, policy }
    }

    async fn recorded(&self, key: &str) -> Result<Option<Value>, EngineError> {
        store_call(&self.policy, "journal read", || self.store.load_step(self.run_id, key)).await
    }

    async fn record(&self, key: &str, output: &Value) -> Result<(), EngineError> {
        store_call(&self.policy, "journal write", || {
            self.store.record_step(self.run_id, key, output)
        })
        .await
    }

    /// Execute a tool call at most once per `key`.
    ///
    /// `ToolError::Transient` is retried per the policy; `ToolError::Fatal`
    /// fails the node. Outputs (including `status: "error"` results) are
    /// recorded, since the side effect has happened either way.
    pub async fn run_step<F, Fut>(&self, node_id: &str, key: &str, op: F) -> Result<Value, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Value, ToolError>>,
    {
        if let Some(output) = self.recorded(key).await? {
            debug!(step = key, "replaying recorded step");
            return Ok(output);
        }

        let output = with_retry(
            &self.policy,
            &format!("node '{node_id}'"),
            |e: &ToolError| matches!(e, ToolError::Transient(_)),
            op,
        )
        .await
        .map_err(|e| match e {
            ToolError::Transient(message) => EngineError::RetryExhausted {
                what: format!("node '{node_id}'"),
                message,
            },
            ToolError::Fatal(message) => EngineError::NodeFatal {
                node_id: node_id.to_owned(),
                message,
            },
        })?;

        self.record(key, &output).await?;
        Ok(output)
    }

    /// Forget every step of iterations before `iteration`; a resumed run only
    /// ever replays its current iteration.
    pub async fn prune_before(&self, iteration: u64) -> Result<(), EngineError> {
        let pruned = store_call(&self.policy, "journal prune", || {
            self.store.prune_steps(self.run_id, iteration)
        })
        .await?;
        debug!(iteration, pruned, "pruned journal");
        Ok(())
    }

    /// Sleep for `duration`, surviving restarts.
    ///
    /// The wake-up time is journaled under `key` before sleeping; a resumed
    /// run only waits for whatever is left of it.
    pub async fn sleep(&self, key: &str, duration: Duration) -> Result<(), EngineError> {
        let remaining = match self.recorded(key).await? {
            Some(entry) => {
                let wake_at: Option<DateTime<Utc>> =
                    serde_json::from_value(entry["wake_at"].clone()).ok();
                let left = wake_at
                    .and_then(|t| (t - Utc::now()).to_std().ok())
                    .unwrap_or(Duration::ZERO);
                debug!(step = key, ?left, "resuming recorded sleep");
                left
            }
            None => {
                let wake_at = Utc::now()
                    + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
                self.record(key, &json!({ "wake_at": wake_at })).await?;
                duration
            }
        };

        tokio::time::sleep(remaining).await;
        Ok(())
    }
}
