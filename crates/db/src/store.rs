//! Storage contracts the engine is written against.
//!
//! Any backend offering an atomic upsert-by-key can implement these.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::{BlueprintRow, DbError, NodeResult, RunRecord, RunStatus};

/// Durable state for runs, their per-node snapshots and the step journal.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert `run` unless a record with the same `run_id` already exists.
    async fn insert_run(&self, run: &RunRecord) -> Result<(), DbError>;

    /// Fetch a run. `DbError::NotFound` if absent.
    async fn get_run(&self, run_id: Uuid) -> Result<RunRecord, DbError>;

    /// All runs, optionally filtered by status, oldest first.
    async fn list_runs(&self, status: Option<RunStatus>) -> Result<Vec<RunRecord>, DbError>;

    /// Overwrite `iteration` and the full `step_results` snapshot.
    async fn save_progress(
        &self,
        run_id: Uuid,
        iteration: u64,
        step_results: &BTreeMap<String, NodeResult>,
    ) -> Result<(), DbError>;

    /// Compare-and-set from `running` to `to`.
    ///
    /// Terminal targets also stamp `completed_at`. Returns `false` (and
    /// changes nothing) when the run is no longer `running`.
    async fn transition(
        &self,
        run_id: Uuid,
        to: RunStatus,
        error_message: Option<&str>,
    ) -> Result<bool, DbError>;

    /// Recorded output of a journaled step, if it already ran.
    async fn load_step(&self, run_id: Uuid, step_key: &str) -> Result<Option<Value>, DbError>;

    /// Record the output of a journaled step (upsert by `(run_id, step_key)`).
    async fn record_step(&self, run_id: Uuid, step_key: &str, output: &Value) -> Result<(), DbError>;

    /// Drop journal entries of iterations before `before_iteration`.
    ///
    /// Returns the number of entries removed.
    async fn prune_steps(&self, run_id: Uuid, before_iteration: u64) -> Result<u64, DbError>;
}

/// Iteration a step key belongs to (`"{iteration}/..."`).
pub fn step_iteration(step_key: &str) -> Option<u64> {
    step_key.split('/').next()?.parse().ok()
}

/// Saved blueprints, consulted by the trigger dispatcher.
#[async_trait]
pub trait BlueprintStore: Send + Sync {
    /// Insert or replace by `id`.
    async fn save_blueprint(&self, row: &BlueprintRow) -> Result<(), DbError>;

    /// `DbError::NotFound` if absent.
    async fn get_blueprint(&self, id: &str) -> Result<BlueprintRow, DbError>;

    /// All blueprints, newest first.
    async fn list_blueprints(&self) -> Result<Vec<BlueprintRow>, DbError>;

    /// Active blueprints only, newest first.
    async fn list_active_blueprints(&self) -> Result<Vec<BlueprintRow>, DbError>;

    async fn set_active(&self, id: &str, active: bool) -> Result<(), DbError>;

    async fn delete_blueprint(&self, id: &str) -> Result<(), DbError>;
}
