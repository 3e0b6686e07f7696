//! Postgres repository functions: one function per database operation.
//!
//! Every function takes a `&PgPool` and returns a `Result<T, DbError>`.
//! [`PgStore`] wires them into the [`RunStore`] and [`BlueprintStore`]
//! contracts.

pub mod runs;
pub mod blueprints;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{BlueprintRow, BlueprintStore, DbError, NodeResult, RunRecord, RunStatus, RunStore};

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RunStore for PgStore {
    async fn insert_run(&self, run: &RunRecord) -> Result<(), DbError> {
        runs::insert_run(&self.pool, run).await
    }

    async fn get_run(&self, run_id: Uuid) -> Result<RunRecord, DbError> {
        runs::get_run(&self.pool, run_id).await
    }

    async fn list_runs(&self, status: Option<RunStatus>) -> Result<Vec<RunRecord>, DbError> {
        runs::list_runs(&self.pool, status).await
    }

    async fn save_progress(
        &self,
        run_id: Uuid,
        iteration: u64,
        step_results: &BTreeMap<String, NodeResult>,
    ) -> Result<(), DbError> {
        runs::save_progress(&self.pool, run_id, iteration, step_results).await
    }

    async fn transition(
        &self,
        run_id: Uuid,
        to: RunStatus,
        error_message: Option<&str>,
    ) -> Result<bool, DbError> {
        runs::transition(&self.pool, run_id, to, error_message).await
    }

    async fn load_step(&self, run_id: Uuid, step_key: &str) -> Result<Option<Value>, DbError> {
        runs::load_step(&self.pool, run_id, step_key).await
    }

    async fn record_step(&self, run_id: Uuid, step_key: &str, output: &Value) -> Result<(), DbError> {
        runs::record_step(&self.pool, run_id, step_key, output).await
    }

    async fn prune_steps(&self, run_id: Uuid, before_iteration: u64) -> Result<u64, DbError> {
        runs::prune_steps(&self.pool, run_id, before_iteration).await
    }
}

#[async_trait]
impl BlueprintStore for PgStore {
    async fn save_blueprint(&self, row: &BlueprintRow) -> Result<(), DbError> {
        blueprints::save_blueprint(&self.pool, row).await
    }

    async fn get_blueprint(&self, id: &str) -> Result<BlueprintRow, DbError> {
        blueprints::get_blueprint(&self.pool, id).await
    }

    async fn list_blueprints(&self) -> Result<Vec<BlueprintRow>, DbError> {
        blueprints::list_blueprints(&self.pool, false).await
    }

    async fn list_active_blueprints(&self) -> Result<Vec<BlueprintRow>, DbError> {
        blueprints::list_blueprints(&self.pool, true).await
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<(), DbError> {
        blueprints::set_active(&self.pool, id, active).await
    }

    async fn delete_blueprint(&self, id: &str) -> Result<(), DbError> {
        blueprints::delete_blueprint(&self.pool, id).await
    }
}
