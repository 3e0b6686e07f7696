//! In-process store for tests, `bizflow run` and database-less `serve`.
//!
//! Each method takes a single lock, so every operation is atomic per key.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::step_iteration;
use crate::{BlueprintRow, BlueprintStore, DbError, NodeResult, RunRecord, RunStatus, RunStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    runs: RwLock<HashMap<Uuid, RunRecord>>,
    steps: RwLock<HashMap<(Uuid, String), Value>>,
    blueprints: RwLock<HashMap<String, BlueprintRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of journaled steps for `run_id`.
    pub async fn step_count(&self, run_id: Uuid) -> usize {
        self.steps.read().await.keys().filter(|(id, _)| *id == run_id).count()
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn insert_run(&self, run: &RunRecord) -> Result<(), DbError> {
        self.runs.write().await.entry(run.run_id).or_insert_with(|| run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<RunRecord, DbError> {
        self.runs.read().await.get(&run_id).cloned().ok_or(DbError::NotFound)
    }

    async fn list_runs(&self, status: Option<RunStatus>) -> Result<Vec<RunRecord>, DbError> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .read()
            .await
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.run_id.cmp(&b.run_id)));
        Ok(runs)
    }

    async fn save_progress(
        &self,
        run_id: Uuid,
        iteration: u64,
        step_results: &BTreeMap<String, NodeResult>,
    ) -> Result<(), DbError> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(&run_id).ok_or(DbError::NotFound)?;
        run.iteration = iteration;
        run.step_results = step_results.clone();
        Ok(())
    }

    async fn transition(
        &self,
        run_id: Uuid,
        to: RunStatus,
        error_message: Option<&str>,
    ) -> Result<bool, DbError> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(&run_id).ok_or(DbError::NotFound)?;
        if run.status != RunStatus::Running {
            return Ok(false);
        }
        run.status = to;
        if to.is_terminal() {
            run.completed_at = Some(Utc::now());
        }
        if let Some(msg) = error_message {
            run.error_message = Some(msg.to_owned());
        }
        Ok(true)
    }

    async fn load_step(&self, run_id: Uuid, step_key: &str) -> Result<Option<Value>, DbError> {
        Ok(self.steps.read().await.get(&(run_id, step_key.to_owned())).cloned())
    }

    async fn record_step(&self, run_id: Uuid, step_key: &str, output: &Value) -> Result<(), DbError> {
        self.steps
            .write()
            .await
            .insert((run_id, step_key.to_owned()), output.clone());
        Ok(())
    }

    async fn prune_steps(&self, run_id: Uuid, before_iteration: u64) -> Result<u64, DbError> {
        let mut steps = self.steps.write().await;
        let len = steps.len();
        steps.retain(|(id, key), _| {
            *id != run_id || step_iteration(key).map_or(true, |i| i >= before_iteration)
        });
        Ok((len - steps.len()) as u64)
    }
}

#[async_trait]
impl BlueprintStore for MemoryStore {
    async fn save_blueprint(&self, row: &BlueprintRow) -> Result<(), DbError> {
        self.blueprints.write().await.insert(row.id.clone(), row.clone());
        Ok(())
    }

    async fn get_blueprint(&self, id: &str) -> Result<BlueprintRow, DbError> {
        self.blueprints.read().await.get(id).cloned().ok_or(DbError::NotFound)
    }

    async fn list_blueprints(&self) -> Result<Vec<BlueprintRow>, DbError> {
        let mut rows: Vec<BlueprintRow> = self.blueprints.read().await.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn list_active_blueprints(&self) -> Result<Vec<BlueprintRow>, DbError> {
        let mut rows = self.list_blueprints().await?;
        rows.retain(|r| r.is_active);
        Ok(rows)
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<(), DbError> {
        let mut rows = self.blueprints.write().await;
        let row = rows.get_mut(id).ok_or(DbError::NotFound)?;
        row.is_active = active;
        Ok(())
    }

    async fn delete_blueprint(&self, id: &str) -> Result<(), DbError> {
        self.blueprints
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or(DbError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blueprint(id: &str, active: bool) -> BlueprintRow {
        BlueprintRow {
            id: id.into(),
            name: format!("{id} flow"),
            definition: json!({ "nodes": [] }),
            is_active: active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_run_does_not_clobber_existing_record() {
        let store = MemoryStore::new();
        let mut run = RunRecord::start(None, json!({}), json!({ "n": 1 }));
        store.insert_run(&run).await.unwrap();

        run.trigger_data = json!({ "n": 2 });
        store.insert_run(&run).await.unwrap();

        assert_eq!(store.get_run(run.run_id).await.unwrap().trigger_data, json!({ "n": 1 }));
    }

    #[tokio::test]
    async fn terminal_states_are_sticky() {
        let store = MemoryStore::new();
        let run = RunRecord::start(None, json!({}), json!({}));
        store.insert_run(&run).await.unwrap();

        assert!(store.transition(run.run_id, RunStatus::Cancelled, None).await.unwrap());
        assert!(!store.transition(run.run_id, RunStatus::Completed, None).await.unwrap());

        let stored = store.get_run(run.run_id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Cancelled);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn failure_records_error_message() {
        let store = MemoryStore::new();
        let run = RunRecord::start(None, json!({}), json!({}));
        store.insert_run(&run).await.unwrap();

        store.transition(run.run_id, RunStatus::Failed, Some("boom")).await.unwrap();
        let stored = store.get_run(run.run_id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn missing_run_is_not_found() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.get_run(id).await, Err(DbError::NotFound)));
        assert!(matches!(
            store.save_progress(id, 0, &BTreeMap::new()).await,
            Err(DbError::NotFound)
        ));
    }

    #[tokio::test]
    async fn step_journal_round_trip() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert_eq!(store.load_step(id, "0/1/a").await.unwrap(), None);

        store.record_step(id, "0/1/a", &json!({ "ok": true })).await.unwrap();
        assert_eq!(store.load_step(id, "0/1/a").await.unwrap(), Some(json!({ "ok": true })));
        assert_eq!(store.step_count(id).await, 1);
    }

    #[tokio::test]
    async fn pruning_keeps_current_iteration_and_other_runs() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        for key in ["0/1/a", "0/sleep", "1/1/a", "1/sleep", "2/1/a"] {
            store.record_step(id, key, &json!({})).await.unwrap();
        }
        store.record_step(other, "0/1/a", &json!({})).await.unwrap();

        assert_eq!(store.prune_steps(id, 2).await.unwrap(), 4);
        assert_eq!(store.step_count(id).await, 1);
        assert!(store.load_step(id, "2/1/a").await.unwrap().is_some());
        assert_eq!(store.step_count(other).await, 1);
    }

    #[tokio::test]
    async fn only_active_blueprints_are_listed_for_dispatch() {
        let store = MemoryStore::new();
        store.save_blueprint(&blueprint("a", true)).await.unwrap();
        store.save_blueprint(&blueprint("b", false)).await.unwrap();

        let active = store.list_active_blueprints().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "a");

        store.set_active("b", true).await.unwrap();
        assert_eq!(store.list_active_blueprints().await.unwrap().len(), 2);

        store.delete_blueprint("a").await.unwrap();
        assert!(matches!(store.get_blueprint("a").await, Err(DbError::NotFound)));
        assert!(matches!(store.delete_blueprint("a").await, Err(DbError::NotFound)));
    }
}
