//! Routes inbound events to every active blueprint whose trigger listens for
//! them.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use db::BlueprintStore;

use crate::durable::store_call;
use crate::{Blueprint, EngineError, GraphEngine};

pub struct TriggerDispatcher {
    blueprints: Arc<dyn BlueprintStore>,
    engine: Arc<GraphEngine>,
}

impl TriggerDispatcher {
    pub fn new(blueprints: Arc<dyn BlueprintStore>, engine: Arc<GraphEngine>) -> Self {
        Self { blueprints, engine }
    }

    pub fn engine(&self) -> &Arc<GraphEngine> {
        &self.engine
    }

    /// Start one run per active blueprint whose first trigger node's service
    /// is `service`, with `payload` as its `trigger_data`.
    ///
    /// Returns the started run ids; no match is an empty list, not an error.
    /// A stored blueprint that no longer parses or validates is skipped, as is
    /// one whose run record could not be written. Only a failure to list the
    /// blueprints is an `Err`.
    #[instrument(skip(self, payload))]
    pub async fn dispatch(&self, service: &str, payload: Value) -> Result<Vec<Uuid>, EngineError> {
        let policy = self.engine.retry_policy();
        let rows = store_call(&policy, "blueprint list", || self.blueprints.list_active_blueprints()).await?;

        let mut started = Vec::new();
        for row in rows {
            let mut blueprint: Blueprint = match serde_json::from_value(row.definition.clone()) {
                Ok(bp) => bp,
                Err(e) => {
                    warn!(workflow_id = %row.id, "skipping unreadable blueprint: {e}");
                    continue;
                }
            };

            let listens = blueprint
                .trigger_node()
                .is_some_and(|trigger| trigger.data.service == service);
            if !listens {
                continue;
            }

            blueprint.id = Some(row.id.clone());
            debug!(workflow_id = %row.id, "trigger matched");

            // Runs already started for this event stand; a failed start is
            // logged and the remaining blueprints still get their run.
            match self.engine.launch(&blueprint, payload.clone()).await {
                Ok(run_id) => started.push(run_id),
                Err(e @ (EngineError::Database(_) | EngineError::RetryExhausted { .. })) => {
                    error!(workflow_id = %row.id, "could not persist run: {e}");
                }
                Err(e) => warn!(workflow_id = %row.id, "could not start run: {e}"),
            }
        }

        info!(count = started.len(), "event dispatched");
        Ok(started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineConfig, Node, NodeKind};
    use async_trait::async_trait;
    use db::{BlueprintRow, DbError, MemoryStore, NodeResult, RunRecord, RunStatus, RunStore};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tools::ToolRegistry;

    /// Memory store whose `insert_run` fails on the `fail_on`-th call.
    struct FailingInsert {
        inner: MemoryStore,
        inserts: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl RunStore for FailingInsert {
        async fn insert_run(&self, run: &RunRecord) -> Result<(), DbError> {
            if self.inserts.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                let corrupt = serde_json::from_str::<Value>("{").unwrap_err();
                return Err(DbError::Serialization(corrupt));
            }
            self.inner.insert_run(run).await
        }

        async fn get_run(&self, run_id: Uuid) -> Result<RunRecord, DbError> {
            self.inner.get_run(run_id).await
        }

        async fn list_runs(&self, status: Option<RunStatus>) -> Result<Vec<RunRecord>, DbError> {
            self.inner.list_runs(status).await
        }

        async fn save_progress(
            &self,
            run_id: Uuid,
            iteration: u64,
            step_results: &BTreeMap<String, NodeResult>,
        ) -> Result<(), DbError> {
            self.inner.save_progress(run_id, iteration, step_results).await
        }

        async fn transition(&self, run_id: Uuid, to: RunStatus, error_message: Option<&str>) -> Result<bool, DbError> {
            self.inner.transition(run_id, to, error_message).await
        }

        async fn load_step(&self, run_id: Uuid, step_key: &str) -> Result<Option<Value>, DbError> {
            self.inner.load_step(run_id, step_key).await
        }

        async fn record_step(&self, run_id: Uuid, step_key: &str, output: &Value) -> Result<(), DbError> {
            self.inner.record_step(run_id, step_key, output).await
        }

        async fn prune_steps(&self, run_id: Uuid, before_iteration: u64) -> Result<u64, DbError> {
            self.inner.prune_steps(run_id, before_iteration).await
        }
    }

    fn row(id: &str, trigger_service: &str, active: bool) -> BlueprintRow {
        let bp = Blueprint::new(
            id,
            vec![
                Node::new("t", NodeKind::Trigger, trigger_service, "event", json!({})),
                Node::new("a", NodeKind::Action, "noop", "run", json!({})),
            ],
        );
        BlueprintRow::new(id, id, serde_json::to_value(bp).unwrap(), active)
    }

    fn dispatcher(store: Arc<MemoryStore>) -> TriggerDispatcher {
        let engine = Arc::new(GraphEngine::new(
            store.clone(),
            Arc::new(ToolRegistry::new()),
            EngineConfig::default(),
        ));
        TriggerDispatcher::new(store, engine)
    }

    #[tokio::test]
    async fn only_active_blueprints_with_matching_trigger_start_runs() {
        let store = Arc::new(MemoryStore::new());
        store.save_blueprint(&row("wf-a", "razorpay", true)).await.unwrap();
        store.save_blueprint(&row("wf-b", "razorpay", true)).await.unwrap();
        store.save_blueprint(&row("wf-c", "razorpay", false)).await.unwrap();
        store.save_blueprint(&row("wf-d", "shopify", true)).await.unwrap();

        let started = dispatcher(store.clone())
            .dispatch("razorpay", json!({ "amount": 1 }))
            .await
            .unwrap();
        assert_eq!(started.len(), 2);

        let mut workflow_ids: Vec<String> = Vec::new();
        for run_id in started {
            let run = store.get_run(run_id).await.unwrap();
            assert_eq!(run.trigger_data, json!({ "amount": 1 }));
            workflow_ids.extend(run.workflow_id);
        }
        workflow_ids.sort();
        assert_eq!(workflow_ids, vec!["wf-a", "wf-b"]);
    }

    #[tokio::test]
    async fn unreadable_blueprints_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        store
            .save_blueprint(&BlueprintRow::new("broken", "broken", json!({ "nodes": "nope" }), true))
            .await
            .unwrap();
        store.save_blueprint(&row("ok", "razorpay", true)).await.unwrap();

        let started = dispatcher(store).dispatch("razorpay", json!({})).await.unwrap();
        assert_eq!(started.len(), 1);
    }

    #[tokio::test]
    async fn a_failed_start_does_not_undo_or_block_the_other_runs() {
        let blueprints = Arc::new(MemoryStore::new());
        for id in ["wf-a", "wf-b", "wf-c"] {
            blueprints.save_blueprint(&row(id, "razorpay", true)).await.unwrap();
        }
        let runs = Arc::new(FailingInsert { inner: MemoryStore::new(), inserts: AtomicUsize::new(0), fail_on: 2 });
        let engine = Arc::new(GraphEngine::new(
            runs.clone(),
            Arc::new(ToolRegistry::new()),
            EngineConfig::default(),
        ));

        let started = TriggerDispatcher::new(blueprints, engine)
            .dispatch("razorpay", json!({ "amount": 1 }))
            .await
            .unwrap();

        assert_eq!(started.len(), 2);
        assert_eq!(runs.inserts.load(Ordering::SeqCst), 3);
        for run_id in started {
            assert!(runs.get_run(run_id).await.is_ok());
        }
    }
}
