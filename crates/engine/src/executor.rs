//! Workflow graph engine.
//!
//! `GraphEngine` is the central orchestrator for one run at a time:
//! 1. Polls the persisted run status at the top of every iteration and
//!    before every loop sleep (cooperative cancellation).
//! 2. Walks the graph from the first node, following `next_node_id`, router
//!    decisions, or list order.
//! 3. Resolves params against the iteration's context and calls tools through
//!    the step journal, so a resumed run never repeats a recorded side effect.
//! 4. Checkpoints `step_results` before and after every node.
//! 5. Sleeps durably and starts over when the blueprint loops, dropping the
//!    previous iteration's journal entries.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use db::{NodeResult, RunRecord, RunStatus, RunStore};
use tools::{error_message, is_error_result, ToolError, ToolRegistry};

use crate::context::ExecutionContext;
use crate::durable::{store_call, RetryPolicy, StepJournal};
use crate::resolver::resolve_map;
use crate::router::matching_route;
use crate::validate::validate_blueprint;
use crate::{Blueprint, EngineError, Node, NodeKind};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Nodes visited per iteration before the walk is cut off.
    pub max_steps: usize,
    /// Retries for transient tool and store failures.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
        }
    }
}

/// What one node produced and where the walk goes next.
struct StepOutcome {
    result: Value,
    next: Option<String>,
}

// ---------------------------------------------------------------------------
// GraphEngine
// ---------------------------------------------------------------------------

/// Drives runs to completion against a [`RunStore`] and a [`ToolRegistry`].
///
/// Holds no per-run state: any number of runs may be driven concurrently
/// through one `Arc<GraphEngine>`.
pub struct GraphEngine {
    store: Arc<dyn RunStore>,
    tools: Arc<ToolRegistry>,
    config: EngineConfig,
}

impl GraphEngine {
    /// Create a new engine.
    pub fn new(store: Arc<dyn RunStore>, tools: Arc<ToolRegistry>, config: EngineConfig) -> Self {
        Self { store, tools, config }
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.max_retries,
            base_delay: self.config.retry_base_delay,
        }
    }

    /// Validate `blueprint` and persist a new `running` record for it.
    ///
    /// Nothing executes until [`GraphEngine::run`] (or [`GraphEngine::spawn`])
    /// is called with the returned id.
    pub async fn start(&self, blueprint: &Blueprint, trigger_data: Value) -> Result<Uuid, EngineError> {
        validate_blueprint(blueprint)?;

        let record = RunRecord::start(
            blueprint.id.clone(),
            serde_json::to_value(blueprint)?,
            trigger_data,
        );
        store_call(&self.retry_policy(), "run insert", || self.store.insert_run(&record)).await?;

        info!(run_id = %record.run_id, workflow_id = ?blueprint.id, "run created");
        Ok(record.run_id)
    }

    /// Drive `run_id` on a background task.
    pub fn spawn(self: &Arc<Self>, run_id: Uuid) -> JoinHandle<Result<RunStatus, EngineError>> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run(run_id).await })
    }

    /// [`GraphEngine::start`] followed by [`GraphEngine::spawn`].
    pub async fn launch(self: &Arc<Self>, blueprint: &Blueprint, trigger_data: Value) -> Result<Uuid, EngineError> {
        let run_id = self.start(blueprint, trigger_data).await?;
        self.spawn(run_id);
        Ok(run_id)
    }

    /// Re-drive every run still marked `running` (e.g. after a restart).
    pub async fn resume_incomplete(self: &Arc<Self>) -> Result<usize, EngineError> {
        let runs = store_call(&self.retry_policy(), "run list", || {
            self.store.list_runs(Some(RunStatus::Running))
        })
        .await?;

        for run in &runs {
            info!(run_id = %run.run_id, iteration = run.iteration, "resuming run");
            self.spawn(run.run_id);
        }
        Ok(runs.len())
    }

    /// Drive a persisted run until it completes, fails, or is cancelled.
    ///
    /// Safe to call again for the same run after a crash: recorded steps are
    /// replayed, not re-executed.
    ///
    /// # Errors
    /// Any node or iteration failure. The run is marked `failed` (with
    /// `error_message`) before the error is returned.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub async fn run(&self, run_id: Uuid) -> Result<RunStatus, EngineError> {
        match self.drive(run_id).await {
            Ok(status) => Ok(status),
            Err(e) => {
                error!("run failed: {e}");
                let message = e.to_string();
                let marked = store_call(&self.retry_policy(), "run transition", || {
                    self.store.transition(run_id, RunStatus::Failed, Some(&message))
                })
                .await;
                if let Err(store_err) = marked {
                    error!("could not mark run failed: {store_err}");
                }
                Err(e)
            }
        }
    }

    async fn read_run(&self, run_id: Uuid) -> Result<RunRecord, EngineError> {
        store_call(&self.retry_policy(), "run read", || self.store.get_run(run_id)).await
    }

    async fn drive(&self, run_id: Uuid) -> Result<RunStatus, EngineError> {
        let record = self.read_run(run_id).await?;
        let blueprint: Blueprint = serde_json::from_value(record.blueprint.clone())?;
        let journal = StepJournal::new(self.store.as_ref(), run_id, self.retry_policy());
        let mut iteration = record.iteration;

        loop {
            // Cooperative cancellation: checked between iterations and before
            // each loop sleep.
            let current = self.read_run(run_id).await?;
            if current.status != RunStatus::Running {
                info!(status = %current.status, "run no longer running, stopping");
                return Ok(current.status);
            }

            info!(iteration, "iteration started");
            self.walk(run_id, &blueprint, &record.trigger_data, iteration, &journal)
                .await?;

            if blueprint.loop_seconds == 0 {
                let completed = store_call(&self.retry_policy(), "run transition", || {
                    self.store.transition(run_id, RunStatus::Completed, None)
                })
                .await?;
                if !completed {
                    return Ok(self.read_run(run_id).await?.status);
                }
                info!("run completed");
                return Ok(RunStatus::Completed);
            }

            let current = self.read_run(run_id).await?;
            if current.status != RunStatus::Running {
                info!(status = %current.status, "run no longer running, skipping sleep");
                return Ok(current.status);
            }

            debug!(iteration, seconds = blueprint.loop_seconds, "sleeping before next iteration");
            journal
                .sleep(&format!("{iteration}/sleep"), Duration::from_secs(blueprint.loop_seconds))
                .await?;
            iteration += 1;
        }
    }

    async fn checkpoint(
        &self,
        run_id: Uuid,
        iteration: u64,
        results: &BTreeMap<String, NodeResult>,
    ) -> Result<(), EngineError> {
        store_call(&self.retry_policy(), "checkpoint", || {
            self.store.save_progress(run_id, iteration, results)
        })
        .await
    }

    /// One pass over the graph with a fresh context.
    async fn walk(
        &self,
        run_id: Uuid,
        blueprint: &Blueprint,
        trigger_data: &Value,
        iteration: u64,
        journal: &StepJournal<'_>,
    ) -> Result<(), EngineError> {
        let index = blueprint.node_index();
        let mut ctx = ExecutionContext::new(trigger_data.clone());
        let mut results: BTreeMap<String, NodeResult> = BTreeMap::new();
        self.checkpoint(run_id, iteration, &results).await?;
        if iteration > 0 {
            journal.prune_before(iteration).await?;
        }

        let mut current = blueprint.start_node().map(|n| n.id.clone());
        let mut position = 0usize;

        while let Some(node_id) = current.take() {
            if position >= self.config.max_steps {
                warn!(
                    max_steps = self.config.max_steps,
                    next = %node_id,
                    "step budget exhausted, stopping walk"
                );
                break;
            }
            position += 1;

            let (list_index, node) = index
                .get(node_id.as_str())
                .copied()
                .ok_or_else(|| EngineError::UnknownNode(node_id.clone()))?;

            results.insert(node.id.clone(), NodeResult::running());
            self.checkpoint(run_id, iteration, &results).await?;

            let step_key = format!("{iteration}/{position}/{}", node.id);
            let outcome = match node.kind {
                NodeKind::Router => Ok(self.route(node, &ctx)),
                NodeKind::Action | NodeKind::Trigger => {
                    self.invoke(node, list_index, blueprint, &ctx, journal, &step_key)
                        .await
                }
            };

            match outcome {
                Ok(step) if is_error_result(&step.result) => {
                    let message = error_message(&step.result);
                    error!(node = %node.id, "node reported error: {message}");
                    results.insert(node.id.clone(), NodeResult::failed(message.clone(), Some(step.result)));
                    self.checkpoint(run_id, iteration, &results).await?;
                    return Err(EngineError::NodeFailed { node_id: node.id.clone(), message });
                }
                Ok(step) => {
                    debug!(node = %node.id, next = ?step.next, "node completed");
                    results.insert(node.id.clone(), NodeResult::completed(step.result.clone()));
                    self.checkpoint(run_id, iteration, &results).await?;
                    ctx.insert_result(&node.id, &node.data.service, step.result);
                    current = step.next;
                }
                Err(e) => {
                    error!(node = %node.id, "node failed: {e}");
                    results.insert(node.id.clone(), NodeResult::failed(e.to_string(), None));
                    if let Err(store_err) = self.checkpoint(run_id, iteration, &results).await {
                        error!("could not checkpoint failed node: {store_err}");
                    }
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    fn route(&self, node: &Node, ctx: &ExecutionContext) -> StepOutcome {
        match matching_route(&node.routes, ctx.as_value()) {
            Some((i, route)) => {
                let next = route.next_node_id.clone();
                StepOutcome {
                    result: json!({
                        "status": "routed",
                        "selected_route": i,
                        "next_node_id": next,
                        "message": format!("route {i} selected"),
                    }),
                    next,
                }
            }
            None => {
                warn!(node = %node.id, "no route matched and no fallback, ending walk");
                StepOutcome {
                    result: json!({
                        "status": "routed",
                        "selected_route": null,
                        "next_node_id": null,
                        "message": "no route matched",
                    }),
                    next: None,
                }
            }
        }
    }

    async fn invoke(
        &self,
        node: &Node,
        list_index: usize,
        blueprint: &Blueprint,
        ctx: &ExecutionContext,
        journal: &StepJournal<'_>,
        step_key: &str,
    ) -> Result<StepOutcome, EngineError> {
        let service = node.data.service.as_str();
        let task = node.data.task.as_str();

        let result = if node.kind == NodeKind::Trigger && !self.tools.contains(service) {
            // No adapter for the trigger's service: the inbound event is its output.
            json!({
                "status": "success",
                "service": service,
                "task": task,
                "data": ctx.trigger_data(),
            })
        } else {
            let params = resolve_map(&node.data.params, ctx.as_value());
            debug!(node = %node.id, service, task, "invoking tool");
            journal
                .run_step(&node.id, step_key, || {
                    call_tool(Arc::clone(&self.tools), service.to_owned(), task.to_owned(), params.clone())
                })
                .await?
        };

        let next = node
            .next_node_id
            .clone()
            .or_else(|| blueprint.nodes.get(list_index + 1).map(|n| n.id.clone()));

        Ok(StepOutcome { result, next })
    }
}

/// One tool call on its own task. A panicking adapter becomes a fatal tool
/// error on the node.
async fn call_tool(
    tools: Arc<ToolRegistry>,
    service: String,
    task: String,
    params: Map<String, Value>,
) -> Result<Value, ToolError> {
    tokio::spawn(async move { tools.execute(&service, &task, &params).await })
        .await
        .unwrap_or_else(|e| Err(ToolError::Fatal(format!("tool crashed: {e}"))))
}
