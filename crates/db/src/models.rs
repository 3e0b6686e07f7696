//! Durable records.
//!
//! These are *persistence* models: they carry no domain behaviour.
//! Blueprints are kept as opaque JSON here; their typed form lives in the
//! `engine` crate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflow_runs
// ---------------------------------------------------------------------------

/// Lifecycle of a run. Everything except `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running"   => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other       => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Status of a single node within the current iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Running,
    Completed,
    Failed,
}

/// Per-node snapshot stored in `step_results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeResult {
    pub fn running() -> Self {
        Self { status: NodeStatus::Running, data: None, error: None }
    }

    pub fn completed(data: Value) -> Self {
        Self { status: NodeStatus::Completed, data: Some(data), error: None }
    }

    pub fn failed(error: impl Into<String>, data: Option<Value>) -> Self {
        Self { status: NodeStatus::Failed, data, error: Some(error.into()) }
    }
}

/// One durable, inspectable execution of a blueprint.
///
/// Iterations of a looping run share the record; `step_results` only ever
/// holds the current iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub workflow_id: Option<String>,
    pub status: RunStatus,
    pub trigger_data: Value,
    pub step_results: BTreeMap<String, NodeResult>,
    /// The blueprint captured when the run started; never changes afterwards.
    pub blueprint: Value,
    /// 0-based index of the iteration in progress.
    pub iteration: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl RunRecord {
    /// A fresh `running` record with a new run id.
    pub fn start(workflow_id: Option<String>, blueprint: Value, trigger_data: Value) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_id,
            status: RunStatus::Running,
            trigger_data,
            step_results: BTreeMap::new(),
            blueprint,
            iteration: 0,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }
}

// ---------------------------------------------------------------------------
// workflow_blueprints
// ---------------------------------------------------------------------------

/// A saved blueprint definition row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintRow {
    pub id: String,
    pub name: String,
    /// Full JSON blueprint (nodes, edges, loop_seconds, ...).
    pub definition: Value,
    /// Only active blueprints take part in trigger dispatch.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl BlueprintRow {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        definition: Value,
        is_active: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            definition,
            is_active,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_status_round_trips_through_text() {
        for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            assert_eq!(status.to_string().parse::<RunStatus>(), Ok(status));
        }
        assert!("paused".parse::<RunStatus>().is_err());
    }

    #[test]
    fn node_result_omits_empty_fields() {
        let v = serde_json::to_value(NodeResult::running()).unwrap();
        assert_eq!(v, json!({ "status": "running" }));

        let v = serde_json::to_value(NodeResult::failed("boom", None)).unwrap();
        assert_eq!(v, json!({ "status": "failed", "error": "boom" }));
    }

    #[test]
    fn new_run_is_running_at_iteration_zero() {
        let run = RunRecord::start(Some("wf".into()), json!({}), json!({ "a": 1 }));
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.iteration, 0);
        assert!(run.step_results.is_empty());
        assert!(run.completed_at.is_none());
    }
}
