//! `MockTool`: a test double for `Tool`.
//!
//! Useful in unit and integration tests where a real service adapter is
//! either unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};

use crate::{Tool, ToolError};

/// Behaviour injected into `MockTool` at construction time.
pub enum MockBehaviour {
    /// Succeed with `status: "success"` merged into the given object.
    ReturnValue(Value),
    /// Report a business failure (`status: "error"`).
    ReportError(String),
    /// Fail with a `Transient` error the first `n` calls, then succeed.
    FlakyThen(u32, Value),
    /// Always fail with a `Transient` error.
    FailTransient(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
}

/// A mock tool that records every call it receives and returns a
/// programmer-specified result.
pub struct MockTool {
    /// Service name the tool registers under.
    pub service: String,
    /// What the tool will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// All `(task, params)` pairs seen by this tool (in call order).
    pub calls: Arc<Mutex<Vec<(String, Map<String, Value>)>>>,
}

impl MockTool {
    fn with_behaviour(service: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            service: service.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds with the given fields.
    pub fn returning(service: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(service, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that always reports `status: "error"`.
    pub fn reporting_error(service: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(service, MockBehaviour::ReportError(msg.into()))
    }

    /// Create a mock that fails transiently `failures` times before succeeding.
    pub fn flaky(service: impl Into<String>, failures: u32, value: Value) -> Self {
        Self::with_behaviour(service, MockBehaviour::FlakyThen(failures, value))
    }

    /// Create a mock that always fails with a `Transient` error.
    pub fn failing_transient(service: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(service, MockBehaviour::FailTransient(msg.into()))
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(service: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(service, MockBehaviour::FailFatal(msg.into()))
    }

    /// Number of times this tool has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Snapshot of every call seen so far.
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }

    fn success(value: &Value) -> Value {
        let mut out = json!({ "status": "success" });
        if let (Some(out_obj), Some(v_obj)) = (out.as_object_mut(), value.as_object()) {
            for (k, val) in v_obj {
                out_obj.insert(k.clone(), val.clone());
            }
        }
        out
    }
}

#[async_trait]
impl Tool for MockTool {
    fn service_name(&self) -> &str {
        &self.service
    }

    async fn execute(&self, task: &str, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((task.to_owned(), params.clone()));
            calls.len() as u32
        };

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(Self::success(v)),
            MockBehaviour::ReportError(msg) => Ok(json!({ "status": "error", "message": msg })),
            MockBehaviour::FlakyThen(failures, v) => {
                if attempt <= *failures {
                    Err(ToolError::Transient(format!("attempt {attempt} timed out")))
                } else {
                    Ok(Self::success(v))
                }
            }
            MockBehaviour::FailTransient(msg) => Err(ToolError::Transient(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(ToolError::Fatal(msg.clone())),
        }
    }
}
