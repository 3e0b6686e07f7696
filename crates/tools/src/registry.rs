//! Service-name → tool dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::{Tool, ToolError};

/// Read-mostly map from service name to a [`Tool`].
///
/// Built once at startup and shared (behind an `Arc`) by every run.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool` under its own service name, replacing any previous one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.service_name().to_owned(), tool);
        self
    }

    /// Builder-style variant of [`ToolRegistry::register`].
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn contains(&self, service: &str) -> bool {
        self.tools.contains_key(service)
    }

    pub fn services(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Dispatch to the tool registered for `service`.
    ///
    /// An unknown service is not an `Err`: it yields a synthetic
    /// `{"status": "error"}` result so callers treat it like any other
    /// tool-reported failure.
    pub async fn execute(
        &self,
        service: &str,
        task: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        match self.tools.get(service) {
            Some(tool) => tool.execute(task, params).await,
            None => {
                warn!(service, "service not integrated");
                Ok(json!({
                    "status": "error",
                    "message": format!("service '{service}' not integrated"),
                }))
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("services", &self.services())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTool;
    use crate::is_error_result;

    #[tokio::test]
    async fn dispatches_by_service_name() {
        let sheets = Arc::new(MockTool::returning("google_sheets", json!({ "row": 7 })));
        let registry = ToolRegistry::new().with(sheets.clone());

        let out = registry
            .execute("google_sheets", "append_row", &Map::new())
            .await
            .unwrap();

        assert_eq!(out["status"], "success");
        assert_eq!(out["row"], 7);
        assert_eq!(sheets.call_count(), 1);
        assert_eq!(sheets.calls()[0].0, "append_row");
    }

    #[tokio::test]
    async fn unknown_service_is_a_synthetic_error_result() {
        let registry = ToolRegistry::new();
        let out = registry.execute("stripe", "charge", &Map::new()).await.unwrap();

        assert!(is_error_result(&out));
        assert!(out["message"].as_str().unwrap().contains("not integrated"));
    }

    #[test]
    fn services_are_listed_sorted() {
        let registry = ToolRegistry::new()
            .with(Arc::new(MockTool::returning("whatsapp", json!({}))))
            .with(Arc::new(MockTool::returning("razorpay", json!({}))));
        assert_eq!(registry.services(), vec!["razorpay", "whatsapp"]);
        assert!(registry.contains("whatsapp"));
        assert!(!registry.contains("slack"));
    }
}
