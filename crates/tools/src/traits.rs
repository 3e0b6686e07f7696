//! The `Tool` trait: the contract every service adapter must fulfil.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::ToolError;

/// A service adapter invoked by action and trigger nodes.
///
/// `execute` returns a JSON object carrying at least a `status` field of
/// `"success"` or `"error"`. Any other fields are the tool's output and become
/// visible to later nodes through the execution context.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The service name this tool is registered under (e.g. `"whatsapp"`).
    fn service_name(&self) -> &str;

    /// Run `task` with already-resolved `params`.
    async fn execute(&self, task: &str, params: &Map<String, Value>) -> Result<Value, ToolError>;
}

/// `true` when a tool result reports `status: "error"`.
pub fn is_error_result(result: &Value) -> bool {
    result.get("status").and_then(Value::as_str) == Some("error")
}

/// Best-effort human readable message from an error result.
pub fn error_message(result: &Value) -> String {
    ["message", "details", "error"]
        .iter()
        .find_map(|k| result.get(*k).and_then(Value::as_str))
        .map(str::to_owned)
        .unwrap_or_else(|| result.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_status_is_detected() {
        assert!(is_error_result(&json!({ "status": "error" })));
        assert!(!is_error_result(&json!({ "status": "success" })));
        assert!(!is_error_result(&json!("error")));
    }

    #[test]
    fn error_message_prefers_message_then_details() {
        assert_eq!(error_message(&json!({ "status": "error", "message": "nope" })), "nope");
        assert_eq!(error_message(&json!({ "status": "error", "details": "boom" })), "boom");
        assert_eq!(
            error_message(&json!({ "status": "error" })),
            r#"{"status":"error"}"#
        );
    }
}
