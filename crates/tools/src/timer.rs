//! Built-in `timer` tool: pauses the walk for a number of seconds.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::{Tool, ToolError};

/// Seconds waited when `params.duration` is absent.
pub const DEFAULT_DURATION_SECS: f64 = 2.0;

/// Sleeps for `params.duration` seconds (number or numeric string).
#[derive(Debug, Default)]
pub struct TimerTool;

#[async_trait]
impl Tool for TimerTool {
    fn service_name(&self) -> &str {
        "timer"
    }

    async fn execute(&self, _task: &str, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let duration = match params.get("duration") {
            None | Some(Value::Null) => DEFAULT_DURATION_SECS,
            Some(Value::Number(n)) => n.as_f64().unwrap_or(DEFAULT_DURATION_SECS),
            Some(Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(secs) => secs,
                Err(_) => {
                    return Ok(json!({
                        "status": "error",
                        "message": format!("invalid duration '{s}'"),
                    }))
                }
            },
            Some(other) => {
                return Ok(json!({
                    "status": "error",
                    "message": format!("invalid duration {other}"),
                }))
            }
        };

        // Rejects negative, non-finite and out-of-range values alike.
        let Ok(wait) = Duration::try_from_secs_f64(duration) else {
            return Ok(json!({
                "status": "error",
                "message": format!("invalid duration {duration}"),
            }));
        };

        debug!(duration, "timer sleeping");
        tokio::time::sleep(wait).await;

        Ok(json!({
            "status": "success",
            "message": format!("Timer finished after {duration} seconds"),
            "duration": duration,
        }))
    }
}
