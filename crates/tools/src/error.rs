//! Tool-level error type.

use thiserror::Error;

/// Errors returned by a tool's `execute` method.
///
/// Expected business failures are NOT errors: tools report those as a
/// `{"status": "error", ...}` result. This type is for the unexpected.
///
/// - `Transient`: infrastructure hiccup; the step runner retries with back-off.
/// - `Fatal`: the node fails immediately.
#[derive(Debug, Error, Clone)]
pub enum ToolError {
    /// Transient failure (timeout, connection reset, ...).
    #[error("transient tool error: {0}")]
    Transient(String),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal tool error: {0}")]
    Fatal(String),
}
