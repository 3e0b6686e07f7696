//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// A blueprint must contain at least one node.
    #[error("blueprint has no nodes")]
    EmptyBlueprint,

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// A node id collides with a reserved context key.
    #[error("node ID '{0}' is reserved")]
    ReservedNodeId(String),

    /// A `next_node_id` or route target names a node that doesn't exist.
    #[error("node '{referenced_by}' references unknown node '{node_id}'")]
    UnknownNodeReference {
        node_id: String,
        referenced_by: String,
    },

    /// A router node was declared without any routes.
    #[error("router node '{0}' has no routes")]
    RouterWithoutRoutes(String),

    /// The stored or submitted blueprint JSON does not have the blueprint shape.
    #[error("malformed blueprint: {0}")]
    MalformedBlueprint(#[from] serde_json::Error),

    // ------ Execution errors ------

    /// Traversal reached a node id that is not in the blueprint.
    #[error("node '{0}' not found in blueprint")]
    UnknownNode(String),

    /// A tool reported `status: "error"`.
    #[error("node '{node_id}' failed: {message}")]
    NodeFailed {
        node_id: String,
        message: String,
    },

    /// A tool raised a fatal error.
    #[error("node '{node_id}' failed fatally: {message}")]
    NodeFatal {
        node_id: String,
        message: String,
    },

    /// A transient failure outlived the retry budget.
    #[error("{what} exceeded retry limit: {message}")]
    RetryExhausted {
        what: String,
        message: String,
    },

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}

impl EngineError {
    /// Validation failures: the blueprint itself is at fault.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::EmptyBlueprint
                | EngineError::DuplicateNodeId(_)
                | EngineError::ReservedNodeId(_)
                | EngineError::UnknownNodeReference { .. }
                | EngineError::RouterWithoutRoutes(_)
                | EngineError::MalformedBlueprint(_)
        )
    }
}
