//! Blueprint validation: run this before persisting or executing a blueprint.
//!
//! Rules enforced:
//! 1. There is at least one node.
//! 2. Node IDs are unique and none is the reserved `trigger_data`.
//! 3. Every `next_node_id` and route target names an existing node.
//! 4. Router nodes carry at least one route.
//!
//! Cycles are allowed: a router may send the walk back upstream, and the
//! engine's step budget bounds the walk.

use std::collections::HashSet;

use crate::{models::Blueprint, EngineError, NodeKind};

/// Context key holding the inbound event; no node may shadow it.
pub const TRIGGER_DATA_KEY: &str = "trigger_data";

/// Validate a blueprint's structure.
///
/// # Errors
/// - [`EngineError::EmptyBlueprint`] if there are no nodes.
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::ReservedNodeId`] if a node is named `trigger_data`.
/// - [`EngineError::UnknownNodeReference`] if a pointer names a missing node.
/// - [`EngineError::RouterWithoutRoutes`] if a router has nothing to choose from.
pub fn validate_blueprint(blueprint: &Blueprint) -> Result<(), EngineError> {
    if blueprint.nodes.is_empty() {
        return Err(EngineError::EmptyBlueprint);
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &blueprint.nodes {
        if node.id == TRIGGER_DATA_KEY {
            return Err(EngineError::ReservedNodeId(node.id.clone()));
        }
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    for node in &blueprint.nodes {
        let route_targets = node.routes.iter().filter_map(|r| r.next_node_id.as_deref());

        for target in node.next_node_id.as_deref().into_iter().chain(route_targets) {
            if !seen_ids.contains(target) {
                return Err(EngineError::UnknownNodeReference {
                    node_id: target.to_owned(),
                    referenced_by: node.id.clone(),
                });
            }
        }

        if node.kind == NodeKind::Router && node.routes.is_empty() {
            return Err(EngineError::RouterWithoutRoutes(node.id.clone()));
        }
    }

    Ok(())
}
