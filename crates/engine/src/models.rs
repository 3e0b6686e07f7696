//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a blueprint looks like in
//! memory. They serialise to/from the JSON `definition` stored alongside
//! saved blueprints and the `blueprint` captured by every run.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

/// What a node does when the walk reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point matched against inbound events; also invokes its tool.
    Trigger,
    /// Invokes a tool.
    Action,
    /// Chooses the next node from its routes.
    Router,
}

// ---------------------------------------------------------------------------
// NodeData
// ---------------------------------------------------------------------------

/// Service binding and parameters of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Registry key, e.g. `"razorpay"`, `"whatsapp"`.
    #[serde(default)]
    pub service: String,
    /// Tool-specific task, e.g. `"send_message"`.
    #[serde(default)]
    pub task: String,
    /// Literal values and `{{path}}` templates, nested arbitrarily.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub params: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Route
// ---------------------------------------------------------------------------

/// `variable operator value`, e.g. `{{sentiment}} == "negative"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub variable: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

/// One branch of a router node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// `None` (or an empty condition) makes this the fallback route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    pub next_node_id: Option<String>,
}

impl Route {
    pub fn is_fallback(&self) -> bool {
        match &self.condition {
            None => true,
            Some(c) => c.variable.is_empty() && c.operator.is_empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within this blueprint.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub data: NodeData,
    /// Explicit successor. When absent, the next node in list order follows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_node_id: Option<String>,
    /// Router nodes only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Descriptive wiring for editors. Never consulted by traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
}

// ---------------------------------------------------------------------------
// Blueprint
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Re-run the whole graph every `loop_seconds`; `0` runs once.
    #[serde(default)]
    pub loop_seconds: u64,
}

impl Blueprint {
    /// Convenience constructor for testing.
    pub fn new(name: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            id: None,
            name: name.into(),
            nodes,
            edges: Vec::new(),
            loop_seconds: 0,
        }
    }

    /// Where every walk begins: the first node in list order.
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes.first()
    }

    /// The first `trigger`-typed node, used for event matching.
    pub fn trigger_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.kind == NodeKind::Trigger)
    }

    /// node id → (position in `nodes`, node).
    pub fn node_index(&self) -> HashMap<&str, (usize, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), (i, n)))
            .collect()
    }
}

impl Node {
    /// Convenience constructor for trigger/action nodes.
    pub fn new(
        id: impl Into<String>,
        kind: NodeKind,
        service: impl Into<String>,
        task: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            data: NodeData {
                service: service.into(),
                task: task.into(),
                params: params.as_object().cloned().unwrap_or_default(),
            },
            next_node_id: None,
            routes: Vec::new(),
        }
    }

    /// Convenience constructor for router nodes.
    pub fn router(id: impl Into<String>, routes: Vec<Route>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Router,
            data: NodeData::default(),
            next_node_id: None,
            routes,
        }
    }

    pub fn then(mut self, next: impl Into<String>) -> Self {
        self.next_node_id = Some(next.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_blueprint_json() {
        let bp: Blueprint = serde_json::from_value(json!({
            "name": "payment thank-you",
            "nodes": [
                { "id": "t", "type": "trigger",
                  "data": { "service": "razorpay", "task": "payment_captured", "params": null } },
                { "id": "r", "type": "router",
                  "routes": [
                      { "condition": { "variable": "{{trigger_data.amount}}", "operator": ">", "value": 1000 },
                        "next_node_id": "vip" },
                      { "next_node_id": "thanks" }
                  ] },
                { "id": "vip", "type": "action",
                  "data": { "service": "whatsapp", "task": "send_message", "params": { "n": 1 } } },
                { "id": "thanks", "type": "action",
                  "data": { "service": "whatsapp", "task": "send_message" } }
            ],
            "edges": [{ "id": "e1", "source": "t", "target": "r" }]
        }))
        .unwrap();

        assert_eq!(bp.loop_seconds, 0);
        assert!(bp.nodes[0].data.params.is_empty());
        assert_eq!(bp.nodes[1].kind, NodeKind::Router);
        assert!(!bp.nodes[1].routes[0].is_fallback());
        assert!(bp.nodes[1].routes[1].is_fallback());
        assert_eq!(bp.trigger_node().unwrap().data.service, "razorpay");
        assert_eq!(bp.node_index()["thanks"].0, 3);
    }

    #[test]
    fn empty_condition_is_fallback() {
        let route: Route =
            serde_json::from_value(json!({ "condition": {}, "next_node_id": "x" })).unwrap();
        assert!(route.is_fallback());
    }

    #[test]
    fn trigger_node_is_first_trigger_not_first_node() {
        let bp = Blueprint::new(
            "t",
            vec![
                Node::new("a", NodeKind::Action, "sheets", "append", json!({})),
                Node::new("b", NodeKind::Trigger, "stripe", "charge", json!({})),
            ],
        );
        assert_eq!(bp.start_node().unwrap().id, "a");
        assert_eq!(bp.trigger_node().unwrap().id, "b");
    }
}
