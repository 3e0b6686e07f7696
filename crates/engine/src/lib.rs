//! `engine` crate: blueprint model, template resolution, routing and the
//! durable graph engine.
//!
//! Data flow: an inbound event reaches the [`TriggerDispatcher`], which starts
//! one run per matching blueprint on the [`GraphEngine`]. The engine walks the
//! graph node by node, resolving params through [`resolver`], branching
//! through [`router`], calling tools through the registry and checkpointing
//! every step into the run store.

pub mod models;
pub mod error;
pub mod validate;
pub mod context;
pub mod resolver;
pub mod router;
pub mod durable;
pub mod executor;
pub mod dispatcher;

pub use models::{Blueprint, Condition, Edge, Node, NodeData, NodeKind, Route};
pub use error::EngineError;
pub use validate::validate_blueprint;
pub use context::ExecutionContext;
pub use executor::{EngineConfig, GraphEngine};
pub use dispatcher::TriggerDispatcher;
