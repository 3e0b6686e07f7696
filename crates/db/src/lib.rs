//! `db` crate: pure persistence layer.
//!
//! Provides the durable record types, the [`RunStore`] / [`BlueprintStore`]
//! contracts the engine is written against, an in-memory implementation and a
//! Postgres implementation. No business logic lives here.

pub mod error;
pub mod models;
pub mod store;
pub mod memory;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use models::{BlueprintRow, NodeResult, NodeStatus, RunRecord, RunStatus};
pub use store::{BlueprintStore, RunStore};
pub use memory::MemoryStore;
pub use repository::PgStore;
