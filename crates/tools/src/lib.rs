//! `tools` crate: the `Tool` contract, the dispatch registry and built-in tools.
//!
//! Every external capability (payments, messaging, spreadsheets, ...) is
//! reached through [`Tool`]. The engine never talks to an adapter directly;
//! it asks the [`ToolRegistry`] to dispatch by service name.

pub mod error;
pub mod traits;
pub mod registry;
pub mod timer;
pub mod mock;

pub use error::ToolError;
pub use traits::{Tool, is_error_result, error_message};
pub use registry::ToolRegistry;
