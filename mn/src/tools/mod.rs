//! Tool system for the Actor
//!
//! The Actor requests tool calls; the executor performs them inside the
//! sandbox. Tool schemas are declared statically and arguments arrive as
//! model-authored JSON.

pub mod builtin;
mod context;
mod executor;
mod traits;

pub use context::ToolContext;
pub use executor::ToolExecutor;
pub use traits::{Tool, ToolResult};
