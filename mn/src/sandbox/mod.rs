//! Bounded execution environment for Actor tool calls
//!
//! The core depends only on the [`SandboxProvider`] capability. Concrete
//! container/VM drivers live outside the core; the in-tree
//! [`NativeSandbox`] is the no-isolation fallback used when no provider
//! probes as available.

mod native;
mod provider;

pub use native::NativeSandbox;
pub use provider::{ExecRequest, ExecResult, SandboxConfig, SandboxError, SandboxProvider, select_provider};
