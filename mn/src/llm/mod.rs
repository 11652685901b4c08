//! LLM client module for Midnight
//!
//! The core depends only on the [`ChatClient`] capability; the concrete
//! transport is an HTTP chat-completions gateway.

mod error;
mod gateway;
mod types;

pub mod client;

pub use client::ChatClient;
pub use error::LlmError;
pub use gateway::GatewayClient;
pub use types::{ChatMessage, ChatRequest, ChatResponse, Effort, Role, StreamChunk, TokenUsage, ToolCall, ToolDefinition};

use std::sync::Arc;

use crate::config::GatewayConfig;

/// Create a chat client for the configured gateway
pub fn create_client(config: &GatewayConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    Ok(Arc::new(GatewayClient::from_config(config)?))
}
