//! Chat-completions gateway client
//!
//! Implements [`ChatClient`] against an OpenAI-style chat-completions HTTP
//! gateway with blocking and streaming responses. A 429 from the gateway
//! surfaces as [`LlmError::RateLimited`] so the orchestrator can enter a
//! provider cooldown.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::types::parse_tool_arguments;
use super::{ChatClient, ChatMessage, ChatRequest, ChatResponse, LlmError, Role, StreamChunk, TokenUsage, ToolCall};
use crate::config::GatewayConfig;

/// OpenAI-style chat-completions gateway client
pub struct GatewayClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl GatewayClient {
    /// Create a new client from configuration.
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::InvalidResponse(format!("Environment variable {} not set", config.api_key_env)))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    /// Build the request body for the gateway
    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let max_tokens = request.max_tokens.unwrap_or(self.max_tokens).min(self.max_tokens);

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": self.convert_messages(&request.messages),
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(effort) = request.effort {
            // Provider-specific interpretation; passed through verbatim
            body["reasoning_effort"] = serde_json::json!(effort.to_string());
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(
                request.tools.iter().map(|t| t.to_gateway_schema()).collect::<Vec<_>>()
            );
            body["tool_choice"] = serde_json::json!("auto");
        }

        body
    }

    /// Convert internal messages to the gateway wire format
    fn convert_messages(&self, messages: &[ChatMessage]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };

                let mut value = serde_json::json!({
                    "role": role,
                    "content": msg.content,
                });

                if !msg.tool_calls.is_empty() {
                    value["tool_calls"] = serde_json::json!(
                        msg.tool_calls
                            .iter()
                            .map(|call| {
                                serde_json::json!({
                                    "id": call.id,
                                    "type": "function",
                                    "function": {
                                        "name": call.name,
                                        "arguments": call.arguments.to_string(),
                                    }
                                })
                            })
                            .collect::<Vec<_>>()
                    );
                }
                if let Some(tool_call_id) = &msg.tool_call_id {
                    value["tool_call_id"] = serde_json::json!(tool_call_id);
                }

                value
            })
            .collect()
    }

    /// Parse the gateway response
    fn parse_response(&self, api_response: GatewayResponse) -> ChatResponse {
        let choice = api_response.choices.into_iter().next();

        let (content, tool_calls) = match choice {
            Some(c) => {
                let tool_calls = c
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tc| ToolCall {
                        id: tc.id,
                        name: tc.function.name,
                        arguments: parse_tool_arguments(&tc.function.arguments),
                    })
                    .collect();
                (c.message.content, tool_calls)
            }
            None => (None, Vec::new()),
        };

        ChatResponse {
            content,
            tool_calls,
            usage: TokenUsage {
                prompt_tokens: api_response.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
                completion_tokens: api_response.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
            },
        }
    }

    fn rate_limit_error(response: &reqwest::Response) -> LlmError {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        LlmError::RateLimited {
            retry_after: Duration::from_secs(retry_after),
        }
    }
}

#[async_trait]
impl ChatClient for GatewayClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(&request);
        debug!(model = %body["model"], messages = request.messages.len(), "GatewayClient::chat");

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if response.status().as_u16() == 429 {
            return Err(Self::rate_limit_error(&response));
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, message: text });
        }

        let api_response: GatewayResponse = response.json().await?;
        Ok(self.parse_response(api_response))
    }

    async fn stream(
        &self,
        request: ChatRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut body = self.build_request_body(&request);
        body["stream"] = serde_json::json!(true);

        let http_request = self.http.post(url).bearer_auth(&self.api_key).json(&body);
        let mut es = EventSource::new(http_request).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let mut full_content = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        // index -> (id, name, accumulated arguments json)
        let mut partial_tools: Vec<(String, String, String)> = Vec::new();
        let mut usage = TokenUsage::default();

        while let Some(event) = es.next().await {
            match event {
                Ok(SseEvent::Open) => {}
                Ok(SseEvent::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }
                    let data: serde_json::Value = serde_json::from_str(&msg.data).map_err(LlmError::Json)?;

                    if let Some(u) = data.get("usage").filter(|u| !u.is_null()) {
                        usage.prompt_tokens = u["prompt_tokens"].as_u64().unwrap_or(0);
                        usage.completion_tokens = u["completion_tokens"].as_u64().unwrap_or(0);
                    }

                    let delta = &data["choices"][0]["delta"];
                    if let Some(text) = delta["content"].as_str() {
                        full_content.push_str(text);
                        let _ = chunk_tx.send(StreamChunk::TextDelta(text.to_string())).await;
                    }
                    if let Some(calls) = delta["tool_calls"].as_array() {
                        for call in calls {
                            let index = call["index"].as_u64().unwrap_or(0) as usize;
                            while partial_tools.len() <= index {
                                partial_tools.push((String::new(), String::new(), String::new()));
                            }
                            let slot = &mut partial_tools[index];
                            if let Some(id) = call["id"].as_str() {
                                slot.0 = id.to_string();
                            }
                            if let Some(name) = call["function"]["name"].as_str() {
                                slot.1 = name.to_string();
                            }
                            if let Some(args) = call["function"]["arguments"].as_str() {
                                slot.2.push_str(args);
                            }
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    let _ = chunk_tx.send(StreamChunk::Error(e.to_string())).await;
                    return Err(LlmError::InvalidResponse(e.to_string()));
                }
            }
        }

        for (id, name, args) in partial_tools {
            if !name.is_empty() {
                tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: parse_tool_arguments(&args),
                });
            }
        }

        let _ = chunk_tx.send(StreamChunk::Done { usage }).await;

        Ok(ChatResponse {
            content: if full_content.is_empty() { None } else { Some(full_content) },
            tool_calls,
            usage,
        })
    }
}

// Gateway wire types

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    choices: Vec<GatewayChoice>,
    usage: Option<GatewayUsage>,
}

#[derive(Debug, Deserialize)]
struct GatewayChoice {
    message: GatewayMessage,
}

#[derive(Debug, Deserialize)]
struct GatewayMessage {
    content: Option<String>,
    tool_calls: Option<Vec<GatewayToolCall>>,
}

#[derive(Debug, Deserialize)]
struct GatewayToolCall {
    id: String,
    function: GatewayFunction,
}

#[derive(Debug, Deserialize)]
struct GatewayFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct GatewayUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Effort, ToolDefinition};

    fn test_client() -> GatewayClient {
        GatewayClient {
            model: "midnight-actor-1".to_string(),
            api_key: "test-key".to_string(),
            base_url: "http://localhost:8080".to_string(),
            http: Client::new(),
            max_tokens: 8192,
        }
    }

    #[test]
    fn test_build_request_body_basic() {
        let client = test_client();
        let request = ChatRequest {
            messages: vec![ChatMessage::system("You are helpful"), ChatMessage::user("Hello")],
            max_tokens: Some(1000),
            ..Default::default()
        };

        let body = client.build_request_body(&request);
        assert_eq!(body["model"], "midnight-actor-1");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_build_request_body_caps_max_tokens() {
        let client = test_client();
        let request = ChatRequest {
            max_tokens: Some(999_999),
            ..Default::default()
        };
        let body = client.build_request_body(&request);
        assert_eq!(body["max_tokens"], 8192);
    }

    #[test]
    fn test_build_request_body_with_tools_and_effort() {
        let client = test_client();
        let request = ChatRequest {
            effort: Some(Effort::Max),
            tools: vec![ToolDefinition::new(
                "read_file",
                "Read a file",
                serde_json::json!({"type": "object"}),
            )],
            ..Default::default()
        };

        let body = client.build_request_body(&request);
        assert_eq!(body["reasoning_effort"], "max");
        assert_eq!(body["tools"][0]["function"]["name"], "read_file");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn test_convert_tool_result_message() {
        let client = test_client();
        let messages = vec![ChatMessage::tool_result("call_7", "file contents")];
        let converted = client.convert_messages(&messages);
        assert_eq!(converted[0]["role"], "tool");
        assert_eq!(converted[0]["tool_call_id"], "call_7");
    }

    #[test]
    fn test_parse_response_with_malformed_tool_args() {
        let client = test_client();
        let api_response = GatewayResponse {
            choices: vec![GatewayChoice {
                message: GatewayMessage {
                    content: None,
                    tool_calls: Some(vec![GatewayToolCall {
                        id: "call_1".to_string(),
                        function: GatewayFunction {
                            name: "write_file".to_string(),
                            arguments: "{broken".to_string(),
                        },
                    }]),
                },
            }],
            usage: Some(GatewayUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            }),
        };

        let response = client.parse_response(api_response);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].arguments, serde_json::json!({}));
        assert_eq!(response.usage.total(), 15);
    }
}
