//! ChatClient trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChatRequest, ChatResponse, LlmError, StreamChunk};

/// Stateless chat client - each call is independent.
///
/// The core abstraction for talking to language models. The Actor builds
/// its own conversation by accumulating messages; the client holds no state
/// between calls.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a completion request and block until the full response arrives
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Streaming completion for live observers.
    ///
    /// Sends chunks to the provided channel as they arrive and returns the
    /// final complete response.
    async fn stream(
        &self,
        request: ChatRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<ChatResponse, LlmError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted chat client for unit tests.
    ///
    /// Returns queued responses in order; erroring entries simulate gateway
    /// failures (rate limits, 5xx) at exact points in a scenario.
    pub struct MockChatClient {
        responses: Mutex<Vec<Result<ChatResponse, LlmError>>>,
        call_count: AtomicUsize,
    }

    impl MockChatClient {
        pub fn new(responses: Vec<Result<ChatResponse, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                call_count: AtomicUsize::new(0),
            }
        }

        /// Build from plain responses (no errors)
        pub fn from_responses(responses: Vec<ChatResponse>) -> Self {
            Self::new(responses.into_iter().map(Ok).collect())
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatClient for MockChatClient {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LlmError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::InvalidResponse("No more mock responses".to_string()));
            }
            responses.remove(0)
        }

        async fn stream(
            &self,
            request: ChatRequest,
            _chunk_tx: tokio::sync::mpsc::Sender<StreamChunk>,
        ) -> Result<ChatResponse, LlmError> {
            self.chat(request).await
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_returns_in_order() {
            let client = MockChatClient::from_responses(vec![
                ChatResponse {
                    content: Some("first".to_string()),
                    ..Default::default()
                },
                ChatResponse {
                    content: Some("second".to_string()),
                    ..Default::default()
                },
            ]);

            let r1 = client.chat(ChatRequest::default()).await.unwrap();
            assert_eq!(r1.content.as_deref(), Some("first"));
            let r2 = client.chat(ChatRequest::default()).await.unwrap();
            assert_eq!(r2.content.as_deref(), Some("second"));
            assert_eq!(client.call_count(), 2);
        }

        #[tokio::test]
        async fn test_mock_errors_when_exhausted() {
            let client = MockChatClient::from_responses(vec![]);
            assert!(client.chat(ChatRequest::default()).await.is_err());
        }

        #[tokio::test]
        async fn test_mock_scripted_error() {
            let client = MockChatClient::new(vec![Err(LlmError::RateLimited {
                retry_after: std::time::Duration::from_secs(30),
            })]);
            let err = client.chat(ChatRequest::default()).await.unwrap_err();
            assert!(err.is_rate_limit());
        }
    }
}
