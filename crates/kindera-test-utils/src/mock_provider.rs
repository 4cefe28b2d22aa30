// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock model provider for deterministic testing.
//!
//! `MockProvider` implements [`ModelProvider`] with pre-configured
//! responses, enabling fast, CI-runnable tests without external API calls.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use futures::stream;
use tokio::sync::Mutex;

use kindera_core::{
    ContentBlock, KinderaError, ModelProvider, ModelRequest, ModelResponse, ModelStreamChunk,
    StreamEventType, TokenUsage, ToolUseBlock,
};

/// Builds a plain-text response that ends the turn.
pub fn text_response(text: &str) -> ModelResponse {
    ModelResponse {
        id: format!("mock-{}", uuid::Uuid::new_v4()),
        content: vec![ContentBlock::Text {
            text: text.to_string(),
        }],
        model: "mock-model".to_string(),
        stop_reason: Some("end_turn".to_string()),
        usage: TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 20,
            cache_read_tokens: 0,
        },
    }
}

/// Builds a response that requests one tool invocation, with optional
/// leading reasoning text.
pub fn tool_use_response(
    reasoning: Option<&str>,
    id: &str,
    name: &str,
    input: serde_json::Value,
) -> ModelResponse {
    let mut content = Vec::new();
    if let Some(text) = reasoning {
        content.push(ContentBlock::Text {
            text: text.to_string(),
        });
    }
    content.push(ContentBlock::ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        input,
    });
    ModelResponse {
        id: format!("mock-{}", uuid::Uuid::new_v4()),
        content,
        model: "mock-model".to_string(),
        stop_reason: Some("tool_use".to_string()),
        usage: TokenUsage {
            prompt_tokens: 15,
            completion_tokens: 8,
            cache_read_tokens: 0,
        },
    }
}

/// A mock model provider that replays pre-configured responses.
///
/// Responses are popped from a FIFO queue; both `complete` and `stream`
/// consume from the same queue. When the queue is empty a default
/// "mock response" text is returned. Every request is recorded for
/// assertions.
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<ModelResponse>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_responses(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append a response to the end of the queue.
    pub async fn push(&self, response: ModelResponse) {
        self.responses.lock().await.push_back(response);
    }

    /// All requests received so far, in order.
    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_response(&self, request: &ModelRequest) -> ModelResponse {
        self.requests.lock().await.push(request.clone());
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| text_response("mock response"))
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn chunk(event_type: StreamEventType) -> ModelStreamChunk {
    ModelStreamChunk {
        event_type,
        text: None,
        tool_use: None,
        usage: None,
        stop_reason: None,
        error: None,
    }
}

/// Expands a full response into the chunk sequence a real streaming
/// provider would emit: `MessageStart`, one delta per content block,
/// `MessageDelta` with usage and stop reason, then `MessageStop`.
fn response_to_chunks(response: ModelResponse) -> Vec<Result<ModelStreamChunk, KinderaError>> {
    let mut chunks = vec![Ok(chunk(StreamEventType::MessageStart))];

    for block in response.content {
        match block {
            ContentBlock::Text { text } => {
                let mut c = chunk(StreamEventType::ContentBlockDelta);
                c.text = Some(text);
                chunks.push(Ok(c));
            }
            ContentBlock::ToolUse { id, name, input } => {
                let mut c = chunk(StreamEventType::ContentBlockDelta);
                c.tool_use = Some(ToolUseBlock { id, name, input });
                chunks.push(Ok(c));
            }
            ContentBlock::ToolResult { .. } => {}
        }
    }

    let mut delta = chunk(StreamEventType::MessageDelta);
    delta.usage = Some(response.usage);
    delta.stop_reason = response.stop_reason.clone();
    chunks.push(Ok(delta));

    let mut stop = chunk(StreamEventType::MessageStop);
    stop.stop_reason = response.stop_reason;
    chunks.push(Ok(stop));

    chunks
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, KinderaError> {
        Ok(self.next_response(&request).await)
    }

    async fn stream(
        &self,
        request: ModelRequest,
    ) -> Result<
        Pin<Box<dyn Stream<Item = Result<ModelStreamChunk, KinderaError>> + Send>>,
        KinderaError,
    > {
        let response = self.next_response(&request).await;
        Ok(Box::pin(stream::iter(response_to_chunks(response))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn request() -> ModelRequest {
        ModelRequest {
            model: "mock-model".into(),
            system_blocks: serde_json::Value::Null,
            messages: vec![],
            max_tokens: 100,
            stream: false,
            tools: None,
        }
    }

    #[tokio::test]
    async fn default_response_when_queue_empty() {
        let provider = MockProvider::new();
        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.text(), "mock response");
    }

    #[tokio::test]
    async fn queued_responses_returned_in_order() {
        let provider =
            MockProvider::with_responses(vec![text_response("first"), text_response("second")]);
        assert_eq!(provider.complete(request()).await.unwrap().text(), "first");
        assert_eq!(provider.complete(request()).await.unwrap().text(), "second");
        assert_eq!(
            provider.complete(request()).await.unwrap().text(),
            "mock response"
        );
    }

    #[tokio::test]
    async fn stream_produces_full_event_sequence() {
        let provider = MockProvider::with_responses(vec![text_response("streamed")]);
        let mut stream = provider.stream(request()).await.unwrap();

        let mut events = Vec::new();
        while let Some(item) = stream.next().await {
            events.push(item.unwrap());
        }

        assert_eq!(events.len(), 4);
        assert_eq!(events[0].event_type, StreamEventType::MessageStart);
        assert_eq!(events[1].text.as_deref(), Some("streamed"));
        assert_eq!(events[2].stop_reason.as_deref(), Some("end_turn"));
        assert!(events[2].usage.is_some());
        assert_eq!(events[3].event_type, StreamEventType::MessageStop);
    }

    #[tokio::test]
    async fn stream_surfaces_tool_use_blocks() {
        let provider = MockProvider::with_responses(vec![tool_use_response(
            Some("查询中"),
            "toolu_1",
            "read_records",
            serde_json::json!({"entity": "students"}),
        )]);
        let mut stream = provider.stream(request()).await.unwrap();

        let mut tool_use = None;
        let mut stop_reason = None;
        while let Some(item) = stream.next().await {
            let c = item.unwrap();
            if let Some(tu) = c.tool_use {
                tool_use = Some(tu);
            }
            if c.event_type == StreamEventType::MessageStop {
                stop_reason = c.stop_reason;
            }
        }
        let tool_use = tool_use.unwrap();
        assert_eq!(tool_use.name, "read_records");
        assert_eq!(stop_reason.as_deref(), Some("tool_use"));
    }

    #[tokio::test]
    async fn records_requests() {
        let provider = MockProvider::new();
        let mut req = request();
        req.max_tokens = 77;
        provider.complete(req).await.unwrap();
        let seen = provider.requests().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].max_tokens, 77);
    }
}
