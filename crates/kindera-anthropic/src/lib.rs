// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API implementation of [`ModelProvider`].
//!
//! Supports full completions and SSE streaming. Streaming accumulates
//! `input_json_delta` fragments per content-block index and surfaces each
//! tool-use request as a single chunk once its block completes.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::StreamExt;
use futures::future;
use futures::stream::Stream;
use kindera_config::model::ModelConfig;
use kindera_core::{
    ContentBlock, KinderaError, ModelProvider, ModelRequest, ModelResponse, ModelStreamChunk,
    StreamEventType, ToolUseBlock,
};

pub mod client;
pub mod sse;
pub mod types;

pub use client::{AnthropicClient, resolve_api_key};

use sse::StreamEvent;
use types::{MessageRequest, MessageResponse, ResponseContentBlock};

/// [`ModelProvider`] backed by the Anthropic Messages API.
pub struct AnthropicProvider {
    client: AnthropicClient,
}

impl AnthropicProvider {
    pub fn new(config: &ModelConfig) -> Result<Self, KinderaError> {
        Ok(Self {
            client: AnthropicClient::new(config)?,
        })
    }
}

fn to_message_request(request: ModelRequest, stream: bool) -> MessageRequest {
    MessageRequest {
        model: request.model,
        messages: request.messages,
        system: request.system_blocks,
        max_tokens: request.max_tokens,
        stream,
        tools: request.tools,
    }
}

fn to_model_response(response: MessageResponse) -> ModelResponse {
    let content = response
        .content
        .into_iter()
        .map(|block| match block {
            ResponseContentBlock::Text { text } => ContentBlock::Text { text },
            ResponseContentBlock::ToolUse { id, name, input } => {
                ContentBlock::ToolUse { id, name, input }
            }
        })
        .collect();
    ModelResponse {
        id: response.id,
        content,
        model: response.model,
        stop_reason: response.stop_reason,
        usage: response.usage.to_token_usage(),
    }
}

/// Per-stream accumulation state: partial tool-use JSON keyed by
/// content-block index, plus the stop reason seen on `message_delta`.
#[derive(Default)]
struct StreamState {
    tool_blocks: HashMap<usize, PartialToolUse>,
    stop_reason: Option<String>,
}

struct PartialToolUse {
    id: String,
    name: String,
    json: String,
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

impl StreamState {
    /// Maps one SSE event to at most one outbound chunk. Tool-use blocks
    /// are buffered until their `content_block_stop`.
    fn apply(&mut self, event: StreamEvent) -> Option<Result<ModelStreamChunk, KinderaError>> {
        match event {
            StreamEvent::MessageStart(start) => {
                let mut out = chunk(StreamEventType::MessageStart);
                out.usage = Some(start.message.usage.to_token_usage());
                Some(Ok(out))
            }
            StreamEvent::ContentBlockStart(start) => {
                if let ResponseContentBlock::ToolUse { id, name, .. } = start.content_block {
                    self.tool_blocks.insert(
                        start.index,
                        PartialToolUse {
                            id,
                            name,
                            json: String::new(),
                        },
                    );
                }
                None
            }
            StreamEvent::ContentBlockDelta(delta) => match delta.delta {
                types::SseDelta::TextDelta { text } => {
                    let mut out = chunk(StreamEventType::ContentBlockDelta);
                    out.text = Some(text);
                    Some(Ok(out))
                }
                types::SseDelta::InputJsonDelta { partial_json } => {
                    if let Some(partial) = self.tool_blocks.get_mut(&delta.index) {
                        partial.json.push_str(&partial_json);
                    }
                    None
                }
            },
            StreamEvent::ContentBlockStop(stop) => {
                let partial = self.tool_blocks.remove(&stop.index)?;
                let input = if partial.json.is_empty() {
                    Ok(serde_json::json!({}))
                } else {
                    serde_json::from_str(&partial.json)
                };
                match input {
                    Ok(input) => {
                        let mut out = chunk(StreamEventType::ContentBlockDelta);
                        out.tool_use = Some(ToolUseBlock {
                            id: partial.id,
                            name: partial.name,
                            input,
                        });
                        Some(Ok(out))
                    }
                    Err(e) => Some(Err(KinderaError::UpstreamModel {
                        message: format!("malformed tool input for `{}`: {e}", partial.name),
                        transient: false,
                        source: Some(Box::new(e)),
                    })),
                }
            }
            StreamEvent::MessageDelta(delta) => {
                self.stop_reason = delta.delta.stop_reason.clone();
                let mut out = chunk(StreamEventType::MessageDelta);
                out.usage = delta.usage.as_ref().map(types::ApiUsage::to_token_usage);
                out.stop_reason = delta.delta.stop_reason;
                Some(Ok(out))
            }
            StreamEvent::MessageStop => {
                let mut out = chunk(StreamEventType::MessageStop);
                out.stop_reason = self.stop_reason.take();
                Some(Ok(out))
            }
            StreamEvent::Ping => None,
            StreamEvent::Error(err) => Some(Err(KinderaError::UpstreamModel {
                message: err.error.message,
                transient: matches!(
                    err.error.type_.as_str(),
                    "overloaded_error" | "rate_limit_error" | "api_error"
                ),
                source: None,
            })),
        }
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, KinderaError> {
        let api_request = to_message_request(request, false);
        let response = self.client.send(&api_request).await?;
        let body: MessageResponse =
            response
                .json()
                .await
                .map_err(|e| KinderaError::UpstreamModel {
                    message: format!("malformed Messages API response: {e}"),
                    transient: false,
                    source: Some(Box::new(e)),
                })?;
        Ok(to_model_response(body))
    }

    async fn stream(
        &self,
        request: ModelRequest,
    ) -> Result<
        Pin<Box<dyn Stream<Item = Result<ModelStreamChunk, KinderaError>> + Send>>,
        KinderaError,
    > {
        let api_request = to_message_request(request, true);
        let response = self.client.send(&api_request).await?;
        let events = sse::parse_sse_stream(response);

        let chunks = events
            .scan(StreamState::default(), |state, event| {
                let out = match event {
                    Ok(event) => state.apply(event),
                    Err(e) => Some(Err(e)),
                };
                future::ready(Some(out))
            })
            .filter_map(future::ready);

        Ok(Box::pin(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindera_core::ModelMessage;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> AnthropicProvider {
        AnthropicProvider::new(&ModelConfig {
            api_key: Some("test-key".to_string()),
            base_url: server.uri(),
            max_retries: 0,
            ..ModelConfig::default()
        })
        .unwrap()
    }

    fn request(stream: bool) -> ModelRequest {
        ModelRequest {
            model: "claude-sonnet-4-20250514".into(),
            system_blocks: serde_json::json!([{"type": "text", "text": "You are helpful."}]),
            messages: vec![ModelMessage::text("user", "查询所有学生")],
            max_tokens: 512,
            stream,
            tools: None,
        }
    }

    #[tokio::test]
    async fn complete_returns_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(serde_json::json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "共有 42 名学生。"}],
                "model": "claude-sonnet-4-20250514",
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 30, "output_tokens": 12,
                          "cache_read_input_tokens": 20}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let response = provider.complete(request(false)).await.unwrap();
        assert_eq!(response.text(), "共有 42 名学生。");
        assert_eq!(response.stop_reason, Some("end_turn".into()));
        assert_eq!(response.usage.prompt_tokens, 30);
        assert_eq!(response.usage.cache_read_tokens, 20);
    }

    #[tokio::test]
    async fn complete_surfaces_tool_uses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_2",
                "type": "message",
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "查询中"},
                    {"type": "tool_use", "id": "toolu_1", "name": "read_records",
                     "input": {"entity": "students"}}
                ],
                "model": "claude-sonnet-4-20250514",
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 40, "output_tokens": 18}
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let response = provider.complete(request(false)).await.unwrap();
        let uses = response.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].1, "read_records");
        assert_eq!(uses[0].2["entity"], "students");
    }

    #[tokio::test]
    async fn stream_yields_text_deltas_in_order() {
        let sse = concat!(
            "event: message_start\n",
            "data: {\"message\":{\"id\":\"msg_3\",\"type\":\"message\",\"role\":\"assistant\",\"content\":[],\"model\":\"claude-sonnet-4-20250514\",\"stop_reason\":null,\"usage\":{\"input_tokens\":25,\"output_tokens\":1}}}\n\n",
            "event: content_block_start\n",
            "data: {\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"共有\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" 42 名学生。\"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"index\":0}\n\n",
            "event: message_delta\n",
            "data: {\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"input_tokens\":25,\"output_tokens\":9}}\n\n",
            "event: message_stop\n",
            "data: {}\n\n",
        );

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let mut stream = provider.stream(request(true)).await.unwrap();

        let mut text = String::new();
        let mut saw_stop = false;
        let mut final_usage = None;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            if let Some(t) = chunk.text {
                text.push_str(&t);
            }
            if let Some(u) = chunk.usage {
                final_usage = Some(u);
            }
            if chunk.event_type == StreamEventType::MessageStop {
                assert_eq!(chunk.stop_reason, Some("end_turn".into()));
                saw_stop = true;
            }
        }
        assert_eq!(text, "共有 42 名学生。");
        assert!(saw_stop);
        assert_eq!(final_usage.unwrap().completion_tokens, 9);
    }

    #[tokio::test]
    async fn stream_accumulates_tool_use_json() {
        let sse = concat!(
            "event: content_block_start\n",
            "data: {\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_9\",\"name\":\"any_query\",\"input\":{}}}\n\n",
            "event: content_block_delta\n",
            "data: {\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"entity\\\":\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"students\\\"}\"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"index\":0}\n\n",
            "event: message_stop\n",
            "data: {}\n\n",
        );

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let mut stream = provider.stream(request(true)).await.unwrap();

        let mut tool_use = None;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            if let Some(tu) = chunk.tool_use {
                tool_use = Some(tu);
            }
        }
        let tool_use = tool_use.unwrap();
        assert_eq!(tool_use.id, "toolu_9");
        assert_eq!(tool_use.name, "any_query");
        assert_eq!(tool_use.input["entity"], "students");
    }

    #[tokio::test]
    async fn stream_error_event_is_transient_for_overload() {
        let sse = "event: error\ndata: {\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n";

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let mut stream = provider.stream(request(true)).await.unwrap();
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), "upstream_model");
        assert!(err.is_transient());
    }
}
