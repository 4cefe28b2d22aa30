// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API wire types and SSE event payloads.

use kindera_core::{ModelMessage, TokenUsage};
use serde::{Deserialize, Serialize};

/// A request body for the Messages API.
///
/// Messages reuse [`ModelMessage`]; its content blocks already serialize
/// to the Anthropic wire shape (`text`, `tool_use`, `tool_result`). The
/// system prompt is carried as pre-built structured blocks so the
/// compressor's `cache_control` markers pass through untouched.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub model: String,

    pub messages: Vec<ModelMessage>,

    /// Structured system blocks. Skipped when null or empty.
    #[serde(skip_serializing_if = "system_is_empty")]
    pub system: serde_json::Value,

    pub max_tokens: u32,

    pub stream: bool,

    /// Tool definition array, already in API shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<serde_json::Value>,
}

fn system_is_empty(value: &serde_json::Value) -> bool {
    value.is_null() || value.as_array().is_some_and(|blocks| blocks.is_empty())
}

/// A full (non-streamed) response from the Messages API.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub id: String,
    pub role: String,
    pub content: Vec<ResponseContentBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub usage: ApiUsage,
}

/// A content block in a response.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    /// The model is requesting a tool invocation.
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

/// Token usage statistics from the API.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_read_input_tokens: u32,
    #[serde(default)]
    pub cache_creation_input_tokens: u32,
}

impl ApiUsage {
    /// Convert to the workspace-wide usage shape. Cache-creation tokens
    /// are billed as part of the prompt and folded in there.
    pub fn to_token_usage(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.input_tokens + self.cache_creation_input_tokens,
            completion_tokens: self.output_tokens,
            cache_read_tokens: self.cache_read_input_tokens,
        }
    }
}

// --- SSE event payloads ---

/// SSE event: message_start
#[derive(Debug, Clone, Deserialize)]
pub struct SseMessageStart {
    pub message: MessageResponse,
}

/// SSE event: content_block_start
#[derive(Debug, Clone, Deserialize)]
pub struct SseContentBlockStart {
    pub index: usize,
    pub content_block: ResponseContentBlock,
}

/// SSE event: content_block_delta
#[derive(Debug, Clone, Deserialize)]
pub struct SseContentBlockDelta {
    pub index: usize,
    pub delta: SseDelta,
}

/// A delta update within a content block.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum SseDelta {
    /// Appends text to the current block.
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    /// Appends partial JSON to a tool_use block's input.
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
}

/// SSE event: content_block_stop
#[derive(Debug, Clone, Deserialize)]
pub struct SseContentBlockStop {
    pub index: usize,
}

/// SSE event: message_delta
#[derive(Debug, Clone, Deserialize)]
pub struct SseMessageDelta {
    pub delta: SseMessageDeltaInfo,
    pub usage: Option<ApiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseMessageDeltaInfo {
    pub stop_reason: Option<String>,
}

/// SSE event: error
#[derive(Debug, Clone, Deserialize)]
pub struct SseError {
    pub error: ErrorDetail,
}

/// API error response body (non-streaming).
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub type_: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_request_with_system_and_tools() {
        let req = MessageRequest {
            model: "claude-sonnet-4-20250514".into(),
            messages: vec![ModelMessage::text("user", "查询所有学生")],
            system: serde_json::json!([
                {"type": "text", "text": "You are the Kindera assistant.",
                 "cache_control": {"type": "ephemeral"}}
            ]),
            max_tokens: 2048,
            stream: true,
            tools: Some(serde_json::json!([
                {"name": "read_records", "description": "Read records",
                 "input_schema": {"type": "object"}}
            ])),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "claude-sonnet-4-20250514");
        assert_eq!(json["stream"], true);
        assert_eq!(json["system"][0]["cache_control"]["type"], "ephemeral");
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["tools"][0]["name"], "read_records");
    }

    #[test]
    fn serialize_request_omits_empty_system_and_tools() {
        let req = MessageRequest {
            model: "claude-sonnet-4-20250514".into(),
            messages: vec![],
            system: serde_json::json!([]),
            max_tokens: 1024,
            stream: false,
            tools: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("system").is_none());
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn deserialize_response_with_tool_use() {
        let json = r#"{
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "查询中"},
                {"type": "tool_use", "id": "toolu_1", "name": "read_records",
                 "input": {"entity": "students"}}
            ],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 20, "output_tokens": 15}
        }"#;
        let resp: MessageResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.content.len(), 2);
        assert!(matches!(
            &resp.content[1],
            ResponseContentBlock::ToolUse { .. }
        ));
        assert_eq!(resp.stop_reason, Some("tool_use".into()));
    }

    #[test]
    fn api_usage_maps_to_token_usage() {
        let usage = ApiUsage {
            input_tokens: 100,
            output_tokens: 40,
            cache_read_input_tokens: 80,
            cache_creation_input_tokens: 20,
        };
        let mapped = usage.to_token_usage();
        assert_eq!(mapped.prompt_tokens, 120);
        assert_eq!(mapped.completion_tokens, 40);
        assert_eq!(mapped.cache_read_tokens, 80);
    }

    #[test]
    fn deserialize_usage_without_cache_fields() {
        let usage: ApiUsage =
            serde_json::from_str(r#"{"input_tokens": 10, "output_tokens": 5}"#).unwrap();
        assert_eq!(usage.cache_read_input_tokens, 0);
        assert_eq!(usage.cache_creation_input_tokens, 0);
    }

    #[test]
    fn deserialize_sse_deltas() {
        let text: SseContentBlockDelta = serde_json::from_str(
            r#"{"index": 0, "delta": {"type": "text_delta", "text": "你好"}}"#,
        )
        .unwrap();
        assert!(matches!(text.delta, SseDelta::TextDelta { .. }));

        let json: SseContentBlockDelta = serde_json::from_str(
            r#"{"index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"entity\":"}}"#,
        )
        .unwrap();
        match json.delta {
            SseDelta::InputJsonDelta { ref partial_json } => {
                assert_eq!(partial_json, "{\"entity\":");
            }
            _ => panic!("expected InputJsonDelta"),
        }
    }

    #[test]
    fn deserialize_error_payloads() {
        let sse: SseError = serde_json::from_str(
            r#"{"error": {"type": "overloaded_error", "message": "Overloaded"}}"#,
        )
        .unwrap();
        assert_eq!(sse.error.type_, "overloaded_error");

        let api: ApiErrorResponse = serde_json::from_str(
            r#"{"error": {"type": "authentication_error", "message": "invalid x-api-key"}}"#,
        )
        .unwrap();
        assert_eq!(api.error.message, "invalid x-api-key");
    }
}
