// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Kindera workspace: turn and tool-call
//! state machines, the closed-sum tool result, the push-event protocol,
//! and the model-facing request/response/stream types.

use serde::{Deserialize, Serialize};

/// Token usage for a single model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt (system + messages + tool definitions).
    pub prompt_tokens: u32,
    /// Tokens generated by the model.
    pub completion_tokens: u32,
    /// Prompt tokens served from the provider-side prompt cache.
    pub cache_read_tokens: u32,
}

impl TokenUsage {
    /// Accumulate another usage into this one (used across tool rounds).
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
    }

    /// Total billable tokens.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens + self.cache_read_tokens
    }
}

/// States in the per-Turn FSM.
///
/// `received -> analyzing -> (executing_tools | streaming_answer)
///  -> [awaiting_user_input ->] streaming_answer -> complete`,
/// with `error` and `cancelled` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Inbound message accepted, turn created.
    Received,
    /// Entity resolution and tool selection in progress.
    Analyzing,
    /// The orchestrator is running tool calls.
    ExecutingTools,
    /// A mutation is paused pending user-supplied required fields.
    AwaitingUserInput,
    /// Final answer is being streamed to the client.
    StreamingAnswer,
    /// Terminal: success.
    Complete,
    /// Terminal: failure.
    Error,
    /// Terminal: client disconnect or explicit abort.
    Cancelled,
}

impl TurnStatus {
    /// Whether this status ends the Turn. `awaiting_user_input` is
    /// non-terminal: the Turn resumes on the follow-up message.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnStatus::Complete | TurnStatus::Error | TurnStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnStatus::Received => write!(f, "received"),
            TurnStatus::Analyzing => write!(f, "analyzing"),
            TurnStatus::ExecutingTools => write!(f, "executing_tools"),
            TurnStatus::AwaitingUserInput => write!(f, "awaiting_user_input"),
            TurnStatus::StreamingAnswer => write!(f, "streaming_answer"),
            TurnStatus::Complete => write!(f, "complete"),
            TurnStatus::Error => write!(f, "error"),
            TurnStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// States in the per-ToolCall FSM: `pending -> running -> terminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    MissingFields,
}

impl std::fmt::Display for ToolCallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolCallStatus::Pending => write!(f, "pending"),
            ToolCallStatus::Running => write!(f, "running"),
            ToolCallStatus::Succeeded => write!(f, "succeeded"),
            ToolCallStatus::Failed => write!(f, "failed"),
            ToolCallStatus::MissingFields => write!(f, "missing_fields"),
        }
    }
}

/// A field schema entry, used both in the entity catalogue and in
/// `missing_fields` event payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name as the backend expects it.
    pub name: String,
    /// Coarse type ("string", "number", "date", "id", "boolean").
    pub field_type: String,
    /// Short human-readable description shown in the input prompt.
    pub description: String,
}

/// Outcome of a single tool invocation, dispatched via exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToolResult {
    /// The tool ran and returned a payload.
    Success { payload: serde_json::Value },
    /// A mutation was not executed because required fields are absent.
    MissingFields { fields: Vec<FieldSpec> },
    /// The tool failed; `kind` matches [`crate::KinderaError::kind`].
    Failure { kind: String, message: String },
}

impl ToolResult {
    /// One-line summary for `tool_result` events and answer narration.
    pub fn summary(&self) -> String {
        match self {
            ToolResult::Success { payload } => match payload {
                serde_json::Value::Array(items) => format!("{} record(s)", items.len()),
                serde_json::Value::Object(map) => {
                    if let Some(rows) = map.get("rows").and_then(|r| r.as_array()) {
                        format!("{} record(s)", rows.len())
                    } else {
                        "ok".to_string()
                    }
                }
                _ => "ok".to_string(),
            },
            ToolResult::MissingFields { fields } => {
                let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                format!("missing required fields: {}", names.join(", "))
            }
            ToolResult::Failure { kind, message } => format!("failed ({kind}): {message}"),
        }
    }
}

/// A tool invocation the orchestrator has been asked to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique id within the Turn (tool_use id from the model, or generated).
    pub id: String,
    /// Registered tool name.
    pub tool_name: String,
    /// Resolved entity name, when the call targets a catalogue entity.
    pub entity: Option<String>,
    /// Parsed JSON parameters.
    pub parameters: serde_json::Value,
    /// Id of a call whose payload this one consumes. Dependent calls run
    /// strictly after their dependency; independent calls run concurrently.
    pub depends_on: Option<String>,
}

/// A tool call with its lifecycle state and outcome, owned by the Turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub tool_name: String,
    pub entity: Option<String>,
    pub parameters: serde_json::Value,
    pub status: ToolCallStatus,
    pub result: Option<ToolResult>,
    /// Invocation attempts, including retries.
    pub attempts: u32,
}

impl ToolCallRecord {
    /// Create a pending record from a request.
    pub fn pending(request: &ToolCallRequest) -> Self {
        Self {
            id: request.id.clone(),
            tool_name: request.tool_name.clone(),
            entity: request.entity.clone(),
            parameters: request.parameters.clone(),
            status: ToolCallStatus::Pending,
            result: None,
            attempts: 0,
        }
    }
}

/// One request/response cycle within a Conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub conversation_id: String,
    pub status: TurnStatus,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Final answer text, accumulated from streamed `answer` fragments.
    pub answer: String,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl Turn {
    /// Create a new Turn in `received` status.
    pub fn new(conversation_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            status: TurnStatus::Received,
            tool_calls: Vec::new(),
            answer: String::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
        }
    }
}

/// One entry in a conversation's bounded history window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// "user" or "assistant".
    pub role: String,
    pub text: String,
    /// True when this entry is a one-line collapse of dropped turns.
    pub summarized: bool,
}

/// Request context supplied by the front end alongside the message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    /// Caller role ("admin", "teacher", "parent"). Gates admin-only tools.
    #[serde(default)]
    pub role: Option<String>,
    /// When false, the turn answers without offering any tools.
    #[serde(default = "default_tools_enabled")]
    pub tools_enabled: bool,
}

fn default_tools_enabled() -> bool {
    true
}

/// Inbound request from the web front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantRequest {
    pub message: String,
    pub conversation_id: String,
    pub user_id: String,
    #[serde(default)]
    pub context: Option<RequestContext>,
}

/// Usage summary attached to the terminal `complete` event.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageSummary {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: f64,
}

/// A discrete unit of the push-event protocol, serialized as
/// `{"type": ..., "data": {...}}` and delivered over SSE in strict order:
/// `start`, `thinking*`, `(tool_call, tool_result | missing_fields)×N`,
/// `answer*`, then exactly one of `complete` / `error` / `cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TurnEvent {
    Start {
        turn_id: String,
    },
    Thinking {
        text: String,
    },
    ToolCall {
        tool_name: String,
        parameters: serde_json::Value,
    },
    ToolResult {
        tool_name: String,
        summary: String,
    },
    MissingFields {
        fields: Vec<FieldSpec>,
    },
    Answer {
        text: String,
    },
    Complete {
        turn_id: String,
        usage: UsageSummary,
    },
    Error {
        kind: String,
        message: String,
    },
    Cancelled {
        turn_id: String,
    },
}

impl TurnEvent {
    /// Protocol event name (the SSE `event:` field).
    pub fn event_name(&self) -> &'static str {
        match self {
            TurnEvent::Start { .. } => "start",
            TurnEvent::Thinking { .. } => "thinking",
            TurnEvent::ToolCall { .. } => "tool_call",
            TurnEvent::ToolResult { .. } => "tool_result",
            TurnEvent::MissingFields { .. } => "missing_fields",
            TurnEvent::Answer { .. } => "answer",
            TurnEvent::Complete { .. } => "complete",
            TurnEvent::Error { .. } => "error",
            TurnEvent::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnEvent::Complete { .. } | TurnEvent::Error { .. } | TurnEvent::Cancelled { .. }
        )
    }
}

/// A content block inside a model message, Anthropic Messages API shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// A message in the model-facing conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMessage {
    /// "user" or "assistant".
    pub role: String,
    pub content: Vec<ContentBlock>,
}

impl ModelMessage {
    /// Convenience constructor for a single text block.
    pub fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            content: vec![ContentBlock::Text {
                text: text.to_string(),
            }],
        }
    }

    /// Concatenated text of all text blocks in this message.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A request to the external model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub model: String,
    /// Structured system blocks with `cache_control` markers.
    pub system_blocks: serde_json::Value,
    pub messages: Vec<ModelMessage>,
    pub max_tokens: u32,
    pub stream: bool,
    /// Tool definitions offered to the model, when tools are enabled.
    pub tools: Option<serde_json::Value>,
}

/// A complete (non-streamed) model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
}

impl ModelResponse {
    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Tool-use blocks requested by the model, in issuance order.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }
}

/// Stream event types from the model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    MessageStart,
    ContentBlockDelta,
    MessageDelta,
    MessageStop,
    Error,
}

/// A single chunk of a streamed model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStreamChunk {
    pub event_type: StreamEventType,
    /// Text delta, on `ContentBlockDelta` text events.
    pub text: Option<String>,
    /// A completed tool-use block, surfaced once fully accumulated.
    pub tool_use: Option<ToolUseBlock>,
    /// Usage totals, on `MessageDelta`.
    pub usage: Option<TokenUsage>,
    pub stop_reason: Option<String>,
    pub error: Option<String>,
}

/// A fully-accumulated tool-use request from a model stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}
