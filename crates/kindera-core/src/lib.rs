// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Kindera assistant orchestration core.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Kindera workspace: the turn and
//! tool-call state machines, the closed-sum tool result, the push-event
//! protocol, and the model/backend boundary traits.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::KinderaError;
pub use traits::{ModelProvider, OpsBackend};
pub use types::{
    AssistantRequest, ContentBlock, FieldSpec, HistoryEntry, ModelMessage, ModelRequest,
    ModelResponse, ModelStreamChunk, RequestContext, StreamEventType, TokenUsage, ToolCallRecord,
    ToolCallRequest, ToolCallStatus, ToolResult, ToolUseBlock, Turn, TurnEvent, TurnStatus,
    UsageSummary,
};
