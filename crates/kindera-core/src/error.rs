// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Kindera assistant core.

use thiserror::Error;

/// The primary error type used across all Kindera components.
///
/// Variants map one-to-one onto the `errorKind` values carried by terminal
/// `error` push events, plus ambient variants (config, storage, internal)
/// that never cross the wire directly.
#[derive(Debug, Error)]
pub enum KinderaError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Parameter validation failed (missing/invalid fields on a tool call).
    /// Recoverable: surfaces as a `missing_fields` event, never fatal to the Turn.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A tool's backend call failed. `transient` controls retry eligibility.
    #[error("tool `{tool}` failed: {message}")]
    ToolExecution {
        tool: String,
        message: String,
        transient: bool,
    },

    /// The external model call failed (API error, rate limit, malformed response).
    #[error("upstream model error: {message}")]
    UpstreamModel {
        message: String,
        transient: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Single-flight violation: a Turn is already in flight for the conversation.
    #[error("conversation {conversation_id} already has a turn in flight")]
    Busy { conversation_id: String },

    /// The compressor could not fit even the minimum required content,
    /// or a usage cap blocked the call.
    #[error("budget exceeded: {message}")]
    BudgetExceeded { message: String },

    /// The client disconnected or explicitly aborted the Turn.
    #[error("turn cancelled")]
    Cancelled,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Business-logic API errors (connection failure, non-2xx response).
    #[error("backend error: {source}")]
    Backend {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Storage errors (usage ledger database).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KinderaError {
    /// Short, wire-safe kind string for terminal `error` events.
    ///
    /// Never leaks internal detail: the payload built from this is
    /// `{kind, message}` where message is the Display impl above.
    pub fn kind(&self) -> &'static str {
        match self {
            KinderaError::Config(_) => "config",
            KinderaError::Validation { .. } => "validation",
            KinderaError::ToolExecution { .. } => "tool_execution",
            KinderaError::UpstreamModel { .. } => "upstream_model",
            KinderaError::Busy { .. } => "busy",
            KinderaError::BudgetExceeded { .. } => "budget_exceeded",
            KinderaError::Cancelled => "cancelled",
            KinderaError::Timeout { .. } => "timeout",
            KinderaError::Backend { .. } => "backend",
            KinderaError::Storage { .. } => "storage",
            KinderaError::Internal(_) => "internal",
        }
    }

    /// Whether the retry policy may re-attempt the failed operation.
    ///
    /// Timeouts, rate limits, and connection-level backend failures are
    /// transient; validation and permission failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            KinderaError::Timeout { .. } => true,
            KinderaError::Backend { .. } => true,
            KinderaError::ToolExecution { transient, .. } => *transient,
            KinderaError::UpstreamModel { transient, .. } => *transient,
            _ => false,
        }
    }
}
