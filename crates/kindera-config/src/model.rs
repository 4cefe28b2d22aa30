// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Kindera assistant core.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Kindera configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KinderaConfig {
    /// Agent identity and behavior settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// External model provider settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Business-logic (ops) API settings.
    #[serde(default)]
    pub ops: OpsConfig,

    /// Tool selection and selection cache settings.
    #[serde(default)]
    pub selector: SelectorConfig,

    /// Prompt/context compressor settings.
    #[serde(default)]
    pub context: ContextConfig,

    /// Tool execution orchestrator settings.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Token usage monitor and ledger settings.
    #[serde(default)]
    pub usage: UsageConfig,

    /// Gateway HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Agent identity and behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the assistant.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum number of conversations tracked concurrently.
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,

    /// Seconds before a turn parked in `awaiting_user_input` expires.
    #[serde(default = "default_pending_input_timeout_secs")]
    pub pending_input_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            max_conversations: default_max_conversations(),
            pending_input_timeout_secs: default_pending_input_timeout_secs(),
        }
    }
}

fn default_agent_name() -> String {
    "kindera".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_conversations() -> usize {
    256
}

fn default_pending_input_timeout_secs() -> u64 {
    600
}

/// External model provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// API key. `None` requires the provider's environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL for the Messages API.
    #[serde(default = "default_model_base_url")]
    pub base_url: String,

    /// Model used for turns.
    #[serde(default = "default_model_name")]
    pub model: String,

    /// Maximum completion tokens per model call.
    #[serde(default = "default_max_completion_tokens")]
    pub max_tokens: u32,

    /// Maximum model round-trips per turn when the model requests tools.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    /// Retries for transient upstream model failures.
    #[serde(default = "default_model_retries")]
    pub max_retries: u32,

    /// Request timeout in seconds for model calls.
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_model_base_url(),
            model: default_model_name(),
            max_tokens: default_max_completion_tokens(),
            max_tool_rounds: default_max_tool_rounds(),
            max_retries: default_model_retries(),
            timeout_secs: default_model_timeout_secs(),
        }
    }
}

fn default_model_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model_name() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_completion_tokens() -> u32 {
    2048
}

fn default_max_tool_rounds() -> u32 {
    4
}

fn default_model_retries() -> u32 {
    2
}

fn default_model_timeout_secs() -> u64 {
    120
}

/// Business-logic (ops) API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpsConfig {
    /// Base URL of the business-logic API.
    #[serde(default = "default_ops_base_url")]
    pub base_url: String,

    /// Bearer token for the ops API. `None` disables the auth header.
    #[serde(default)]
    pub api_token: Option<String>,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            base_url: default_ops_base_url(),
            api_token: None,
        }
    }
}

fn default_ops_base_url() -> String {
    "http://127.0.0.1:4000".to_string()
}

/// Tool selection and selection cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SelectorConfig {
    /// Maximum cache entries before LRU eviction.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Cache entry time-to-live in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Maximum tools a single decision may select.
    #[serde(default = "default_max_tools")]
    pub max_tools: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_tools: default_max_tools(),
        }
    }
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_cache_ttl_secs() -> u64 {
    1800
}

fn default_max_tools() -> usize {
    3
}

/// Prompt/context compressor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Total token budget for the model-facing payload.
    #[serde(default = "default_prompt_budget")]
    pub prompt_budget: u32,

    /// Minimum tokens reserved for conversation history.
    #[serde(default = "default_min_history_tokens")]
    pub min_history_tokens: u32,

    /// Maximum history entries retained per conversation window.
    #[serde(default = "default_history_entries")]
    pub max_history_entries: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            prompt_budget: default_prompt_budget(),
            min_history_tokens: default_min_history_tokens(),
            max_history_entries: default_history_entries(),
        }
    }
}

fn default_prompt_budget() -> u32 {
    8_000
}

fn default_min_history_tokens() -> u32 {
    512
}

fn default_history_entries() -> usize {
    40
}

/// Tool execution orchestrator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Bounded worker pool size for independent tool calls.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Hard wall-clock timeout per tool call, in seconds.
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry attempts for transient tool failures.
    #[serde(default = "default_tool_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds (doubles per attempt).
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            timeout_secs: default_tool_timeout_secs(),
            max_retries: default_tool_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

fn default_max_concurrent() -> usize {
    4
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_tool_retries() -> u32 {
    2
}

fn default_retry_base_ms() -> u64 {
    250
}

/// Token usage monitor and ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UsageConfig {
    /// Path to the SQLite usage ledger database.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,

    /// Daily token quota; `None` disables quota alerts.
    #[serde(default)]
    pub daily_token_quota: Option<u64>,

    /// Fraction of the quota at which an alert is raised.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,

    /// Number of recent turns in the rolling-average window.
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
            daily_token_quota: None,
            alert_threshold: default_alert_threshold(),
            rolling_window: default_rolling_window(),
        }
    }
}

fn default_ledger_path() -> String {
    "kindera-usage.db".to_string()
}

fn default_alert_threshold() -> f64 {
    0.8
}

fn default_rolling_window() -> usize {
    50
}

/// Gateway HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    7600
}
