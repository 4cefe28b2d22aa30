// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait and registry.
//!
//! The [`Tool`] trait is the unified interface the orchestrator invokes.
//! The [`ToolRegistry`] manages lookup by name and generates the
//! Anthropic-format tool definition arrays offered to the model, filtered
//! to the tools the selection decision allows.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kindera_core::{KinderaError, ToolResult};

/// Unified trait for the built-in ops tools.
///
/// `invoke` returns a [`ToolResult`] for domain outcomes (success, missing
/// fields, domain failure) and `Err` only for infrastructure faults the
/// executor may retry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name, used for lookup and API serialization.
    fn name(&self) -> &str;

    /// Human-readable description offered to the model.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's input parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// True for tools that write to the backend. Mutations get
    /// required-field validation before any call is issued.
    fn is_mutation(&self) -> bool {
        false
    }

    /// Invoke the tool with the parsed JSON input.
    async fn invoke(&self, input: serde_json::Value) -> Result<ToolResult, KinderaError>;
}

/// Registry of available tools, indexed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, indexed by its `name()`.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// (name, description) pairs for all registered tools, sorted by name.
    pub fn list(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .tools
            .values()
            .map(|t| (t.name(), t.description()))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries
    }

    /// Anthropic-format tool definitions for every registered tool.
    ///
    /// Each definition has the shape:
    /// ```json
    /// {"name": "...", "description": "...", "input_schema": { ... }}
    /// ```
    pub fn tool_definitions(&self) -> Vec<serde_json::Value> {
        self.definitions(|_| true)
    }

    /// Definitions restricted to the named tools. Unknown names are
    /// silently skipped; the selection decision is the source of truth for
    /// what the model may call.
    pub fn definitions_for(&self, names: &[&str]) -> Vec<serde_json::Value> {
        self.definitions(|tool_name| names.contains(&tool_name))
    }

    fn definitions(&self, keep: impl Fn(&str) -> bool) -> Vec<serde_json::Value> {
        let mut defs: Vec<serde_json::Value> = self
            .tools
            .values()
            .filter(|t| keep(t.name()))
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "input_schema": t.parameters_schema(),
                })
            })
            .collect();
        defs.sort_by(|a, b| {
            a["name"]
                .as_str()
                .unwrap_or("")
                .cmp(b["name"].as_str().unwrap_or(""))
        });
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
