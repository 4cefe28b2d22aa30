// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt assembly and compression for the Kindera assistant core.
//!
//! Produces the complete model payload for one turn: tiered system blocks,
//! tool guides for the offered tools, and a budgeted history window with
//! the current message appended. Assembly is pure and infallible; when the
//! input cannot fit the budget the payload is still produced and flagged
//! `over_budget` for the caller to log.

pub mod guides;
pub mod history;
pub mod tiers;

use kindera_config::model::ContextConfig;
use kindera_core::types::{HistoryEntry, ModelMessage};
use tracing::{debug, warn};

pub use guides::{assemble_guides, guide_for};
pub use history::{compress, CompressedHistory};
pub use tiers::{estimate_tokens, BuiltPrompt, PromptTier, SystemPromptBuilder};

/// Everything the provider request needs from the compressor.
#[derive(Debug)]
pub struct ModelPayload {
    /// System blocks with cache markers, ready for the `system` field.
    pub system_blocks: serde_json::Value,
    /// History window plus the current user message.
    pub messages: Vec<ModelMessage>,
    pub estimated_prompt_tokens: usize,
    /// True when even the minimum history floor overflowed the budget.
    pub over_budget: bool,
}

/// Assembles model payloads within a fixed prompt budget.
pub struct ContextCompressor {
    agent_name: String,
    prompt_budget: usize,
    min_history_tokens: usize,
    max_history_entries: usize,
}

impl ContextCompressor {
    pub fn new(agent_name: &str, config: &ContextConfig) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            prompt_budget: config.prompt_budget as usize,
            min_history_tokens: config.min_history_tokens as usize,
            max_history_entries: config.max_history_entries,
        }
    }

    /// Build the payload for one turn.
    ///
    /// `entities` narrows the schema tier to what the query touches;
    /// `tool_names` selects which tool guides are injected. Budget split:
    /// the system tiers may take everything above the history floor, and
    /// history gets the remainder.
    pub fn build(
        &self,
        query: &str,
        history: &[HistoryEntry],
        entities: &[&str],
        tool_names: &[&str],
    ) -> ModelPayload {
        self.build_with_budget(query, history, entities, tool_names, self.prompt_budget)
    }

    /// Build with the budget scaled down, used when the usage monitor
    /// reports elevated token pressure.
    pub fn build_scaled(
        &self,
        query: &str,
        history: &[HistoryEntry],
        entities: &[&str],
        tool_names: &[&str],
        scale: f64,
    ) -> ModelPayload {
        let budget = (self.prompt_budget as f64 * scale.clamp(0.1, 1.0)) as usize;
        self.build_with_budget(
            query,
            history,
            entities,
            tool_names,
            budget.max(self.min_history_tokens),
        )
    }

    fn build_with_budget(
        &self,
        query: &str,
        history: &[HistoryEntry],
        entities: &[&str],
        tool_names: &[&str],
        prompt_budget: usize,
    ) -> ModelPayload {
        let query_tokens = estimate_tokens(query);
        let system_budget = prompt_budget
            .saturating_sub(self.min_history_tokens)
            .saturating_sub(query_tokens);

        let mut builder = SystemPromptBuilder::new(&self.agent_name);
        for name in entities {
            if let Some(descriptor) = kindera_entity::lookup(name) {
                builder.push_schema(descriptor);
            }
        }
        let guides = assemble_guides(tool_names);
        if !guides.is_empty() {
            builder.set_style(format!("{}\n\nTool usage:\n{guides}", style_base()));
        }

        let built = builder.build(system_budget);
        if !built.dropped.is_empty() {
            debug!(dropped = ?built.dropped, "prompt tiers trimmed for budget");
        }

        let history_budget = prompt_budget
            .saturating_sub(built.estimated_tokens)
            .saturating_sub(query_tokens)
            .max(self.min_history_tokens);
        let compressed = compress(history, history_budget, self.max_history_entries);

        let mut messages = compressed.messages;
        messages.push(ModelMessage::text("user", query));

        let estimated_prompt_tokens =
            built.estimated_tokens + compressed.estimated_tokens + query_tokens;
        let over_budget = estimated_prompt_tokens > prompt_budget;
        if over_budget {
            warn!(
                estimated = estimated_prompt_tokens,
                budget = prompt_budget,
                "prompt exceeds budget after compression"
            );
        }

        ModelPayload {
            system_blocks: built.blocks,
            messages,
            estimated_prompt_tokens,
            over_budget,
        }
    }
}

fn style_base() -> &'static str {
    "Keep answers short and concrete. Summarize query results in one or two \
sentences before any detail."
}
