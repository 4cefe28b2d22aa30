// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tiered system prompt assembly.
//!
//! The system prompt is built from three tiers and trimmed to budget from
//! the bottom up: style guidance is dropped first, then entity schemas are
//! narrowed to the entities the current query actually touches. The
//! critical tier (role, safety rules, output contract) is never dropped.

use kindera_entity::EntityDescriptor;
use tracing::debug;

/// Prompt tiers in drop order. Higher tiers are sacrificed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTier {
    /// Role, safety rules, output contract. Always present.
    Critical,
    /// Entity schemas relevant to the current query.
    Schemas,
    /// Tone and formatting guidance. First to go under pressure.
    Style,
}

/// Builds the tiered system prompt and renders it as cache-aligned blocks.
pub struct SystemPromptBuilder {
    critical: String,
    schemas: Vec<(String, String)>,
    style: Option<String>,
}

impl SystemPromptBuilder {
    pub fn new(agent_name: &str) -> Self {
        Self {
            critical: critical_text(agent_name),
            schemas: Vec::new(),
            style: Some(STYLE_TEXT.to_string()),
        }
    }

    /// Add the schema section for one catalogue entity.
    pub fn push_schema(&mut self, descriptor: &EntityDescriptor) {
        let section = render_schema(descriptor);
        self.schemas.push((descriptor.name.to_string(), section));
    }

    /// Replace the default style tier.
    pub fn set_style(&mut self, text: impl Into<String>) {
        self.style = Some(text.into());
    }

    /// Render the prompt as Anthropic system blocks, trimming tiers to fit
    /// `budget_tokens`. Returns the blocks, the token estimate for what was
    /// kept, and the tiers that were dropped.
    ///
    /// The last block carries a `cache_control: ephemeral` marker so the
    /// whole system prefix is eligible for prompt caching.
    pub fn build(&self, budget_tokens: usize) -> BuiltPrompt {
        let mut sections = vec![self.critical.clone()];
        let mut used = estimate_tokens(&self.critical);
        let mut dropped = Vec::new();

        // Schemas next, most relevant first, until the budget runs out.
        let mut any_schema_dropped = false;
        for (name, section) in &self.schemas {
            let cost = estimate_tokens(section);
            if used + cost <= budget_tokens {
                sections.push(section.clone());
                used += cost;
            } else {
                debug!(entity = %name, "schema section dropped for budget");
                any_schema_dropped = true;
            }
        }
        if any_schema_dropped {
            dropped.push(PromptTier::Schemas);
        }

        // Style last, only if there is room left.
        if let Some(style) = &self.style {
            let cost = estimate_tokens(style);
            if used + cost <= budget_tokens {
                sections.push(style.clone());
                used += cost;
            } else {
                dropped.push(PromptTier::Style);
            }
        }

        let last = sections.len() - 1;
        let blocks: Vec<serde_json::Value> = sections
            .iter()
            .enumerate()
            .map(|(i, text)| {
                if i == last {
                    serde_json::json!({
                        "type": "text",
                        "text": text,
                        "cache_control": {"type": "ephemeral"}
                    })
                } else {
                    serde_json::json!({"type": "text", "text": text})
                }
            })
            .collect();

        BuiltPrompt {
            blocks: serde_json::Value::Array(blocks),
            estimated_tokens: used,
            dropped,
        }
    }
}

/// Output of [`SystemPromptBuilder::build`].
#[derive(Debug)]
pub struct BuiltPrompt {
    pub blocks: serde_json::Value,
    pub estimated_tokens: usize,
    pub dropped: Vec<PromptTier>,
}

/// Rough token estimate used across the compressor: 4 bytes per token,
/// minimum 1 for non-empty text.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        (text.len() / 4).max(1)
    }
}

fn critical_text(agent_name: &str) -> String {
    format!(
        "You are {agent_name}, the operations assistant for a kindergarten \
management platform. You answer questions about students, classes, staff, \
enrollment, fees and activities by calling the provided tools, never by \
inventing data.\n\
Rules:\n\
- Only call tools you were offered in this request.\n\
- Before creating or updating a record, make sure every required field is \
present; if any is missing, stop and ask the user for it.\n\
- Answer in the language the user wrote in.\n\
- Never reveal data the caller's role is not allowed to see."
    )
}

const STYLE_TEXT: &str = "Keep answers short and concrete. Summarize query \
results in one or two sentences before any detail. When the user asked for \
a table or chart, let the rendered component carry the data and keep the \
text to a caption.";

/// One entity's schema section: table, synonyms, field lists.
fn render_schema(descriptor: &EntityDescriptor) -> String {
    let required: Vec<String> = descriptor
        .required_fields
        .iter()
        .map(|f| format!("{} ({}): {}", f.name, f.field_type, f.description))
        .collect();
    let optional: Vec<&str> = descriptor.optional_fields.iter().map(|f| f.name).collect();

    let mut section = format!(
        "Entity `{}` (table `{}`)\nRequired fields:\n  {}",
        descriptor.name,
        descriptor.table_name,
        required.join("\n  ")
    );
    if !optional.is_empty() {
        section.push_str(&format!("\nOptional fields: {}", optional.join(", ")));
    }
    if !descriptor.default_filters.is_empty() {
        let filters: Vec<String> = descriptor
            .default_filters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        section.push_str(&format!("\nDefault filters: {}", filters.join(", ")));
    }
    section
}
