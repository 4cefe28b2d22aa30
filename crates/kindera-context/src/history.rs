// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation history windowing.
//!
//! History gets whatever token budget remains after the system tiers,
//! floored at a configured minimum. Entries are kept newest-first until the
//! budget runs out; everything older collapses into a single summary line.
//! The entry immediately preceding the current message is always kept
//! verbatim, so the model sees at least the latest exchange in full.

use kindera_core::types::{HistoryEntry, ModelMessage};
use tracing::debug;

use crate::tiers::estimate_tokens;

/// Result of history compression.
#[derive(Debug)]
pub struct CompressedHistory {
    pub messages: Vec<ModelMessage>,
    pub estimated_tokens: usize,
    /// Entries that were folded into the summary line.
    pub summarized_count: usize,
}

/// Compress `history` (oldest first) into model messages within
/// `budget_tokens`, keeping at most `max_entries` verbatim entries.
pub fn compress(
    history: &[HistoryEntry],
    budget_tokens: usize,
    max_entries: usize,
) -> CompressedHistory {
    if history.is_empty() {
        return CompressedHistory {
            messages: Vec::new(),
            estimated_tokens: 0,
            summarized_count: 0,
        };
    }

    // Walk backwards, keeping entries while they fit. The newest entry is
    // always kept regardless of budget.
    let mut kept = 0usize;
    let mut used = 0usize;
    for (i, entry) in history.iter().rev().enumerate() {
        let cost = estimate_tokens(&entry.text);
        if i == 0 || (used + cost <= budget_tokens && kept < max_entries) {
            used += cost;
            kept += 1;
        } else {
            break;
        }
    }

    let cut = history.len() - kept;
    let mut messages = Vec::with_capacity(kept + 1);
    let mut summarized_count = 0;

    if cut > 0 {
        let summary = summarize(&history[..cut]);
        used += estimate_tokens(&summary);
        summarized_count = cut;
        debug!(collapsed = cut, kept = kept, "history window collapsed");
        messages.push(ModelMessage::text("user", &summary));
    }

    for entry in &history[cut..] {
        messages.push(ModelMessage::text(&entry.role, &entry.text));
    }

    CompressedHistory {
        messages,
        estimated_tokens: used,
        summarized_count,
    }
}

/// One-line recap of collapsed entries. Topic extraction is lexical: the
/// first few words of each collapsed user message.
fn summarize(entries: &[HistoryEntry]) -> String {
    let topics: Vec<String> = entries
        .iter()
        .filter(|e| e.role == "user")
        .take(5)
        .map(|e| truncate_chars(&e.text, 20))
        .collect();

    if topics.is_empty() {
        format!("[Earlier conversation: {} messages omitted.]", entries.len())
    } else {
        format!(
            "[Earlier conversation: {} messages omitted. Topics: {}]",
            entries.len(),
            topics.join("; ")
        )
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}…")
    }
}
