// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool selection for the Kindera assistant core.
//!
//! A deterministic, rule-table-driven validator decides which tool(s) a
//! user query maps to before any model call, and a fingerprint-keyed cache
//! makes repeat decisions free.

pub mod cache;
pub mod rules;
pub mod validator;

pub use cache::{fingerprint, CacheStats, SelectionCache};
pub use rules::{SelectionRule, ToolName, RULES};
pub use validator::{SelectionContext, ToolDecision, ToolSelector};
