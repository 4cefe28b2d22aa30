// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tools for the Kindera assistant core: the tool trait and registry, the
//! five built-in ops tools, the HTTP backend, and the bounded executor.

pub mod backend;
pub mod builtin;
pub mod executor;
pub mod tool;

pub use backend::HttpOpsBackend;
pub use builtin::builtin_registry;
pub use executor::{ProgressSender, ToolExecutor};
pub use tool::{Tool, ToolRegistry};
