// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test utilities: scripted model provider and recording backend.
//!
//! Used by crates across the workspace to exercise turn pipelines without
//! external services.

pub mod mock_backend;
pub mod mock_provider;

pub use mock_backend::MockBackend;
pub use mock_provider::{text_response, tool_use_response, MockProvider};
