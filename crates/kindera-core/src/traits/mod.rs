// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for Kindera's external collaborators.

pub mod backend;
pub mod provider;

pub use backend::OpsBackend;
pub use provider::ModelProvider;
