// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn pipeline and conversation session management.
//!
//! [`turn::TurnRunner`] drives one assistant turn end to end: tool
//! selection, role gating, the model tool loop, missing-field parking
//! and resumption, answer streaming, and usage accounting.
//! [`manager::SessionManager`] owns conversation state and enforces
//! single-flight dispatch per conversation.

pub mod manager;
pub mod shutdown;
pub mod turn;

pub use manager::{SessionManager, TurnHandle};
pub use turn::{PendingMutation, TurnInput, TurnOutcome, TurnRunner};
