// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the assistant core.
//!
//! Serves the push-event protocol over SSE: each accepted message turns
//! into an ordered event stream (`start` through a single terminal
//! event), with pre-stream rejections returned as plain JSON errors.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{GatewayState, router, start_server};
