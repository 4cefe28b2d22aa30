// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events (SSE) streaming for POST /v1/assistant/messages.
//!
//! Each turn event becomes one SSE frame, `event:` carrying the protocol
//! name and `data:` the JSON payload:
//! ```text
//! event: answer
//! data: {"text": "partial content here"}
//!
//! event: complete
//! data: {"turn_id": "...", "usage": {...}}
//! ```
//!
//! The turn's cancellation token is held by the stream itself, so a
//! client disconnect drops the stream and cancels the in-flight turn.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use kindera_core::TurnEvent;
use kindera_session::TurnHandle;

/// Serve one turn's events as an SSE stream.
pub fn turn_stream(handle: TurnHandle) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let TurnHandle { events, cancel } = handle;
    let guard = cancel.drop_guard();

    let stream = futures::stream::unfold((events, guard), |(mut events, guard)| async move {
        let event = events.recv().await?;
        Some((Ok(to_sse_event(&event)), (events, guard)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Convert a turn event to an SSE frame. The `data:` field carries the
/// payload alone; the event name rides in the SSE `event:` field.
fn to_sse_event(event: &TurnEvent) -> Event {
    let data = serde_json::to_value(event)
        .ok()
        .and_then(|v| v.get("data").cloned())
        .filter(|v| !v.is_null())
        .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
    Event::default()
        .event(event.event_name())
        .data(data.to_string())
}
