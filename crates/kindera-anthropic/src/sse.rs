// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE parser for Messages API streaming responses.
//!
//! Converts a reqwest response byte stream into typed [`StreamEvent`]
//! variants using `eventsource-stream` for SSE protocol compliance.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use kindera_core::KinderaError;

use crate::types::{
    SseContentBlockDelta, SseContentBlockStart, SseContentBlockStop, SseError, SseMessageDelta,
    SseMessageStart,
};

/// Typed SSE events from the Anthropic streaming protocol.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Initial message metadata (id, model, usage).
    MessageStart(SseMessageStart),
    /// A new content block begins.
    ContentBlockStart(SseContentBlockStart),
    /// Incremental update to a content block (text delta, JSON delta).
    ContentBlockDelta(SseContentBlockDelta),
    /// A content block has finished.
    ContentBlockStop(SseContentBlockStop),
    /// Message-level delta (stop_reason, usage update).
    MessageDelta(SseMessageDelta),
    /// The message is complete.
    MessageStop,
    /// Keep-alive ping.
    Ping,
    /// API error during streaming.
    Error(SseError),
}

fn parse_failure(event: &str, e: serde_json::Error) -> KinderaError {
    KinderaError::UpstreamModel {
        message: format!("failed to parse {event} event: {e}"),
        transient: false,
        source: Some(Box::new(e)),
    }
}

/// Parses a streaming response body into typed [`StreamEvent`]s.
///
/// Unknown event types are silently skipped per Anthropic's API
/// versioning policy.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, KinderaError>> + Send>> {
    let event_stream = response.bytes_stream().eventsource();

    let mapped = event_stream.filter_map(|result| async move {
        match result {
            Ok(event) => {
                let parsed = match event.event.as_str() {
                    "message_start" => serde_json::from_str::<SseMessageStart>(&event.data)
                        .map(StreamEvent::MessageStart)
                        .map_err(|e| parse_failure("message_start", e)),
                    "content_block_start" => {
                        serde_json::from_str::<SseContentBlockStart>(&event.data)
                            .map(StreamEvent::ContentBlockStart)
                            .map_err(|e| parse_failure("content_block_start", e))
                    }
                    "content_block_delta" => {
                        serde_json::from_str::<SseContentBlockDelta>(&event.data)
                            .map(StreamEvent::ContentBlockDelta)
                            .map_err(|e| parse_failure("content_block_delta", e))
                    }
                    "content_block_stop" => {
                        serde_json::from_str::<SseContentBlockStop>(&event.data)
                            .map(StreamEvent::ContentBlockStop)
                            .map_err(|e| parse_failure("content_block_stop", e))
                    }
                    "message_delta" => serde_json::from_str::<SseMessageDelta>(&event.data)
                        .map(StreamEvent::MessageDelta)
                        .map_err(|e| parse_failure("message_delta", e)),
                    "message_stop" => Ok(StreamEvent::MessageStop),
                    "ping" => Ok(StreamEvent::Ping),
                    "error" => serde_json::from_str::<SseError>(&event.data)
                        .map(StreamEvent::Error)
                        .map_err(|e| parse_failure("error", e)),
                    _ => return None,
                };
                Some(parsed)
            }
            Err(e) => Some(Err(KinderaError::UpstreamModel {
                message: format!("SSE stream error: {e}"),
                transient: true,
                source: None,
            })),
        }
    });

    Box::pin(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    /// Serves raw SSE text through wiremock to get a real streaming
    /// `reqwest::Response`.
    async fn mock_sse_response(sse_text: &str) -> reqwest::Response {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_text.to_string()),
            )
            .mount(&server)
            .await;

        reqwest::get(&server.uri()).await.unwrap()
    }

    #[tokio::test]
    async fn parse_text_delta() {
        let sse = "event: content_block_delta\ndata: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"你好\"}}\n\n";
        let mut stream = parse_sse_stream(mock_sse_response(sse).await);

        match stream.next().await.unwrap().unwrap() {
            StreamEvent::ContentBlockDelta(delta) => {
                assert_eq!(delta.index, 0);
                match delta.delta {
                    crate::types::SseDelta::TextDelta { ref text } => assert_eq!(text, "你好"),
                    _ => panic!("expected TextDelta"),
                }
            }
            other => panic!("expected ContentBlockDelta, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn parse_message_stop_and_ping() {
        let sse = "event: ping\ndata: {}\n\nevent: message_stop\ndata: {}\n\n";
        let mut stream = parse_sse_stream(mock_sse_response(sse).await);

        assert!(matches!(
            stream.next().await.unwrap().unwrap(),
            StreamEvent::Ping
        ));
        assert!(matches!(
            stream.next().await.unwrap().unwrap(),
            StreamEvent::MessageStop
        ));
    }

    #[tokio::test]
    async fn unknown_events_are_skipped() {
        let sse = "event: future_event\ndata: {\"x\":1}\n\nevent: message_stop\ndata: {}\n\n";
        let mut stream = parse_sse_stream(mock_sse_response(sse).await);

        assert!(matches!(
            stream.next().await.unwrap().unwrap(),
            StreamEvent::MessageStop
        ));
    }

    #[tokio::test]
    async fn parse_message_delta_with_usage() {
        let sse = "event: message_delta\ndata: {\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"input_tokens\":10,\"output_tokens\":25}}\n\n";
        let mut stream = parse_sse_stream(mock_sse_response(sse).await);

        match stream.next().await.unwrap().unwrap() {
            StreamEvent::MessageDelta(md) => {
                assert_eq!(md.delta.stop_reason, Some("end_turn".into()));
                assert_eq!(md.usage.as_ref().unwrap().output_tokens, 25);
            }
            other => panic!("expected MessageDelta, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn parse_error_event() {
        let sse = "event: error\ndata: {\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n";
        let mut stream = parse_sse_stream(mock_sse_response(sse).await);

        match stream.next().await.unwrap().unwrap() {
            StreamEvent::Error(err) => {
                assert_eq!(err.error.type_, "overloaded_error");
                assert_eq!(err.error.message, "Overloaded");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error() {
        let sse = "event: message_delta\ndata: not json\n\n";
        let mut stream = parse_sse_stream(mock_sse_response(sse).await);

        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), "upstream_model");
        assert!(!err.is_transient());
    }
}
