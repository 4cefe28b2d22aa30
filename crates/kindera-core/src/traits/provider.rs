// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model provider trait for the external LLM collaborator.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::KinderaError;
use crate::types::{ModelRequest, ModelResponse, ModelStreamChunk};

/// Interface to the external language model.
///
/// The orchestration core never reasons about the model's internals; it
/// only issues requests and consumes either a full response or a chunk
/// stream. Implementations must be cheap to clone behind an `Arc`.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, KinderaError>;

    /// Sends a completion request and returns a stream of response chunks.
    async fn stream(
        &self,
        request: ModelRequest,
    ) -> Result<
        Pin<Box<dyn Stream<Item = Result<ModelStreamChunk, KinderaError>> + Send>>,
        KinderaError,
    >;
}
