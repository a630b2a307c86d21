// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! Upstream Generation Provider Boundary
//!
//! The relay consumes a lazy, possibly-infinite sequence of generation
//! chunks from a provider it does not control. Only the chunk shape is
//! specified here: each chunk exposes an optional content delta and an
//! optional terminal reason. Skip/terminal classification is an explicit
//! per-chunk value consumed by the relay loop — never exception
//! interception.

pub mod openai;

use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

pub use openai::OpenAiGenerator;

/// One turn of the conversation sent to the generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A decrypted generation request forwarded upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Provider passthrough parameters (temperature, max_tokens, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// One chunk of the upstream token stream
///
/// Pure metadata/finish markers carry no delta; they are inspected for a
/// terminal signal and otherwise skipped by the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationChunk {
    delta: Option<String>,
    finish_reason: Option<String>,
}

impl GenerationChunk {
    pub fn content(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
            finish_reason: None,
        }
    }

    pub fn finish(reason: impl Into<String>) -> Self {
        Self {
            delta: None,
            finish_reason: Some(reason.into()),
        }
    }

    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }

    /// The usable content delta, if this chunk carries one
    pub fn content_delta(&self) -> Option<&str> {
        self.delta.as_deref().filter(|d| !d.is_empty())
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    /// Normal stop, length limit and tool-call completion are expected ways
    /// for a generation to end; anything else is anomalous
    pub fn is_expected_finish(reason: &str) -> bool {
        matches!(reason, "stop" | "length" | "tool_calls")
    }
}

/// Provider failure while establishing or consuming a generation
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// The generation request itself was rejected
    #[error("upstream request failed: {0}")]
    Request(String),

    /// The chunk stream broke mid-generation
    #[error("upstream stream failed: {0}")]
    Stream(String),
}

/// The lazy chunk sequence a generator hands back
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<GenerationChunk, UpstreamError>> + Send>>;

/// A generation provider the relay can consume
#[async_trait]
pub trait ChunkGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<ChunkStream, UpstreamError>;
}
