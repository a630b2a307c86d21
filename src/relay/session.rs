// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! Stream Session State
//!
//! One [`StreamSession`] exists per active relay call, in memory only. It is
//! created when the relay starts, accumulates the full plaintext while
//! chunks are forwarded, and is discarded once a terminal status is reached
//! and persistence has been scheduled (or explicitly skipped).

use uuid::Uuid;

/// Relay state machine: `Init -> Streaming -> terminal`
///
/// `Streaming` is entered on receipt of the first upstream chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
    Init,
    Streaming,
    /// Upstream exhausted normally with at least one content chunk
    Completed,
    /// Upstream failed after usable content was produced; the partial
    /// accumulation is still worth persisting
    FailedRecoverable,
    /// Nothing usable was produced; nothing is persisted
    FailedFatal,
}

impl RelayStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayStatus::Init | RelayStatus::Streaming)
    }

    /// Completed and recoverably-failed sessions are handed to the
    /// persistence sink; fatal ones never are
    pub fn should_persist(&self) -> bool {
        matches!(self, RelayStatus::Completed | RelayStatus::FailedRecoverable)
    }
}

/// Ephemeral accumulation state for one relay invocation
#[derive(Debug, Clone)]
pub struct StreamSession {
    /// User whose registered key the stored copy is encrypted for
    pub owner: String,
    pub conversation_id: Uuid,
    /// The user message this response answers
    pub parent_id: Option<Uuid>,
    pub model: String,
    accumulated_plaintext: String,
    chunk_count: usize,
    status: RelayStatus,
}

impl StreamSession {
    pub fn new(
        owner: impl Into<String>,
        conversation_id: Uuid,
        parent_id: Option<Uuid>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            conversation_id,
            parent_id,
            model: model.into(),
            accumulated_plaintext: String::new(),
            chunk_count: 0,
            status: RelayStatus::Init,
        }
    }

    pub fn mark_streaming(&mut self) {
        if self.status == RelayStatus::Init {
            self.status = RelayStatus::Streaming;
        }
    }

    pub fn append_delta(&mut self, delta: &str) {
        self.accumulated_plaintext.push_str(delta);
        self.chunk_count += 1;
    }

    pub fn finish(&mut self, status: RelayStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
    }

    pub fn accumulated_plaintext(&self) -> &str {
        &self.accumulated_plaintext
    }

    /// Number of content chunks received (chunks with a non-empty delta)
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn status(&self) -> RelayStatus {
        self.status
    }
}
