// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! Streaming Relay Engine
//!
//! Pulls chunks from the upstream generator one at a time, encrypts each
//! content delta for the downstream recipient, and pushes the encrypted
//! unit into an output channel immediately — the relay never buffers output
//! waiting for more chunks, and chunks are forwarded in exact arrival
//! order. The full plaintext is accumulated on the side so the completed
//! (or recoverably-failed) answer can be persisted after the stream ends.
//!
//! Upstream providers intermittently fail *after* producing a usable
//! answer. Treating every mid-stream error as fatal would silently drop
//! answers the user already saw rendered, so an error after at least one
//! forwarded chunk is classified recoverable: the partial accumulation is
//! kept as the final answer and the client sees a clean end-of-stream.

use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::crypto::{encrypt_for, Envelope};
use crate::upstream::{ChunkStream, GenerationChunk};
use futures::StreamExt;

use super::session::{RelayStatus, StreamSession};

/// One self-contained, independently decryptable unit of the outbound
/// stream. Wire shape of the SSE `data:` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedChunk {
    /// Base64 ciphertext of this delta alone (not the running total)
    pub content: String,
    pub encrypted_key: String,
    pub iv: String,
    pub tag: String,
    pub is_encrypted: bool,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl EncryptedChunk {
    pub fn from_envelope(envelope: Envelope) -> Self {
        Self {
            content: envelope.encrypted_content,
            encrypted_key: envelope.encrypted_key,
            iv: envelope.iv,
            tag: envelope.tag,
            is_encrypted: true,
            role: "assistant".to_string(),
            finish_reason: None,
        }
    }

    /// Synthetic terminal chunk: lets the client's consumer loop observe a
    /// clean end-of-stream instead of a dangling connection
    pub fn terminal() -> Self {
        Self {
            content: String::new(),
            encrypted_key: String::new(),
            iv: String::new(),
            tag: String::new(),
            is_encrypted: false,
            role: "assistant".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }
}

/// What the relay emits downstream
#[derive(Debug, Clone)]
pub enum RelayEvent {
    Chunk(EncryptedChunk),
    /// Fatal failure before any content was forwarded; plain so the client
    /// can distinguish it from content
    Error { message: String },
}

/// Consumes one upstream chunk stream, forwarding encrypted units as they
/// arrive and accumulating the plaintext for persistence
pub struct StreamRelay {
    recipient: RsaPublicKey,
    session: StreamSession,
    /// Number of encrypted units actually sent downstream
    emitted: usize,
    /// Cleared if the client goes away; accumulation continues regardless
    forwarding: bool,
}

impl StreamRelay {
    pub fn new(recipient: RsaPublicKey, session: StreamSession) -> Self {
        Self {
            recipient,
            session,
            emitted: 0,
            forwarding: true,
        }
    }

    /// Drive the relay to a terminal status
    ///
    /// Returns the finished session; the caller decides whether to schedule
    /// persistence based on `session.status().should_persist()`.
    ///
    /// A closed output channel (client disconnect) only stops forwarding:
    /// upstream is consumed to completion so the persisted record is whole.
    pub async fn run(
        mut self,
        mut upstream: ChunkStream,
        tx: mpsc::Sender<RelayEvent>,
    ) -> StreamSession {
        loop {
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    self.session.mark_streaming();
                    self.handle_chunk(&chunk, &tx).await;
                }
                Some(Err(e)) => {
                    if self.session.chunk_count() > 0 {
                        warn!(
                            chunks = self.session.chunk_count(),
                            "upstream failed mid-stream with usable content, keeping partial answer: {}",
                            e
                        );
                        self.send(&tx, RelayEvent::Chunk(EncryptedChunk::terminal()))
                            .await;
                        self.session.finish(RelayStatus::FailedRecoverable);
                    } else {
                        warn!("upstream failed before producing content: {}", e);
                        self.send(
                            &tx,
                            RelayEvent::Error {
                                message: e.to_string(),
                            },
                        )
                        .await;
                        self.session.finish(RelayStatus::FailedFatal);
                    }
                    break;
                }
                None => {
                    if self.session.chunk_count() > 0 {
                        self.session.finish(RelayStatus::Completed);
                    } else {
                        // Exhausted without a single content chunk: nothing
                        // to persist, output simply ends.
                        self.session.finish(RelayStatus::FailedFatal);
                    }
                    break;
                }
            }
        }

        info!(
            status = ?self.session.status(),
            chunks = self.session.chunk_count(),
            emitted = self.emitted,
            accumulated = self.session.accumulated_plaintext().len(),
            "relay finished"
        );
        self.session
    }

    async fn handle_chunk(&mut self, chunk: &GenerationChunk, tx: &mpsc::Sender<RelayEvent>) {
        if let Some(reason) = chunk.finish_reason() {
            if !GenerationChunk::is_expected_finish(reason) {
                // Anomalous terminal reason does not itself end the stream.
                warn!(reason, "upstream reported anomalous terminal reason");
            }
        }

        let Some(delta) = chunk.content_delta() else {
            debug!("skipping chunk without content delta");
            return;
        };

        self.session.append_delta(delta);

        // Encrypt the delta alone so each unit decrypts independently.
        match encrypt_for(delta.as_bytes(), &self.recipient) {
            Ok(envelope) => {
                self.send(tx, RelayEvent::Chunk(EncryptedChunk::from_envelope(envelope)))
                    .await;
                self.emitted += 1;
            }
            Err(e) => {
                // Output-path policy: drop this chunk, keep the stream alive.
                warn!("dropping chunk, encryption failed: {}", e);
            }
        }
    }

    async fn send(&mut self, tx: &mpsc::Sender<RelayEvent>, event: RelayEvent) {
        if !self.forwarding {
            return;
        }
        if tx.send(event).await.is_err() {
            info!("client disconnected, continuing upstream consumption for persistence");
            self.forwarding = false;
        }
    }
}
