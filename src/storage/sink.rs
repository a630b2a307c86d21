// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! Persistence Sink
//!
//! Given a finished stream session, re-encrypts the full accumulated
//! plaintext for the owning user's long-lived public key (distinct from the
//! ephemeral per-chunk recipient key) and writes exactly one stored
//! message. The commit runs as a deferred, fire-and-forget task so the
//! client-facing stream is never held open waiting on durable storage;
//! failures are logged and swallowed because the client stream has already
//! ended by the time they can occur.
//!
//! At-most-once is enforced by scheduling discipline: callers schedule one
//! commit per session. A session-id dedupe key is a recorded open question.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::crypto::{encrypt_for, ClientKeyRegistry, CryptoError};
use crate::relay::StreamSession;

use super::store::{ConversationStore, StoreError, StoredMessage};

#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The owning user never registered a public key; the stored copy
    /// cannot be encrypted
    #[error("no registered public key for owner '{owner}'")]
    MissingRecipientKey { owner: String },

    /// Nothing to save
    #[error("refusing to persist empty content")]
    EmptyContent,

    #[error(transparent)]
    Encryption(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Writes re-encrypted message records through a [`ConversationStore`]
pub struct PersistenceSink {
    store: Arc<dyn ConversationStore>,
    clients: Arc<ClientKeyRegistry>,
}

impl PersistenceSink {
    pub fn new(store: Arc<dyn ConversationStore>, clients: Arc<ClientKeyRegistry>) -> Self {
        Self { store, clients }
    }

    /// Commit one message for `owner`, encrypted for their registered key
    ///
    /// Used directly for inbound user messages and via [`commit`] for
    /// accumulated assistant answers.
    pub async fn commit_text(
        &self,
        owner: &str,
        conversation_id: Uuid,
        role: &str,
        text: &str,
        parent_id: Option<Uuid>,
        model: Option<String>,
    ) -> Result<StoredMessage, PersistenceError> {
        if text.is_empty() {
            return Err(PersistenceError::EmptyContent);
        }
        let recipient = self.clients.public_key(owner).await.ok_or_else(|| {
            PersistenceError::MissingRecipientKey {
                owner: owner.to_string(),
            }
        })?;

        let envelope = encrypt_for(text.as_bytes(), &recipient)?;
        let message = StoredMessage {
            id: Uuid::new_v4(),
            role: role.to_string(),
            envelope,
            conversation_id,
            parent_id,
            model,
            created_at: Utc::now(),
        };
        self.store.append_message(owner, message.clone()).await?;
        Ok(message)
    }

    /// Commit the accumulated answer of a finished session
    ///
    /// Callers must not invoke this more than once per session.
    pub async fn commit(&self, session: &StreamSession) -> Result<StoredMessage, PersistenceError> {
        let message = self
            .commit_text(
                &session.owner,
                session.conversation_id,
                "assistant",
                session.accumulated_plaintext(),
                session.parent_id,
                Some(session.model.clone()),
            )
            .await?;
        info!(
            conversation = %session.conversation_id,
            message = %message.id,
            chunks = session.chunk_count(),
            "assistant message persisted"
        );
        Ok(message)
    }

    /// Schedule the commit as a detached background task
    ///
    /// Runs after the response stream has been handed back to the client;
    /// errors never propagate to the already-closed stream.
    pub fn spawn_commit(self: &Arc<Self>, session: StreamSession) {
        let sink = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = sink.commit(&session).await {
                error!(
                    conversation = %session.conversation_id,
                    "failed to persist streamed message: {}",
                    e
                );
            }
        });
    }
}
