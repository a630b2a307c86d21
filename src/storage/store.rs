// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! Conversation Store Boundary
//!
//! The durable side of the relay. [`ConversationStore`] is the interface a
//! document/object mapping layer implements; the in-memory implementation
//! here backs tests and single-node deployments. Stored messages are never
//! mutated after creation — the only follow-up write is the single
//! timestamp touch on the owning conversation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::crypto::Envelope;

/// A durable message record, encrypted at rest for its owner's key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    /// "user" or "assistant"
    pub role: String,
    pub envelope: Envelope,
    pub conversation_id: Uuid,
    /// The message this one replies to, for threading
    pub parent_id: Option<Uuid>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store write failed: {0}")]
    Write(String),
}

/// Accepts stored messages on behalf of an owner
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append one message and touch the owning conversation's `updated_at`
    async fn append_message(&self, owner: &str, message: StoredMessage)
        -> Result<(), StoreError>;

    /// All messages of a conversation in append order
    async fn messages(&self, conversation_id: Uuid) -> Result<Vec<StoredMessage>, StoreError>;
}

#[derive(Debug)]
struct ConversationRecord {
    owner: String,
    messages: Vec<StoredMessage>,
    updated_at: DateTime<Utc>,
}

/// In-memory store, one record per conversation
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<Uuid, ConversationRecord>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn updated_at(&self, conversation_id: Uuid) -> Option<DateTime<Utc>> {
        self.conversations
            .read()
            .await
            .get(&conversation_id)
            .map(|r| r.updated_at)
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn append_message(
        &self,
        owner: &str,
        message: StoredMessage,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let record = conversations
            .entry(message.conversation_id)
            .or_insert_with(|| ConversationRecord {
                owner: owner.to_string(),
                messages: Vec::new(),
                updated_at: Utc::now(),
            });
        if record.owner != owner {
            return Err(StoreError::Write(format!(
                "conversation {} does not belong to {}",
                message.conversation_id, owner
            )));
        }
        record.messages.push(message);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn messages(&self, conversation_id: Uuid) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(self
            .conversations
            .read()
            .await
            .get(&conversation_id)
            .map(|r| r.messages.clone())
            .unwrap_or_default())
    }
}
