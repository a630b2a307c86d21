// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod crypto;
pub mod relay;
pub mod storage;
pub mod upstream;

// Re-export main types
pub use api::{AppState, ChatRequest};
pub use config::NodeConfig;
pub use crypto::{decrypt_from, encrypt_for, ClientKeyRegistry, CryptoError, Envelope, ServerKeys};
pub use relay::{EncryptedChunk, RelayEvent, RelayStatus, StreamRelay, StreamSession};
pub use storage::{
    ConversationStore, MemoryConversationStore, PersistenceError, PersistenceSink, StoredMessage,
};
pub use upstream::{ChunkGenerator, ChunkStream, GenerationChunk, GenerationRequest, UpstreamError};
