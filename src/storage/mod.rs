// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! Durable Message Storage
//!
//! The conversation store boundary and the persistence sink that feeds it
//! with re-encrypted message records.

pub mod sink;
pub mod store;

pub use sink::{PersistenceError, PersistenceSink};
pub use store::{ConversationStore, MemoryConversationStore, StoreError, StoredMessage};
