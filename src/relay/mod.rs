// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! Streaming Relay
//!
//! Consumes a live upstream generation stream, re-encrypts each content
//! delta for the downstream client, forwards it immediately, and tracks the
//! accumulated plaintext and completion status for persistence.

pub mod session;
pub mod stream;

pub use session::{RelayStatus, StreamSession};
pub use stream::{EncryptedChunk, RelayEvent, StreamRelay};
