// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! Envelope Encryption Module
//!
//! Cryptographic primitives for confidential client/server messaging:
//!
//! - **Keys**: RSA keypair identity, persisted PEM load/generate, client
//!   public key registry
//! - **Envelope**: hybrid encryption — AES-256-GCM payload with the
//!   symmetric key wrapped under RSA-OAEP/SHA-256
//!
//! ## Protocol Flow
//!
//! 1. Server loads or generates its keypair at startup
//! 2. Client fetches the server public key (PEM) and uploads its own
//! 3. Client encrypts each request for the server key; server decrypts
//! 4. Server re-encrypts every outbound chunk for the client key
//! 5. Stored copies are re-encrypted for the owning user's registered key

pub mod envelope;
pub mod error;
pub mod keys;

pub use envelope::{decrypt_from, encrypt_for, Envelope};
pub use error::CryptoError;
pub use keys::{ClientKeyRegistry, KeyMaterial, ServerKeys};
