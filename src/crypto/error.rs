// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! Crypto Error Types
//!
//! Error taxonomy for the envelope encryption layer.
//!
//! ## Error Variants
//!
//! - **KeyFormat**: Key material could not be parsed or is not RSA
//! - **Decryption**: Envelope could not be opened. Deliberately carries no
//!   detail: wrong private key, corrupted base64, truncated fields and tag
//!   mismatch are indistinguishable to the caller so the error cannot be
//!   used as a padding/tag oracle
//! - **Encryption**: Envelope could not be produced (RSA wrap or AEAD failure)
//! - **KeyIo**: Persisted key files could not be read or written

use thiserror::Error;

/// Errors from envelope encryption and key management
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Supplied key material is malformed or not of the expected family
    #[error("invalid key material: {reason}")]
    KeyFormat { reason: String },

    /// Envelope could not be opened. Non-specific by contract: callers must
    /// not learn which sub-step failed
    #[error("decryption failed")]
    Decryption,

    /// Envelope could not be produced
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// Key files on disk could not be read or written
    #[error("key storage error: {0}")]
    KeyIo(#[from] std::io::Error),
}

impl CryptoError {
    pub fn key_format(reason: impl Into<String>) -> Self {
        CryptoError::KeyFormat {
            reason: reason.into(),
        }
    }

    pub fn encryption(reason: impl Into<String>) -> Self {
        CryptoError::Encryption {
            reason: reason.into(),
        }
    }
}
