// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! Hybrid Envelope Encryption
//!
//! Implements the four-field envelope exchanged between clients and the
//! relay: the payload is encrypted with a fresh AES-256-GCM key, and only
//! that small key is wrapped with the recipient's RSA public key
//! (OAEP/SHA-256). Asymmetric-only encryption is bounded by the RSA modulus
//! and unsuitable for arbitrary-length chat content; wrapping keeps the
//! per-message cost at one RSA operation regardless of payload size, and
//! GCM provides authentication so no separate MAC layer is needed.
//!
//! **Envelope Format** (wire representation, all fields base64):
//! ```text
//! {
//!   "encrypted_content": <AES-256-GCM ciphertext>,
//!   "encrypted_key":     <RSA-OAEP wrapped 256-bit key>,
//!   "iv":                <96-bit nonce, fresh per envelope>,
//!   "tag":               <128-bit GCM authentication tag>
//! }
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::{rngs::OsRng, RngCore};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use super::error::CryptoError;

/// Symmetric key size: AES-256
pub const AES_KEY_SIZE: usize = 32;

/// GCM recommended nonce size (96 bits)
pub const GCM_IV_SIZE: usize = 12;

/// GCM authentication tag size (128 bits)
pub const GCM_TAG_SIZE: usize = 16;

/// One sealed message. Immutable once produced; consumed by exactly one
/// decrypt call. All four fields are mandatory on the wire — serde rejects
/// an envelope with any field absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 AES-256-GCM ciphertext (tag carried separately)
    pub encrypted_content: String,
    /// Base64 RSA-OAEP/SHA-256 wrapped symmetric key
    pub encrypted_key: String,
    /// Base64 96-bit initialization vector, unique per envelope
    pub iv: String,
    /// Base64 128-bit GCM tag authenticating exactly `encrypted_content`
    pub tag: String,
}

/// Encrypt `plaintext` for a specific recipient's RSA public key
///
/// Generates a fresh 256-bit symmetric key and a fresh 96-bit IV for every
/// call; no key or IV is ever reused, even for the same recipient or
/// identical plaintext.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the RSA wrap or the AEAD step fails
/// (e.g. the recipient modulus is too small to wrap a 32-byte key).
pub fn encrypt_for(plaintext: &[u8], recipient: &RsaPublicKey) -> Result<Envelope, CryptoError> {
    // 1. Fresh symmetric key and IV for this envelope only
    let mut key = [0u8; AES_KEY_SIZE];
    let mut iv = [0u8; GCM_IV_SIZE];
    OsRng.fill_bytes(&mut key);
    OsRng.fill_bytes(&mut iv);

    // 2. AES-256-GCM over the payload
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CryptoError::encryption(format!("failed to create cipher: {}", e)))?;
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| CryptoError::encryption(format!("AEAD encryption failed: {}", e)))?;

    // aes-gcm appends the tag to the ciphertext; the wire format carries it
    // as a separate field
    let tag = sealed.split_off(sealed.len() - GCM_TAG_SIZE);

    // 3. Wrap the symmetric key with the recipient's public key
    let wrapped = recipient
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &key)
        .map_err(|e| CryptoError::encryption(format!("RSA key wrap failed: {}", e)))?;

    // 4. Base64 each field independently for transport/storage
    Ok(Envelope {
        encrypted_content: BASE64.encode(&sealed),
        encrypted_key: BASE64.encode(&wrapped),
        iv: BASE64.encode(iv),
        tag: BASE64.encode(&tag),
    })
}

/// Decrypt an envelope addressed to `own_key`
///
/// Unwraps the symmetric key via RSA-OAEP/SHA-256, then decrypts and
/// authenticates with AES-GCM. Fails closed: no partial plaintext is ever
/// returned.
///
/// # Errors
///
/// Returns `CryptoError::Decryption` on wrong private key, corrupted or
/// truncated base64 fields, or tag mismatch. The causes are deliberately
/// indistinguishable; sub-step failures are logged at `debug` only.
pub fn decrypt_from(envelope: &Envelope, own_key: &RsaPrivateKey) -> Result<String, CryptoError> {
    // 1. Decode the four wire fields
    let ciphertext = decode_field(&envelope.encrypted_content, "encrypted_content")?;
    let wrapped_key = decode_field(&envelope.encrypted_key, "encrypted_key")?;
    let iv = decode_field(&envelope.iv, "iv")?;
    let tag = decode_field(&envelope.tag, "tag")?;

    if iv.len() != GCM_IV_SIZE || tag.len() != GCM_TAG_SIZE {
        debug!(
            iv_len = iv.len(),
            tag_len = tag.len(),
            "envelope rejected: wrong iv/tag size"
        );
        return Err(CryptoError::Decryption);
    }

    // 2. Unwrap the symmetric key with our private key
    let key = own_key
        .decrypt(Oaep::new::<Sha256>(), &wrapped_key)
        .map_err(|e| {
            debug!("envelope rejected: key unwrap failed: {}", e);
            CryptoError::Decryption
        })?;

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| {
        debug!("envelope rejected: unwrapped key unusable: {}", e);
        CryptoError::Decryption
    })?;

    // 3. Authenticate and decrypt; aes-gcm expects ciphertext || tag
    let mut combined = ciphertext;
    combined.extend_from_slice(&tag);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), combined.as_slice())
        .map_err(|e| {
            debug!("envelope rejected: authentication failed: {}", e);
            CryptoError::Decryption
        })?;

    String::from_utf8(plaintext).map_err(|e| {
        debug!("envelope rejected: plaintext not UTF-8: {}", e);
        CryptoError::Decryption
    })
}

fn decode_field(value: &str, field: &str) -> Result<Vec<u8>, CryptoError> {
    BASE64.decode(value).map_err(|e| {
        debug!(field, "envelope rejected: base64 decode failed: {}", e);
        CryptoError::Decryption
    })
}
