// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! Key Material Management
//!
//! The relay owns exactly one RSA keypair for its process lifetime,
//! constructed explicitly at startup: either loaded from persisted PEM files
//! under the configured keys directory, or generated and written back on
//! first run. There is no implicit first-use initialization — `main` builds
//! a [`ServerKeys`] once and hands it out behind an `Arc`.
//!
//! Client public keys are uploaded as PEM (SPKI) strings — this encoding is
//! fixed for the deployment — and held in a [`ClientKeyRegistry`].
//! Re-uploading a key for the same user replaces it and increments the
//! version counter.
//!
//! ## Security Considerations
//!
//! - The private key is NEVER transmitted or logged
//! - Only a SHA-256 fingerprint of the public SPKI DER is logged at startup
//! - Key material is read-only after initialization and safe to share
//!   read-concurrently across all sessions

use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;

use super::error::CryptoError;

/// RSA modulus size for generated keypairs
pub const RSA_KEY_BITS: usize = 2048;

const PRIVATE_KEY_FILE: &str = "server_private_key.pem";
const PUBLIC_KEY_FILE: &str = "server_public_key.pem";

/// An asymmetric identity: a public key, optionally its private half, and a
/// version that increments on replacement
///
/// Deliberately no `Debug` impl: key material must never reach a log line.
#[derive(Clone)]
pub struct KeyMaterial {
    public_key: RsaPublicKey,
    private_key: Option<RsaPrivateKey>,
    version: u32,
}

impl KeyMaterial {
    /// Parse a public-only identity from a PEM (SPKI) string
    ///
    /// # Errors
    ///
    /// `CryptoError::KeyFormat` if the PEM cannot be parsed or does not
    /// contain an RSA public key.
    pub fn from_public_pem(pem: &str) -> Result<Self, CryptoError> {
        let public_key = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| CryptoError::key_format(format!("not an RSA public key PEM: {}", e)))?;
        Ok(Self {
            public_key,
            private_key: None,
            version: 1,
        })
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn private_key(&self) -> Option<&RsaPrivateKey> {
        self.private_key.as_ref()
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

/// The relay's own keypair, loaded or generated once at process start
pub struct ServerKeys {
    public_key: RsaPublicKey,
    private_key: RsaPrivateKey,
    version: u32,
}

impl ServerKeys {
    /// Load the persisted keypair from `keys_dir`, or generate a new one and
    /// persist it
    ///
    /// Logs the public key fingerprint (never the key itself) on success.
    ///
    /// # Errors
    ///
    /// - `CryptoError::KeyIo` if the keys directory or files cannot be
    ///   read/written
    /// - `CryptoError::KeyFormat` if persisted PEM files are corrupt
    pub fn init(keys_dir: &Path) -> Result<Self, CryptoError> {
        fs::create_dir_all(keys_dir)?;
        let private_path = keys_dir.join(PRIVATE_KEY_FILE);
        let public_path = keys_dir.join(PUBLIC_KEY_FILE);

        let private_key = if private_path.exists() {
            info!("Loading existing server keypair from {:?}", keys_dir);
            let pem = fs::read_to_string(&private_path)?;
            RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| {
                CryptoError::key_format(format!("persisted private key unreadable: {}", e))
            })?
        } else {
            info!("Generating new {}-bit server keypair", RSA_KEY_BITS);
            let key = generate_private_key()?;

            let private_pem = key.to_pkcs8_pem(LineEnding::LF).map_err(|e| {
                CryptoError::key_format(format!("private key serialization failed: {}", e))
            })?;
            let public_pem = key
                .to_public_key()
                .to_public_key_pem(LineEnding::LF)
                .map_err(|e| {
                    CryptoError::key_format(format!("public key serialization failed: {}", e))
                })?;
            fs::write(&private_path, private_pem.as_bytes())?;
            fs::write(&public_path, public_pem.as_bytes())?;
            info!("Server keypair persisted to {:?}", keys_dir);
            key
        };

        let keys = Self::from_private_key(private_key);
        info!(
            "✅ Server public key fingerprint (SHA-256): {}",
            keys.fingerprint()?
        );
        Ok(keys)
    }

    /// Build from an already-generated private key. Used by `init` and by
    /// tests that need a keypair without touching the filesystem.
    pub fn from_private_key(private_key: RsaPrivateKey) -> Self {
        let public_key = private_key.to_public_key();
        Self {
            public_key,
            private_key,
            version: 1,
        }
    }

    /// Generate a fresh in-memory keypair (nothing persisted)
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self::from_private_key(generate_private_key()?))
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Server public key as a PEM (SPKI) string, the on-demand key exchange
    /// representation
    pub fn public_key_pem(&self) -> Result<String, CryptoError> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::key_format(format!("PEM encoding failed: {}", e)))
    }

    /// SHA-256 fingerprint of the public SPKI DER, hex encoded
    pub fn fingerprint(&self) -> Result<String, CryptoError> {
        let der = self
            .public_key
            .to_public_key_der()
            .map_err(|e| CryptoError::key_format(format!("DER encoding failed: {}", e)))?;
        Ok(hex::encode(Sha256::digest(der.as_bytes())))
    }
}

fn generate_private_key() -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::new(&mut rand::rngs::OsRng, RSA_KEY_BITS)
        .map_err(|e| CryptoError::key_format(format!("RSA key generation failed: {}", e)))
}

/// Registry of client public keys, keyed by user id
///
/// The server only ever holds the public half of a client identity.
#[derive(Default)]
pub struct ClientKeyRegistry {
    keys: RwLock<HashMap<String, KeyMaterial>>,
}

impl ClientKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a client's public key (PEM, SPKI)
    ///
    /// Replacement increments the stored version. Returns the version now in
    /// effect.
    pub async fn register(&self, user_id: &str, pem: &str) -> Result<u32, CryptoError> {
        let mut material = KeyMaterial::from_public_pem(pem)?;
        let mut keys = self.keys.write().await;
        if let Some(existing) = keys.get(user_id) {
            material.version = existing.version + 1;
        }
        let version = material.version;
        keys.insert(user_id.to_string(), material);
        info!(user_id, version, "client public key registered");
        Ok(version)
    }

    /// The client's registered public key, if any
    pub async fn public_key(&self, user_id: &str) -> Option<RsaPublicKey> {
        self.keys
            .read()
            .await
            .get(user_id)
            .map(|m| m.public_key.clone())
    }

    pub async fn version(&self, user_id: &str) -> Option<u32> {
        self.keys.read().await.get(user_id).map(|m| m.version)
    }
}
