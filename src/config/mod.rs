// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! Node Configuration
//!
//! Environment-driven configuration with defaults suitable for local
//! development. `.env` files are honored via dotenv in `main`.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port for the HTTP API
    pub api_port: u16,
    /// Directory holding the persisted server keypair
    pub keys_dir: PathBuf,
    /// Base URL of the OpenAI-compatible generation provider
    pub upstream_url: String,
    /// Bearer token for the provider, if it requires one
    pub upstream_api_key: Option<String>,
}

impl NodeConfig {
    pub fn from_env() -> Self {
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8080);
        let keys_dir = env::var("KEYS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./keys"));
        let upstream_url =
            env::var("UPSTREAM_URL").unwrap_or_else(|_| "http://localhost:4000/v1".to_string());
        let upstream_api_key = env::var("UPSTREAM_API_KEY").ok().filter(|v| !v.is_empty());

        Self {
            api_port,
            keys_dir,
            upstream_url,
            upstream_api_key,
        }
    }
}
