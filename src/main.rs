// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use std::{env, sync::Arc};

use aithena_relay_node::{
    api::{self, AppState},
    config::NodeConfig,
    crypto::{ClientKeyRegistry, ServerKeys},
    storage::{MemoryConversationStore, PersistenceSink},
    upstream::OpenAiGenerator,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let config = NodeConfig::from_env();
    tracing::info!("🚀 Starting Aithena relay node v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Upstream provider: {}", config.upstream_url);

    // Explicit one-time key initialization: load persisted PEM files or
    // generate and persist new ones.
    let keys = Arc::new(ServerKeys::init(&config.keys_dir)?);

    let clients = Arc::new(ClientKeyRegistry::new());
    let store = Arc::new(MemoryConversationStore::new());
    let sink = Arc::new(PersistenceSink::new(store, Arc::clone(&clients)));
    let generator = Arc::new(OpenAiGenerator::new(
        config.upstream_url.clone(),
        config.upstream_api_key.clone(),
    ));

    let state = AppState {
        keys,
        clients,
        sink,
        generator,
    };

    api::start_server(state, config.api_port).await
}
