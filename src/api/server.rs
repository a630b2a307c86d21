// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! HTTP Server
//!
//! Thin axum glue over the relay: key exchange, the streaming chat
//! endpoint, health. Routing and request validation carry no invariants of
//! their own — the encryption and streaming-persistence logic lives in
//! `crypto`, `relay` and `storage`.

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response, Sse},
    routing::{get, post, put},
    Router,
};
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::crypto::{decrypt_from, ClientKeyRegistry, Envelope, ServerKeys};
use crate::relay::{StreamRelay, StreamSession};
use crate::storage::PersistenceSink;
use crate::upstream::{ChatMessage, ChunkGenerator, GenerationRequest};

use super::errors::ApiError;
use super::streaming::event_payload;

/// Shared handles for all request handlers; everything is read-only or
/// internally synchronized
#[derive(Clone)]
pub struct AppState {
    pub keys: Arc<ServerKeys>,
    pub clients: Arc<ClientKeyRegistry>,
    pub sink: Arc<PersistenceSink>,
    pub generator: Arc<dyn ChunkGenerator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/encryption/public-key", get(public_key_handler))
        .route("/v1/encryption/client-key", put(register_key_handler))
        .route("/v1/chat/completions", post(chat_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn start_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    /// Server public key, PEM (SPKI)
    pub public_key: String,
    pub version: u32,
}

async fn public_key_handler(
    State(state): State<AppState>,
) -> Result<Json<PublicKeyResponse>, ApiErrorResponse> {
    let pem = state
        .keys
        .public_key_pem()
        .map_err(|e| ApiErrorResponse(ApiError::InternalError(e.to_string())))?;
    Ok(Json(PublicKeyResponse {
        public_key: pem,
        version: state.keys.version(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterKeyRequest {
    pub user_id: String,
    /// Client public key, PEM (SPKI) — the fixed encoding for this
    /// deployment
    pub public_key: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterKeyResponse {
    pub user_id: String,
    pub version: u32,
}

async fn register_key_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterKeyRequest>,
) -> Result<Json<RegisterKeyResponse>, ApiErrorResponse> {
    let version = state
        .clients
        .register(&request.user_id, &request.public_key)
        .await
        .map_err(|e| ApiErrorResponse(e.into()))?;
    Ok(Json(RegisterKeyResponse {
        user_id: request.user_id,
        version,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub model: String,
    pub conversation_id: Option<Uuid>,
    /// Envelope addressed to the server key; decrypts to a
    /// [`GenerationPayload`]
    pub request: Envelope,
}

/// Decrypted body of a chat request
#[derive(Debug, Deserialize)]
pub struct GenerationPayload {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    match handle_chat(state, request).await {
        Ok(response) => response,
        Err(e) => ApiErrorResponse(e).into_response(),
    }
}

async fn handle_chat(state: AppState, request: ChatRequest) -> Result<Response, ApiError> {
    // 1. Decrypt the inbound request with the server's own key. Failure is
    // a rejected request, never a stream.
    let plaintext = decrypt_from(&request.request, state.keys.private_key())?;
    let payload: GenerationPayload = serde_json::from_str(&plaintext)
        .map_err(|e| ApiError::InvalidRequest(format!("malformed request payload: {}", e)))?;

    // 2. Without a registered client key no chunk can be encrypted; fatal
    // for this stream before it starts.
    let recipient = state
        .clients
        .public_key(&request.user_id)
        .await
        .ok_or_else(|| {
            ApiError::InvalidRequest(format!(
                "no registered public key for user '{}'",
                request.user_id
            ))
        })?;

    let conversation_id = request.conversation_id.unwrap_or_else(Uuid::new_v4);

    // 3. Store the inbound user message re-encrypted for its owner. A store
    // failure is logged but does not block generation.
    let mut parent_id = None;
    if let Some(last) = payload.messages.last().filter(|m| m.role == "user") {
        match state
            .sink
            .commit_text(
                &request.user_id,
                conversation_id,
                "user",
                &last.content,
                None,
                None,
            )
            .await
        {
            Ok(message) => parent_id = Some(message.id),
            Err(e) => warn!("failed to persist user message: {}", e),
        }
    }

    // 4. Open the upstream generation stream.
    let upstream = state
        .generator
        .generate(GenerationRequest {
            model: request.model.clone(),
            messages: payload.messages,
            params: payload.params,
        })
        .await?;

    // 5. Relay chunks through a bounded channel; persistence is scheduled
    // by the relay task after the terminal status is known.
    let session = StreamSession::new(
        request.user_id.clone(),
        conversation_id,
        parent_id,
        request.model.clone(),
    );
    let relay = StreamRelay::new(recipient, session);
    let (tx, rx) = tokio::sync::mpsc::channel(32);
    let sink = Arc::clone(&state.sink);
    tokio::spawn(async move {
        let finished = relay.run(upstream, tx).await;
        if finished.status().should_persist() {
            sink.spawn_commit(finished);
        }
    });

    let sse_stream = tokio_stream::wrappers::ReceiverStream::new(rx).map(|event| {
        Ok::<_, Infallible>(axum::response::sse::Event::default().data(event_payload(&event)))
    });
    Ok(Sse::new(sse_stream).into_response())
}

// Error response wrapper
pub struct ApiErrorResponse(pub ApiError);

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_response())).into_response()
    }
}
