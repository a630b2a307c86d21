// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
pub mod errors;
pub mod server;
pub mod streaming;

pub use errors::{ApiError, ErrorResponse};
pub use server::{start_server, AppState, ChatRequest, GenerationPayload};
pub use streaming::{event_payload, format_sse};
