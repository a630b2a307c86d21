// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! SSE Wire Format
//!
//! Each relay event becomes one `data: <json>\n\n` frame. Stream end is
//! signaled by closing the event source; no `[DONE]` sentinel is
//! guaranteed.

use crate::relay::RelayEvent;

/// JSON payload of one SSE frame
pub fn event_payload(event: &RelayEvent) -> String {
    match event {
        RelayEvent::Chunk(chunk) => serde_json::to_string(chunk).unwrap_or_default(),
        RelayEvent::Error { message } => serde_json::json!({
            "error": message,
            "is_encrypted": false,
        })
        .to_string(),
    }
}

/// Full text-event-stream frame for one event
pub fn format_sse(event: &RelayEvent) -> String {
    format!("data: {}\n\n", event_payload(event))
}
