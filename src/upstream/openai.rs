// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
//! OpenAI-Compatible Streaming Client
//!
//! Talks to an OpenAI-style `/chat/completions` endpoint (LiteLLM, vLLM,
//! any compatible gateway) with `stream: true` and turns the SSE byte
//! stream into [`GenerationChunk`]s.
//!
//! Frames look like `data: {json}\n\n`; the payload's
//! `choices[0].delta.content` is the content delta and
//! `choices[0].finish_reason` the terminal reason. A `data: [DONE]`
//! sentinel ends the stream, but exhaustion of the connection is treated
//! identically since not all providers send it.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use super::{ChunkGenerator, ChunkStream, GenerationChunk, GenerationRequest, UpstreamError};

/// Streaming client for an OpenAI-compatible generation provider
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChunkGenerator for OpenAiGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<ChunkStream, UpstreamError> {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "stream": true,
        });
        if let Some(Value::Object(params)) = request.params {
            for (k, v) in params {
                body[k] = v;
            }
        }

        let mut req = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Request(format!(
                "provider returned {}: {}",
                status, detail
            )));
        }

        let state = SseState {
            inner: response.bytes_stream().boxed(),
            buffer: String::new(),
            queued: VecDeque::new(),
            done: false,
        };

        Ok(Box::pin(futures::stream::unfold(state, |mut state| async {
            loop {
                if let Some(chunk) = state.queued.pop_front() {
                    return Some((Ok(chunk), state));
                }
                if state.done {
                    return None;
                }
                match state.inner.next().await {
                    None => {
                        state.done = true;
                        // Anything left without a frame terminator is a
                        // truncated frame; drop it.
                        return None;
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(UpstreamError::Stream(e.to_string())), state));
                    }
                    Some(Ok(bytes)) => {
                        state.buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = state.buffer.find("\n\n") {
                            let frame: String = state.buffer.drain(..pos + 2).collect();
                            match parse_sse_frame(frame.trim()) {
                                Frame::Chunk(chunk) => state.queued.push_back(chunk),
                                Frame::Done => state.done = true,
                                Frame::Ignore => {}
                            }
                        }
                    }
                }
            }
        })))
    }
}

struct SseState {
    inner: futures::stream::BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>,
    buffer: String,
    queued: VecDeque<GenerationChunk>,
    done: bool,
}

enum Frame {
    Chunk(GenerationChunk),
    Done,
    Ignore,
}

/// Parse one `data: <json>` frame into a chunk
///
/// Malformed frames are skipped, matching the provider contract that the
/// relay keeps streaming past individual bad chunks.
fn parse_sse_frame(frame: &str) -> Frame {
    let Some(data) = frame.strip_prefix("data:") else {
        return Frame::Ignore;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Frame::Done;
    }

    let json: Value = match serde_json::from_str(data) {
        Ok(json) => json,
        Err(e) => {
            debug!("skipping malformed upstream frame: {}", e);
            return Frame::Ignore;
        }
    };

    let choice = &json["choices"][0];
    let mut chunk = match choice["delta"]["content"].as_str() {
        Some(delta) => GenerationChunk::content(delta),
        None => GenerationChunk::default(),
    };
    if let Some(reason) = choice["finish_reason"].as_str() {
        chunk = chunk.with_finish_reason(reason);
    }
    Frame::Chunk(chunk)
}
