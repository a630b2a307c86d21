//! Streaming relay behavior against synthetic upstream sequences.

use aithena_relay_node::crypto::{decrypt_from, Envelope, ServerKeys};
use aithena_relay_node::relay::{RelayEvent, RelayStatus, StreamRelay, StreamSession};
use aithena_relay_node::upstream::{ChunkStream, GenerationChunk, UpstreamError};
use tokio::sync::mpsc;
use uuid::Uuid;

fn upstream(items: Vec<Result<GenerationChunk, UpstreamError>>) -> ChunkStream {
    Box::pin(futures_util::stream::iter(items))
}

fn session_for(owner: &str) -> StreamSession {
    StreamSession::new(owner, Uuid::new_v4(), None, "test-model")
}

async fn drain(mut rx: mpsc::Receiver<RelayEvent>) -> Vec<RelayEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_accumulation_equals_delta_concatenation() {
    let keys = ServerKeys::generate().unwrap();
    let deltas = ["The ", "quick ", "brown ", "fox"];
    let mut items: Vec<_> = deltas
        .iter()
        .map(|d| Ok(GenerationChunk::content(*d)))
        .collect();
    items.push(Ok(GenerationChunk::finish("stop")));

    let (tx, rx) = mpsc::channel(16);
    let finished = StreamRelay::new(keys.public_key().clone(), session_for("alice"))
        .run(upstream(items), tx)
        .await;

    assert_eq!(finished.status(), RelayStatus::Completed);
    assert_eq!(finished.accumulated_plaintext(), deltas.concat());
    assert_eq!(finished.chunk_count(), deltas.len());

    // One emitted encrypted unit per non-empty delta, in arrival order,
    // each independently decryptable.
    let events = drain(rx).await;
    assert_eq!(events.len(), deltas.len());
    for (event, expected) in events.iter().zip(deltas) {
        let RelayEvent::Chunk(chunk) = event else {
            panic!("expected encrypted chunk");
        };
        let envelope = Envelope {
            encrypted_content: chunk.content.clone(),
            encrypted_key: chunk.encrypted_key.clone(),
            iv: chunk.iv.clone(),
            tag: chunk.tag.clone(),
        };
        assert_eq!(decrypt_from(&envelope, keys.private_key()).unwrap(), expected);
        assert!(chunk.is_encrypted);
        assert_eq!(chunk.role, "assistant");
    }
}

#[tokio::test]
async fn test_metadata_chunks_do_not_count_or_emit() {
    let keys = ServerKeys::generate().unwrap();
    let items = vec![
        Ok(GenerationChunk::default()), // pure metadata
        Ok(GenerationChunk::content("only")),
        Ok(GenerationChunk::content("")), // empty delta is not content
        Ok(GenerationChunk::finish("stop")),
    ];

    let (tx, rx) = mpsc::channel(16);
    let finished = StreamRelay::new(keys.public_key().clone(), session_for("alice"))
        .run(upstream(items), tx)
        .await;

    assert_eq!(finished.chunk_count(), 1);
    assert_eq!(finished.accumulated_plaintext(), "only");
    assert_eq!(drain(rx).await.len(), 1);
}

#[tokio::test]
async fn test_partial_failure_keeps_partial_answer() {
    let keys = ServerKeys::generate().unwrap();
    let items = vec![
        Ok(GenerationChunk::content("Hel")),
        Ok(GenerationChunk::content("lo")),
        Err(UpstreamError::Stream("provider dropped the connection".into())),
    ];

    let (tx, rx) = mpsc::channel(16);
    let finished = StreamRelay::new(keys.public_key().clone(), session_for("alice"))
        .run(upstream(items), tx)
        .await;

    assert_eq!(finished.status(), RelayStatus::FailedRecoverable);
    assert!(finished.status().should_persist());
    assert_eq!(finished.accumulated_plaintext(), "Hello");

    // Two content units then exactly one clean terminal chunk; the client
    // must observe a normal-looking stream termination, not an error.
    let events = drain(rx).await;
    assert_eq!(events.len(), 3);
    match &events[2] {
        RelayEvent::Chunk(chunk) => {
            assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
            assert!(!chunk.is_encrypted);
        }
        RelayEvent::Error { .. } => panic!("recoverable failure must look like a clean end"),
    }
}

#[tokio::test]
async fn test_zero_content_failure_emits_single_error_unit() {
    let keys = ServerKeys::generate().unwrap();
    let items = vec![Err(UpstreamError::Stream("immediate failure".into()))];

    let (tx, rx) = mpsc::channel(16);
    let finished = StreamRelay::new(keys.public_key().clone(), session_for("alice"))
        .run(upstream(items), tx)
        .await;

    assert_eq!(finished.status(), RelayStatus::FailedFatal);
    assert!(!finished.status().should_persist());

    let events = drain(rx).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], RelayEvent::Error { .. }));
}

#[tokio::test]
async fn test_empty_stream_is_fatal_and_silent() {
    let keys = ServerKeys::generate().unwrap();

    let (tx, rx) = mpsc::channel(16);
    let finished = StreamRelay::new(keys.public_key().clone(), session_for("alice"))
        .run(upstream(Vec::new()), tx)
        .await;

    assert_eq!(finished.status(), RelayStatus::FailedFatal);
    assert!(drain(rx).await.is_empty());
}
