//! Relay-to-sink integration: which finished sessions become durable
//! records, and for whose key the stored copy is encrypted.

use std::sync::Arc;

use aithena_relay_node::crypto::{decrypt_from, ClientKeyRegistry, ServerKeys};
use aithena_relay_node::relay::{RelayStatus, StreamRelay, StreamSession};
use aithena_relay_node::storage::{ConversationStore, MemoryConversationStore, PersistenceSink};
use aithena_relay_node::upstream::{ChunkStream, GenerationChunk, UpstreamError};
use tokio::sync::mpsc;
use uuid::Uuid;

struct Fixture {
    sink: Arc<PersistenceSink>,
    store: Arc<MemoryConversationStore>,
    /// Owner's long-lived keypair, registered in the sink's registry
    owner_keys: ServerKeys,
    /// Ephemeral per-stream recipient keypair, NOT registered anywhere
    stream_keys: ServerKeys,
}

async fn fixture(owner: &str) -> Fixture {
    let owner_keys = ServerKeys::generate().unwrap();
    let registry = Arc::new(ClientKeyRegistry::new());
    registry
        .register(owner, &owner_keys.public_key_pem().unwrap())
        .await
        .unwrap();
    let store = Arc::new(MemoryConversationStore::new());
    let sink = Arc::new(PersistenceSink::new(store.clone(), registry));
    Fixture {
        sink,
        store,
        owner_keys,
        stream_keys: ServerKeys::generate().unwrap(),
    }
}

async fn run_relay(
    fixture: &Fixture,
    owner: &str,
    items: Vec<Result<GenerationChunk, UpstreamError>>,
) -> StreamSession {
    let upstream: ChunkStream = Box::pin(futures_util::stream::iter(items));
    let session = StreamSession::new(owner, Uuid::new_v4(), None, "test-model");
    let (tx, mut rx) = mpsc::channel(16);
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let finished = StreamRelay::new(fixture.stream_keys.public_key().clone(), session)
        .run(upstream, tx)
        .await;
    drain.await.unwrap();
    finished
}

#[tokio::test]
async fn test_recoverable_failure_persists_partial_answer() {
    let fixture = fixture("alice").await;
    let finished = run_relay(
        &fixture,
        "alice",
        vec![
            Ok(GenerationChunk::content("Hel")),
            Ok(GenerationChunk::content("lo")),
            Err(UpstreamError::Stream("connection reset".into())),
        ],
    )
    .await;

    assert_eq!(finished.status(), RelayStatus::FailedRecoverable);
    let conversation = finished.conversation_id;
    fixture.sink.commit(&finished).await.unwrap();

    let stored = fixture.store.messages(conversation).await.unwrap();
    assert_eq!(stored.len(), 1, "exactly one record per session");
    assert_eq!(stored[0].role, "assistant");
    assert_eq!(stored[0].model.as_deref(), Some("test-model"));

    // Stored copy is for the owner's registered key, not the per-stream
    // recipient key.
    let plaintext = decrypt_from(&stored[0].envelope, fixture.owner_keys.private_key()).unwrap();
    assert_eq!(plaintext, "Hello");
    assert!(decrypt_from(&stored[0].envelope, fixture.stream_keys.private_key()).is_err());
}

#[tokio::test]
async fn test_completed_stream_persists_full_answer() {
    let fixture = fixture("alice").await;
    let finished = run_relay(
        &fixture,
        "alice",
        vec![
            Ok(GenerationChunk::content("full ")),
            Ok(GenerationChunk::content("answer")),
            Ok(GenerationChunk::finish("stop")),
        ],
    )
    .await;

    assert_eq!(finished.status(), RelayStatus::Completed);
    assert!(finished.status().should_persist());
    fixture.sink.commit(&finished).await.unwrap();

    let stored = fixture
        .store
        .messages(finished.conversation_id)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    let plaintext = decrypt_from(&stored[0].envelope, fixture.owner_keys.private_key()).unwrap();
    assert_eq!(plaintext, "full answer");
}

#[tokio::test]
async fn test_fatal_failure_commits_nothing() {
    let fixture = fixture("alice").await;
    let finished = run_relay(
        &fixture,
        "alice",
        vec![Err(UpstreamError::Stream("immediate failure".into()))],
    )
    .await;

    assert_eq!(finished.status(), RelayStatus::FailedFatal);
    assert!(!finished.status().should_persist());

    // The scheduling gate is the status check; a fatal session is never
    // handed to the sink.
    let stored = fixture
        .store
        .messages(finished.conversation_id)
        .await
        .unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn test_spawned_commit_lands_after_stream_end() {
    let fixture = fixture("alice").await;
    let finished = run_relay(
        &fixture,
        "alice",
        vec![
            Ok(GenerationChunk::content("deferred")),
            Ok(GenerationChunk::finish("stop")),
        ],
    )
    .await;
    let conversation = finished.conversation_id;

    fixture.sink.spawn_commit(finished);

    for _ in 0..50 {
        let stored = fixture.store.messages(conversation).await.unwrap();
        if !stored.is_empty() {
            let plaintext =
                decrypt_from(&stored[0].envelope, fixture.owner_keys.private_key()).unwrap();
            assert_eq!(plaintext, "deferred");
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("deferred commit never landed");
}

#[tokio::test]
async fn test_user_and_assistant_messages_thread_in_one_conversation() {
    let fixture = fixture("alice").await;
    let conversation = Uuid::new_v4();

    let user_message = fixture
        .sink
        .commit_text("alice", conversation, "user", "What is Rust?", None, None)
        .await
        .unwrap();

    let mut session = StreamSession::new("alice", conversation, Some(user_message.id), "test-model");
    session.mark_streaming();
    session.append_delta("A systems language.");
    session.finish(RelayStatus::Completed);
    fixture.sink.commit(&session).await.unwrap();

    let stored = fixture.store.messages(conversation).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].role, "user");
    assert_eq!(stored[1].role, "assistant");
    assert_eq!(stored[1].parent_id, Some(user_message.id));
}
