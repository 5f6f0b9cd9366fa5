//! Integration tests for the datavault library
//!
//! Drives the whole pipeline — parse, import, background enrichment, hybrid
//! search, deletion — over the in-memory embedding store, with a mock
//! OpenAI server standing in for the classification and embedding
//! capabilities.

use std::sync::Arc;

use httpmock::prelude::*;
use serde_json::json;

use datavault::analysis::classifier::MessageClassifier;
use datavault::analysis::embeddings::EmbeddingService;
use datavault::analysis::models::UNCATEGORIZED;
use datavault::analysis::store::EmbeddingStore;
use datavault::service::MessageQuery;
use datavault::{Config, MessageService, MessageStore, MessageType};

// ============================================================================
// Helpers
// ============================================================================

fn service_against(base_url: &str) -> MessageService {
    let config = Config::new();
    let classifier = MessageClassifier::with_base_url(
        "test_key",
        format!("{}/v1", base_url),
        &config,
    )
    .expect("classifier");
    let embeddings = Arc::new(EmbeddingService::with_base_url(
        format!("{}/v1", base_url),
        "test_key",
    ));

    MessageService::new(
        Arc::new(MessageStore::new()),
        Arc::new(EmbeddingStore::in_memory(4)),
        classifier,
        embeddings,
        10,
    )
}

fn mock_embeddings(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST).path("/v1/embeddings");
        then.status(200).json_body(json!({
            "object": "list",
            "model": "text-embedding-3-small",
            "data": [
                {"object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3, 0.4]}
            ],
            "usage": {"prompt_tokens": 4, "total_tokens": 4}
        }));
    })
}

fn mock_classification<'a>(server: &'a MockServer, content_json: &str) -> httpmock::Mock<'a> {
    let body = json!({
        "id": "chatcmpl-test",
        "choices": [
            {
                "index": 0,
                "message": {"role": "assistant", "content": content_json},
                "finish_reason": "stop"
            }
        ]
    });
    server.mock(move |when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200).json_body(body.clone());
    })
}

// ============================================================================
// Full pipeline
// ============================================================================

#[tokio::test]
async fn import_enrich_and_search_end_to_end() {
    let server = MockServer::start_async().await;
    let _embeddings = mock_embeddings(&server);
    let _chat = mock_classification(
        &server,
        r#"{"categories": ["tech"], "tags": ["rust"], "sentiment": 0.5, "summary": "A tech message"}"#,
    );

    let service = service_against(&server.base_url());

    let export = "6.4.2025, 11:18 - Alice: Rust makes systems programming fun\n\
                  6.4.2025, 11:19 - Bob: I prefer gardening on weekends\n\
                  6.4.2025, 11:20 - Carol: Rust compile times are improving";
    let report = service.import_chat(export, "Friends").await.unwrap();
    assert_eq!(report.imported, 3);

    service.worker().wait_idle().await;

    // Every message terminal and embedded
    for id in &report.message_ids {
        let msg = service.get_message(*id).await.unwrap();
        assert!(msg.enriched);
        assert!(msg.has_embedding);
        assert!(msg.embedding_ref.is_some());
        assert_eq!(msg.categories, vec!["tech".to_string()]);
        assert_eq!(msg.tags, vec!["rust".to_string()]);
        assert!((msg.sentiment - 0.5).abs() < 1e-6);
    }

    let stats = service.stats().await;
    assert_eq!(stats.messages, 3);
    assert_eq!(stats.embeddings.points_count, 3);

    // Hybrid search: the in-memory backend reports a flat distance, so the
    // keyword stage decides the order — both Rust messages outrank Bob's.
    let response = service
        .search(MessageQuery {
            query: "Rust programming".to_string(),
            limit: 3,
            ..Default::default()
        })
        .await;

    assert_eq!(response.total, 3);
    assert!(response.hits[0].message.content.contains("Rust"));
    assert!(response.hits[0].score > response.hits[2].score);
    assert_eq!(response.suggested_categories, vec!["tech".to_string()]);
}

#[tokio::test]
async fn single_message_import_preserves_fields() {
    let server = MockServer::start_async().await;
    let _embeddings = mock_embeddings(&server);
    let _chat = mock_classification(
        &server,
        r#"{"categories": ["personal"], "tags": [], "sentiment": 0.0, "summary": "greeting"}"#,
    );

    let service = service_against(&server.base_url());

    let report = service
        .import_chat("6.4.2025, 11:18 - Alice: Hello\nworld", "Test")
        .await
        .unwrap();
    assert_eq!(report.imported, 1);

    let msg = service.get_message(report.message_ids[0]).await.unwrap();
    assert_eq!(msg.sender_name, "Alice");
    assert_eq!(msg.content, "Hello\nworld");
    assert_eq!(msg.message_type, MessageType::Text);
    assert_eq!(msg.chat_label, "Test");
}

// ============================================================================
// Degraded capabilities
// ============================================================================

#[tokio::test]
async fn enrichment_terminal_when_embedding_endpoint_fails() {
    let server = MockServer::start_async().await;
    let _chat = mock_classification(
        &server,
        r#"{"categories": ["news"], "tags": ["update"], "sentiment": -0.2, "summary": "bad day"}"#,
    );
    let _embeddings = server.mock(|when, then| {
        when.method(POST).path("/v1/embeddings");
        then.status(500).body("upstream exploded");
    });

    let service = service_against(&server.base_url());
    let report = service
        .import_chat("6.4.2025, 11:18 - Alice: markets are down", "Test")
        .await
        .unwrap();
    service.worker().wait_idle().await;

    let msg = service.get_message(report.message_ids[0]).await.unwrap();

    // Classification survived, embedding degraded to "none"; still terminal
    assert!(msg.enriched);
    assert!(msg.embedding_ref.is_none());
    assert!(!msg.has_embedding);
    assert!(msg.enrichment_error.is_none());
    assert_eq!(msg.categories, vec!["news".to_string()]);

    assert_eq!(service.stats().await.embeddings.points_count, 0);
}

#[tokio::test]
async fn enrichment_terminal_when_classifier_returns_garbage() {
    let server = MockServer::start_async().await;
    let _embeddings = mock_embeddings(&server);
    let _chat = mock_classification(&server, "this is not json at all");

    let service = service_against(&server.base_url());
    let report = service
        .import_chat("6.4.2025, 11:18 - Alice: some content here", "Test")
        .await
        .unwrap();
    service.worker().wait_idle().await;

    let msg = service.get_message(report.message_ids[0]).await.unwrap();

    // Degraded classification, successful embedding
    assert!(msg.enriched);
    assert!(msg.has_embedding);
    assert_eq!(msg.categories, vec![UNCATEGORIZED.to_string()]);
    assert!(msg.tags.is_empty());
    assert_eq!(msg.sentiment, 0.0);
    assert_eq!(msg.summary, "some content here");
}

#[tokio::test]
async fn enrichment_terminal_when_everything_is_down() {
    // No mock server at all: both capabilities degrade
    let service = service_against("http://127.0.0.1:1");

    let report = service
        .import_chat("6.4.2025, 11:18 - Alice: offline message", "Test")
        .await
        .unwrap();
    service.worker().wait_idle().await;

    let msg = service.get_message(report.message_ids[0]).await.unwrap();
    assert!(msg.enriched);
    assert!(msg.embedding_ref.is_none());
    assert_eq!(msg.categories, vec![UNCATEGORIZED.to_string()]);
}

// ============================================================================
// Deletion consistency
// ============================================================================

#[tokio::test]
async fn deleting_a_message_removes_its_embedding() {
    let server = MockServer::start_async().await;
    let _embeddings = mock_embeddings(&server);
    let _chat = mock_classification(
        &server,
        r#"{"categories": ["tech"], "tags": [], "sentiment": 0.0, "summary": "s"}"#,
    );

    let service = service_against(&server.base_url());
    let report = service
        .import_chat(
            "6.4.2025, 11:18 - Alice: delete me later\n6.4.2025, 11:19 - Bob: keep me around",
            "Test",
        )
        .await
        .unwrap();
    service.worker().wait_idle().await;

    let target = report.message_ids[0];
    let msg = service.get_message(target).await.unwrap();
    assert!(msg.embedding_ref.is_some());

    assert!(service.delete_message(target).await);

    // No orphaned vector: the embedding is gone from the store and search
    // never returns the deleted message again
    assert_eq!(service.stats().await.embeddings.points_count, 1);

    let response = service
        .search(MessageQuery {
            query: "delete me later".to_string(),
            limit: 10,
            ..Default::default()
        })
        .await;
    assert!(response
        .hits
        .iter()
        .all(|hit| hit.message.id != target));
}

// ============================================================================
// Import edge cases
// ============================================================================

#[tokio::test]
async fn import_suppresses_system_notices_and_orphans() {
    let service = service_against("http://127.0.0.1:1");

    let export = "noise before any header\n\
                  6.4.2025, 11:18 - System: Messages and calls are end-to-end encrypted\n\
                  6.4.2025, 11:19 - Alice: real message\n\
                  with a continuation\n\
                  6.4.2025, 11:20 - Bob: Bob left";

    let report = service.import_chat(export, "Mixed").await.unwrap();
    assert_eq!(report.imported, 1);

    service.worker().wait_idle().await;
    let msg = service.get_message(report.message_ids[0]).await.unwrap();
    assert_eq!(msg.content, "real message\nwith a continuation");
}

#[tokio::test]
async fn import_with_no_parseable_messages_is_the_visible_failure() {
    let service = service_against("http://127.0.0.1:1");

    let err = service
        .import_chat("only\norphan\nlines", "Test")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No messages found"));
}

// ============================================================================
// Filtered search
// ============================================================================

#[tokio::test]
async fn search_honors_category_filter() {
    let server = MockServer::start_async().await;
    let _embeddings = mock_embeddings(&server);
    let _chat = mock_classification(
        &server,
        r#"{"categories": ["tech", "news"], "tags": [], "sentiment": 0.0, "summary": "s"}"#,
    );

    let service = service_against(&server.base_url());
    service
        .import_chat("6.4.2025, 11:18 - Alice: tagged message", "Test")
        .await
        .unwrap();
    service.worker().wait_idle().await;

    let matching = service
        .search(MessageQuery {
            query: "tagged".to_string(),
            limit: 10,
            categories: vec!["tech".to_string()],
            ..Default::default()
        })
        .await;
    assert_eq!(matching.total, 1);

    let excluded = service
        .search(MessageQuery {
            query: "tagged".to_string(),
            limit: 10,
            categories: vec!["travel".to_string()],
            ..Default::default()
        })
        .await;
    assert_eq!(excluded.total, 0);
}
