//! Background message enrichment
//!
//! Attaches AI-derived categories/tags/sentiment/summary and a vector
//! embedding to stored messages. Scheduling is fire-and-forget: the call
//! that created the message returns before enrichment runs. Every run is
//! terminal — success, degraded capability, or failure all leave the
//! message with `enriched = true`, so nothing stays pending forever.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::analysis::classifier::MessageClassifier;
use crate::analysis::embeddings::EmbeddingService;
use crate::analysis::models::MessageAnalysis;
use crate::analysis::store::EmbeddingStore;
use crate::metrics::{self, EnrichmentStatus};
use crate::store::{MessageRecord, MessageStore};

/// Worker driving the enrichment pipeline
#[derive(Clone)]
pub struct EnrichmentWorker {
    store: Arc<MessageStore>,
    embedding_store: Arc<EmbeddingStore>,
    classifier: MessageClassifier,
    embeddings: Arc<EmbeddingService>,
    inflight: Arc<AtomicUsize>,
}

impl EnrichmentWorker {
    pub fn new(
        store: Arc<MessageStore>,
        embedding_store: Arc<EmbeddingStore>,
        classifier: MessageClassifier,
        embeddings: Arc<EmbeddingService>,
    ) -> Self {
        Self {
            store,
            embedding_store,
            classifier,
            embeddings,
            inflight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Schedule enrichment for a message and return immediately.
    ///
    /// There is no ordering guarantee between the creation becoming visible
    /// and the enrichment completing; a concurrent reader may observe
    /// `enriched = false`.
    pub fn spawn_enrich(&self, message_id: i64) {
        self.inflight.fetch_add(1, Ordering::SeqCst);

        let worker = self.clone();
        tokio::spawn(async move {
            worker.enrich(message_id).await;
            worker.inflight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Wait until every scheduled enrichment task has finished.
    pub async fn wait_idle(&self) {
        while self.inflight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Number of scheduled-but-unfinished enrichment tasks
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    /// Enrich one message. Never panics and never leaves the message in a
    /// pending state: failures outside the AI capability boundary are
    /// recorded on the message and the terminal flag is still set.
    pub async fn enrich(&self, message_id: i64) {
        metrics::record_enrichment_start();

        let status = match self.try_enrich(message_id).await {
            Ok(status) => status,
            Err(err) => {
                error!("Enrichment failed for message {}: {}", message_id, err);
                if let Err(mark_err) = self
                    .store
                    .mark_enrichment_failed(message_id, &err.to_string())
                    .await
                {
                    warn!(
                        "Could not record enrichment failure for {}: {}",
                        message_id, mark_err
                    );
                }
                EnrichmentStatus::Error
            }
        };

        metrics::record_enrichment_result(status);
    }

    async fn try_enrich(&self, message_id: i64) -> anyhow::Result<EnrichmentStatus> {
        // Absent message or empty content: nothing to enrich, not an error
        let Some(message) = self.store.get(message_id).await else {
            debug!("Message {} no longer exists, skipping enrichment", message_id);
            return Ok(EnrichmentStatus::Degraded);
        };
        if message.content.trim().is_empty() {
            debug!("Message {} has empty content, skipping enrichment", message_id);
            return Ok(EnrichmentStatus::Degraded);
        }

        // Both capabilities degrade internally instead of failing
        let analysis = self
            .classifier
            .analyze(&message.content, message.message_type)
            .await;
        let vector = self.embeddings.embed_or_empty(&message.content).await;

        let embedding_ref = if vector.is_empty() {
            None
        } else {
            let metadata = metadata_bundle(&message, &analysis);
            self.embedding_store
                .add(&message.content, vector, metadata)
                .await
        };

        let status = if embedding_ref.is_some() {
            EnrichmentStatus::Ok
        } else {
            EnrichmentStatus::Degraded
        };

        self.store
            .update_enrichment(message_id, &analysis, embedding_ref)
            .await?;

        debug!("Enriched message {} ({:?})", message_id, status);
        Ok(status)
    }
}

/// Metadata bundle stored beside the vector. List-valued fields are coerced
/// to scalar strings by the embedding store.
fn metadata_bundle(message: &MessageRecord, analysis: &MessageAnalysis) -> HashMap<String, Value> {
    let preview: String = message.content.chars().take(200).collect();

    let mut metadata = HashMap::new();
    metadata.insert("message_id".to_string(), json!(message.id));
    metadata.insert("content_preview".to_string(), json!(preview));
    metadata.insert("categories".to_string(), json!(analysis.categories));
    metadata.insert("tags".to_string(), json!(analysis.tags));
    metadata.insert(
        "message_type".to_string(),
        json!(message.message_type.as_str()),
    );
    metadata.insert("sender_name".to_string(), json!(message.sender_name));
    metadata.insert("sender_id".to_string(), json!(message.sender_id));
    metadata.insert(
        "timestamp".to_string(),
        json!(message.timestamp.to_rfc3339()),
    );
    metadata.insert(
        "timestamp_unix".to_string(),
        json!(message.timestamp.timestamp()),
    );
    metadata
}
