//! Message service: the operation surface over store, enrichment and search
//!
//! Data flow: raw export text → parser → message store → background
//! enrichment → embedding store. Query flow: query text → embedding →
//! similarity candidates → hybrid rank → messages in ranked order.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::analysis::classifier::MessageClassifier;
use crate::analysis::embeddings::EmbeddingService;
use crate::analysis::models::{suggest_categories, MessageType};
use crate::analysis::store::{EmbeddingStore, EmbeddingStoreStats, MetadataFilter};
use crate::config::Config;
use crate::enrichment::EnrichmentWorker;
use crate::error::{Error, Result};
use crate::metrics;
use crate::parser::ChatExportParser;
use crate::search::{rank_hybrid, CANDIDATE_FACTOR};
use crate::store::{MessageFilter, MessageRecord, MessageStore, NewMessage};

/// Search request
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub query: String,
    pub limit: usize,
    pub categories: Vec<String>,
    pub message_types: Vec<MessageType>,
    pub sender_id: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

/// One ranked search result
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub message: MessageRecord,
    pub score: f32,
}

/// Search response with ranked messages
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub total: usize,
    pub query: String,
    pub suggested_categories: Vec<String>,
}

/// Result of a bulk file import
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub chat_label: String,
    pub imported: usize,
    pub message_ids: Vec<i64>,
}

/// Vault-wide statistics
#[derive(Debug, Clone)]
pub struct VaultStats {
    pub messages: usize,
    pub embeddings: EmbeddingStoreStats,
}

/// Per-sender statistics
#[derive(Debug, Clone)]
pub struct SenderStats {
    pub sender_id: String,
    pub total_messages: usize,
    pub top_categories: Vec<String>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Service tying the pipeline together
pub struct MessageService {
    store: Arc<MessageStore>,
    embedding_store: Arc<EmbeddingStore>,
    classifier: MessageClassifier,
    embeddings: Arc<EmbeddingService>,
    worker: EnrichmentWorker,
    parser: ChatExportParser,
    default_limit: usize,
}

impl MessageService {
    pub fn new(
        store: Arc<MessageStore>,
        embedding_store: Arc<EmbeddingStore>,
        classifier: MessageClassifier,
        embeddings: Arc<EmbeddingService>,
        default_limit: usize,
    ) -> Self {
        let worker = EnrichmentWorker::new(
            store.clone(),
            embedding_store.clone(),
            classifier.clone(),
            embeddings.clone(),
        );

        Self {
            store,
            embedding_store,
            classifier,
            embeddings,
            worker,
            parser: ChatExportParser::new(),
            default_limit,
        }
    }

    /// Wire the full service from configuration: OpenAI clients from the
    /// environment, Qdrant if reachable, the in-memory fallback otherwise.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let classifier = MessageClassifier::from_env(config)?;
        let embeddings = EmbeddingService::with_model(config.embedding_model.clone())
            .map_err(|e| Error::OpenAiError(e.to_string()))?;
        let dimension = embeddings.dimension();

        let embedding_store = Arc::new(
            EmbeddingStore::connect(&config.qdrant_url, &config.qdrant_collection, dimension)
                .await,
        );

        Ok(Self::new(
            Arc::new(MessageStore::new()),
            embedding_store,
            classifier,
            Arc::new(embeddings),
            config.default_search_limit,
        ))
    }

    /// Access the enrichment worker (drain helpers for binaries and tests)
    pub fn worker(&self) -> &EnrichmentWorker {
        &self.worker
    }

    /// Create a message and schedule its enrichment. The contract is
    /// "enrichment is scheduled", not "enrichment is complete".
    pub async fn create_message(&self, new: NewMessage) -> MessageRecord {
        let record = self.store.create(new).await;
        metrics::record_messages_created("live", 1);

        self.worker.spawn_enrich(record.id);
        debug!("Created message {} and scheduled enrichment", record.id);
        record
    }

    /// Import a chat export file: parse, store each message, schedule
    /// enrichment per message. A file yielding zero parsed records is the
    /// one caller-visible import failure.
    pub async fn import_chat(&self, raw_text: &str, chat_label: &str) -> Result<ImportReport> {
        let parsed = self.parser.parse(raw_text, chat_label);
        if parsed.is_empty() {
            return Err(Error::EmptyImport);
        }

        let mut message_ids = Vec::with_capacity(parsed.len());
        for message in &parsed {
            let record = self.store.create(NewMessage::from_parsed(message)).await;
            self.worker.spawn_enrich(record.id);
            message_ids.push(record.id);
        }

        metrics::record_messages_created("import", message_ids.len() as u64);
        info!(
            "Imported {} messages from chat '{}'",
            message_ids.len(),
            chat_label
        );

        Ok(ImportReport {
            chat_label: chat_label.to_string(),
            imported: message_ids.len(),
            message_ids,
        })
    }

    /// Hybrid search: semantic candidates re-ranked by keyword overlap
    pub async fn search(&self, query: MessageQuery) -> SearchResponse {
        let started = Instant::now();
        let limit = if query.limit == 0 {
            self.default_limit
        } else {
            query.limit
        };

        let query_vector = self.embeddings.embed_or_empty(&query.query).await;
        let filter = build_metadata_filter(&query);

        // Over-fetch so the lexical stage has a pool to re-rank
        let candidates = self
            .embedding_store
            .query_similar(
                &query_vector,
                limit * CANDIDATE_FACTOR,
                if filter.is_empty() { None } else { Some(&filter) },
            )
            .await;

        let ranked = rank_hybrid(&query.query, candidates, limit);

        // Resolve messages in ranked order, skipping ids that no longer exist
        let mut hits = Vec::with_capacity(ranked.len());
        for scored in ranked {
            let Some(message_id) = scored.record.message_id() else {
                warn!("Search hit {} carries no message id", scored.record.id);
                continue;
            };
            if let Some(message) = self.store.get(message_id).await {
                hits.push(SearchHit {
                    message,
                    score: scored.combined_score,
                });
            }
        }

        let suggested_categories =
            suggest_categories(hits.iter().map(|h| &h.message.categories));

        metrics::record_search_duration(started.elapsed());

        SearchResponse {
            total: hits.len(),
            hits,
            query: query.query,
            suggested_categories,
        }
    }

    /// Answer a question with context from relevant messages
    pub async fn ask(&self, query: &str, limit: usize) -> String {
        let response = self
            .search(MessageQuery {
                query: query.to_string(),
                limit,
                ..Default::default()
            })
            .await;

        let context = response
            .hits
            .iter()
            .take(10)
            .map(|hit| {
                format!(
                    "[{}] {}: {}",
                    hit.message.timestamp.format("%Y-%m-%d %H:%M"),
                    hit.message.sender_name,
                    hit.message.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        match self.classifier.answer(query, &context).await {
            Ok(answer) => answer,
            Err(err) => {
                warn!("AI query failed: {}", err);
                "I'm sorry, I encountered an error while processing your query.".to_string()
            }
        }
    }

    pub async fn get_message(&self, id: i64) -> Option<MessageRecord> {
        self.store.get(id).await
    }

    pub async fn list_messages(&self, filter: &MessageFilter) -> Vec<MessageRecord> {
        self.store.list(filter).await
    }

    /// Delete a message and its embedding. The embedding goes first so no
    /// orphaned vector can outlive the message.
    pub async fn delete_message(&self, id: i64) -> bool {
        let Some(message) = self.store.get(id).await else {
            return false;
        };

        if let Some(ref doc_id) = message.embedding_ref {
            if !self.embedding_store.delete(doc_id).await {
                warn!("Embedding {} for message {} was already gone", doc_id, id);
            }
        }

        self.store.delete(id).await
    }

    pub async fn stats(&self) -> VaultStats {
        VaultStats {
            messages: self.store.count().await,
            embeddings: self.embedding_store.stats().await,
        }
    }

    /// Aggregate statistics for one sender
    pub async fn sender_stats(&self, sender_id: &str) -> SenderStats {
        let filter = MessageFilter {
            sender_id: Some(sender_id.to_string()),
            ..Default::default()
        };
        let messages = self.store.list(&filter).await;

        let top_categories = suggest_categories(messages.iter().map(|m| &m.categories));
        let last_activity = messages.iter().map(|m| m.timestamp).max();

        SenderStats {
            sender_id: sender_id.to_string(),
            total_messages: messages.len(),
            top_categories,
            last_activity,
        }
    }
}

fn build_metadata_filter(query: &MessageQuery) -> MetadataFilter {
    let mut filter = MetadataFilter::new();
    for category in &query.categories {
        filter = filter.category(category.clone());
    }
    // The embedding store filters on a single scalar type; a single
    // requested type narrows the candidate pool, more than one is resolved
    // by the lexical stage instead
    if query.message_types.len() == 1 {
        filter = filter.message_type(query.message_types[0].as_str());
    }
    if let Some(ref sender_id) = query.sender_id {
        filter = filter.sender(sender_id.clone());
    }
    filter.date_range(query.date_from, query.date_to)
}
