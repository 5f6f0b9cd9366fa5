//! Embedding store capability
//!
//! One interface, two backends: a durable Qdrant collection and a volatile
//! in-process fallback used when Qdrant is unreachable at startup. The
//! backend is chosen once at `connect` time and injected into dependents;
//! nothing downstream inspects which variant it got.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use super::memory_db::MemoryStore;
use super::vector_db::QdrantStore;

/// A stored embedding with its text and scalar metadata.
///
/// `distance` is a non-negative dissimilarity score, smaller = more similar.
/// The volatile backend reports a flat 0.5 for every hit.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub id: String,
    pub text: String,
    pub metadata: HashMap<String, Value>,
    pub distance: f32,
}

impl EmbeddingRecord {
    /// Message id carried in the metadata bundle, if present
    pub fn message_id(&self) -> Option<i64> {
        self.metadata.get("message_id").and_then(|v| v.as_i64())
    }
}

/// Filter over embedding metadata.
///
/// Scalar fields filter by equality and the timestamp by range; list-valued
/// fields (categories) are matched by substring containment against the
/// stringified list. That containment check is an approximation, not exact
/// set membership, and lives in exactly one place: `matches_lists`.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub message_type: Option<String>,
    pub sender_id: Option<String>,
    pub categories: Vec<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn date_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.message_type.is_none()
            && self.sender_id.is_none()
            && self.categories.is_empty()
            && self.date_from.is_none()
            && self.date_to.is_none()
    }

    /// Substring containment of any requested category against the
    /// stringified `categories` metadata field.
    pub(crate) fn matches_lists(&self, metadata: &HashMap<String, Value>) -> bool {
        if self.categories.is_empty() {
            return true;
        }
        let stored = metadata
            .get("categories")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        self.categories.iter().any(|c| stored.contains(c.as_str()))
    }
}

/// Collection statistics
#[derive(Debug, Clone)]
pub struct EmbeddingStoreStats {
    pub backend: &'static str,
    pub points_count: u64,
    pub dimension: usize,
}

/// Embedding store over one of two interchangeable backends
pub enum EmbeddingStore {
    Qdrant(QdrantStore),
    Memory(MemoryStore),
}

impl EmbeddingStore {
    /// Connect to the Qdrant backend, falling back to the volatile
    /// in-process store when the server is unreachable. The choice is made
    /// once; the process never re-probes.
    pub async fn connect(url: &str, collection: &str, dimension: usize) -> Self {
        match QdrantStore::connect(url, collection, dimension).await {
            Ok(store) => {
                info!("Embedding store: Qdrant at {} ({})", url, collection);
                EmbeddingStore::Qdrant(store)
            }
            Err(err) => {
                warn!(
                    "Qdrant unavailable at {} ({err}), using volatile in-memory store",
                    url
                );
                EmbeddingStore::Memory(MemoryStore::new(dimension))
            }
        }
    }

    /// Volatile store, for tests and offline use
    pub fn in_memory(dimension: usize) -> Self {
        EmbeddingStore::Memory(MemoryStore::new(dimension))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            EmbeddingStore::Qdrant(_) => "qdrant",
            EmbeddingStore::Memory(_) => "memory",
        }
    }

    /// Store a text with its embedding and metadata, returning the document
    /// id. Fails soft: `None` for an empty vector or an unavailable backend.
    /// List-valued metadata is coerced to a single string representation
    /// before insertion since only scalar payload values are filterable.
    pub async fn add(
        &self,
        text: &str,
        vector: Vec<f32>,
        metadata: HashMap<String, Value>,
    ) -> Option<String> {
        if vector.is_empty() {
            return None;
        }

        let metadata = coerce_metadata(metadata);
        match self {
            EmbeddingStore::Qdrant(store) => match store.add(text, vector, metadata).await {
                Ok(id) => Some(id),
                Err(err) => {
                    warn!("Failed to add embedding: {}", err);
                    None
                }
            },
            EmbeddingStore::Memory(store) => Some(store.add(text, vector, metadata).await),
        }
    }

    /// Query the most similar records, fewest-distance first. Scalar filters
    /// are pushed down to the backend; list filters are applied here by
    /// substring containment so both backends behave identically. Returns an
    /// empty list (not an error) when the backend is unavailable.
    pub async fn query_similar(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<EmbeddingRecord> {
        let mut records = match self {
            EmbeddingStore::Qdrant(store) => {
                match store.query_similar(vector, limit, filter).await {
                    Ok(records) => records,
                    Err(err) => {
                        warn!("Vector search failed: {}", err);
                        Vec::new()
                    }
                }
            }
            EmbeddingStore::Memory(store) => store.query_similar(limit, filter).await,
        };

        if let Some(f) = filter {
            records.retain(|r| f.matches_lists(&r.metadata));
        }
        records
    }

    /// Delete a record. Idempotent; returns false for an unknown id.
    pub async fn delete(&self, id: &str) -> bool {
        match self {
            EmbeddingStore::Qdrant(store) => match store.delete(id).await {
                Ok(existed) => existed,
                Err(err) => {
                    warn!("Failed to delete embedding {}: {}", id, err);
                    false
                }
            },
            EmbeddingStore::Memory(store) => store.delete(id).await,
        }
    }

    /// Replace a record under the same id, as delete-then-recreate — the
    /// backend has no in-place update. Not atomic: a crash between the two
    /// steps leaves the id absent. When text or vector is omitted the record
    /// is not recreated.
    pub async fn replace(
        &self,
        id: &str,
        text: Option<&str>,
        vector: Option<Vec<f32>>,
        metadata: Option<HashMap<String, Value>>,
    ) -> bool {
        if !self.delete(id).await {
            return false;
        }

        if let (Some(text), Some(vector)) = (text, vector) {
            if vector.is_empty() {
                return false;
            }
            let metadata = coerce_metadata(metadata.unwrap_or_default());
            let ok = match self {
                EmbeddingStore::Qdrant(store) => {
                    match store.add_with_id(id, text, vector, metadata).await {
                        Ok(()) => true,
                        Err(err) => {
                            warn!("Failed to recreate embedding {}: {}", id, err);
                            false
                        }
                    }
                }
                EmbeddingStore::Memory(store) => {
                    store.add_with_id(id, text, vector, metadata).await;
                    true
                }
            };
            return ok;
        }

        true
    }

    /// Point count and dimension for the stats surface
    pub async fn stats(&self) -> EmbeddingStoreStats {
        match self {
            EmbeddingStore::Qdrant(store) => match store.stats().await {
                Ok((points_count, dimension)) => EmbeddingStoreStats {
                    backend: "qdrant",
                    points_count,
                    dimension,
                },
                Err(err) => {
                    warn!("Failed to fetch collection stats: {}", err);
                    EmbeddingStoreStats {
                        backend: "qdrant",
                        points_count: 0,
                        dimension: 0,
                    }
                }
            },
            EmbeddingStore::Memory(store) => EmbeddingStoreStats {
                backend: "memory",
                points_count: store.len().await as u64,
                dimension: store.dimension(),
            },
        }
    }
}

/// Coerce metadata to scalar-only values: arrays become one comma-joined
/// string, everything else passes through.
pub fn coerce_metadata(metadata: HashMap<String, Value>) -> HashMap<String, Value> {
    metadata
        .into_iter()
        .map(|(key, value)| {
            let coerced = match value {
                Value::Array(items) => {
                    let joined = items
                        .iter()
                        .map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    Value::String(joined)
                }
                other => other,
            };
            (key, coerced)
        })
        .collect()
}
