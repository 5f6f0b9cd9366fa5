//! Volatile in-process embedding store
//!
//! Fallback backend selected when Qdrant is unreachable at startup. Same
//! interface, degraded search: a full scan that honors metadata filters but
//! reports a flat distance for every hit — the lexical stage of hybrid
//! ranking provides the ordering.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{EmbeddingRecord, MetadataFilter};

/// Distance reported for every full-scan hit (no real vector distance)
const FLAT_DISTANCE: f32 = 0.5;

struct MemoryRecord {
    id: String,
    text: String,
    vector: Vec<f32>,
    metadata: HashMap<String, Value>,
}

/// In-memory embedding store; contents are lost on process exit
pub struct MemoryStore {
    records: RwLock<Vec<MemoryRecord>>,
    dimension: usize,
}

impl MemoryStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn add(
        &self,
        text: &str,
        vector: Vec<f32>,
        metadata: HashMap<String, Value>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        self.add_with_id(&id, text, vector, metadata).await;
        id
    }

    pub async fn add_with_id(
        &self,
        id: &str,
        text: &str,
        vector: Vec<f32>,
        metadata: HashMap<String, Value>,
    ) {
        let mut records = self.records.write().await;
        records.push(MemoryRecord {
            id: id.to_string(),
            text: text.to_string(),
            vector,
            metadata,
        });
    }

    /// Full scan in insertion order, capped at `limit`. Scalar metadata
    /// filters are honored; every hit carries the flat distance.
    pub async fn query_similar(
        &self,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<EmbeddingRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .filter(|r| matches_scalar_filter(&r.metadata, filter))
            .take(limit)
            .map(|r| EmbeddingRecord {
                id: r.id.clone(),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                distance: FLAT_DISTANCE,
            })
            .collect()
    }

    pub async fn delete(&self, id: &str) -> bool {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        records.len() != before
    }

    /// Stored vector for a record, used by tests to verify round-trips
    pub async fn vector_of(&self, id: &str) -> Option<Vec<f32>> {
        let records = self.records.read().await;
        records.iter().find(|r| r.id == id).map(|r| r.vector.clone())
    }
}

fn matches_scalar_filter(
    metadata: &HashMap<String, Value>,
    filter: Option<&MetadataFilter>,
) -> bool {
    let Some(filter) = filter else {
        return true;
    };

    if let Some(ref message_type) = filter.message_type {
        if metadata.get("message_type").and_then(|v| v.as_str()) != Some(message_type.as_str()) {
            return false;
        }
    }

    if let Some(ref sender_id) = filter.sender_id {
        if metadata.get("sender_id").and_then(|v| v.as_str()) != Some(sender_id.as_str()) {
            return false;
        }
    }

    if filter.date_from.is_some() || filter.date_to.is_some() {
        let Some(ts) = metadata.get("timestamp_unix").and_then(|v| v.as_i64()) else {
            return false;
        };
        if let Some(from) = filter.date_from {
            if ts < from.timestamp() {
                return false;
            }
        }
        if let Some(to) = filter.date_to {
            if ts > to.timestamp() {
                return false;
            }
        }
    }

    true
}
