//! Vector database integration with Qdrant

use std::collections::HashMap;

use anyhow::Result;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    FieldCondition, Filter, GetPointsBuilder, Match, PointId, PointStruct, PointsIdsList, Range,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::store::{EmbeddingRecord, MetadataFilter};

/// Embedding store backed by a Qdrant collection
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    /// Connect to the Qdrant server and ensure the collection exists.
    ///
    /// Fails when the server is unreachable; the caller decides what to fall
    /// back to.
    pub async fn connect(url: &str, collection: &str, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(url).build()?;

        let store = Self {
            client,
            collection: collection.to_string(),
            dimension,
        };
        store.init_collection().await?;

        Ok(store)
    }

    /// Initialize the collection if it doesn't exist
    async fn init_collection(&self) -> Result<()> {
        let collections = self.client.list_collections().await?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            info!("Creating collection '{}'", self.collection);

            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                    ),
                )
                .await?;

            info!("Collection created successfully");
        } else {
            debug!("Collection '{}' already exists", self.collection);
        }

        Ok(())
    }

    /// Store a document under a fresh UUID, returning it
    pub async fn add(
        &self,
        text: &str,
        vector: Vec<f32>,
        metadata: HashMap<String, Value>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.add_with_id(&id, text, vector, metadata).await?;
        Ok(id)
    }

    /// Store a document under a caller-chosen id (used by replace)
    pub async fn add_with_id(
        &self,
        id: &str,
        text: &str,
        vector: Vec<f32>,
        metadata: HashMap<String, Value>,
    ) -> Result<()> {
        let mut payload: HashMap<String, QdrantValue> = HashMap::new();
        payload.insert("text".into(), text.to_string().into());
        for (key, value) in &metadata {
            payload.insert(key.clone(), json_to_qdrant(value));
        }

        debug!("Upserting point {} to '{}'", id, self.collection);

        self.client
            .upsert_points(UpsertPointsBuilder::new(
                &self.collection,
                vec![PointStruct::new(id.to_string(), vector, payload)],
            ))
            .await?;

        Ok(())
    }

    /// Search for similar documents, smallest distance first
    pub async fn query_similar(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<EmbeddingRecord>> {
        if vector.is_empty() {
            return Ok(Vec::new());
        }

        let mut search_builder =
            SearchPointsBuilder::new(&self.collection, vector.to_vec(), limit as u64)
                .with_payload(true);

        if let Some(f) = filter {
            let conditions = scalar_conditions(f);
            if !conditions.is_empty() {
                search_builder = search_builder.filter(Filter::must(conditions));
            }
        }

        let results = self.client.search_points(search_builder).await?;

        let records = results
            .result
            .into_iter()
            .map(|point| {
                let id = point
                    .id
                    .and_then(|id| match id.point_id_options {
                        Some(PointIdOptions::Uuid(uuid)) => Some(uuid),
                        Some(PointIdOptions::Num(num)) => Some(num.to_string()),
                        None => None,
                    })
                    .unwrap_or_default();

                let mut text = String::new();
                let mut metadata = HashMap::new();
                for (key, value) in point.payload {
                    if key == "text" {
                        if let Some(s) = value.as_str() {
                            text = s.to_string();
                        }
                    } else {
                        metadata.insert(key, qdrant_to_json(&value));
                    }
                }

                EmbeddingRecord {
                    id,
                    text,
                    metadata,
                    // Cosine score is a similarity; the contract wants a
                    // non-negative dissimilarity.
                    distance: 1.0 - point.score,
                }
            })
            .collect();

        Ok(records)
    }

    /// Delete a document; returns whether it existed
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let point_id = PointId::from(id.to_string());

        let existing = self
            .client
            .get_points(GetPointsBuilder::new(
                &self.collection,
                vec![point_id.clone()],
            ))
            .await?;

        if existing.result.is_empty() {
            return Ok(false);
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection).points(PointsIdsList {
                    ids: vec![point_id],
                }),
            )
            .await?;

        debug!("Deleted point {} from '{}'", id, self.collection);
        Ok(true)
    }

    /// Point count and configured dimension
    pub async fn stats(&self) -> Result<(u64, usize)> {
        let info = self.client.collection_info(&self.collection).await?;

        let points_count = info
            .result
            .map(|r| r.points_count.unwrap_or(0))
            .unwrap_or(0);

        Ok((points_count, self.dimension))
    }
}

/// Scalar filter conditions pushed down to Qdrant; list-valued filters are
/// applied by the wrapper after retrieval.
fn scalar_conditions(filter: &MetadataFilter) -> Vec<qdrant_client::qdrant::Condition> {
    let mut conditions = Vec::new();

    if let Some(ref message_type) = filter.message_type {
        conditions.push(
            FieldCondition {
                key: "message_type".to_string(),
                r#match: Some(Match {
                    match_value: Some(qdrant_client::qdrant::r#match::MatchValue::Keyword(
                        message_type.clone(),
                    )),
                }),
                ..Default::default()
            }
            .into(),
        );
    }

    if let Some(ref sender_id) = filter.sender_id {
        conditions.push(
            FieldCondition {
                key: "sender_id".to_string(),
                r#match: Some(Match {
                    match_value: Some(qdrant_client::qdrant::r#match::MatchValue::Keyword(
                        sender_id.clone(),
                    )),
                }),
                ..Default::default()
            }
            .into(),
        );
    }

    if filter.date_from.is_some() || filter.date_to.is_some() {
        conditions.push(
            FieldCondition {
                key: "timestamp_unix".to_string(),
                range: Some(Range {
                    gte: filter.date_from.map(|d| d.timestamp() as f64),
                    lte: filter.date_to.map(|d| d.timestamp() as f64),
                    ..Default::default()
                }),
                ..Default::default()
            }
            .into(),
        );
    }

    conditions
}

fn json_to_qdrant(value: &Value) -> QdrantValue {
    match value {
        Value::String(s) => s.clone().into(),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else {
                n.as_f64().unwrap_or(0.0).into()
            }
        }
        // Lists were coerced to strings upstream; anything else degrades to
        // its JSON text.
        other => other.to_string().into(),
    }
}

fn qdrant_to_json(value: &QdrantValue) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match &value.kind {
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::IntegerValue(i)) => Value::from(*i),
        Some(Kind::DoubleValue(d)) => Value::from(*d),
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        _ => Value::Null,
    }
}

trait QdrantValueExt {
    fn as_str(&self) -> Option<&str>;
}

impl QdrantValueExt for QdrantValue {
    fn as_str(&self) -> Option<&str> {
        match &self.kind {
            Some(qdrant_client::qdrant::value::Kind::StringValue(v)) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn json_to_qdrant_and_back_for_scalars() {
        let cases = vec![json!("hello"), json!(42), json!(0.75), json!(true)];

        for case in cases {
            let qdrant = json_to_qdrant(&case);
            assert_eq!(qdrant_to_json(&qdrant), case);
        }
    }

    #[test]
    fn json_to_qdrant_degrades_nested_values_to_text() {
        let nested = json!({"a": 1});
        let qdrant = json_to_qdrant(&nested);
        assert_eq!(QdrantValueExt::as_str(&qdrant), Some("{\"a\":1}"));
    }

    #[test]
    fn scalar_conditions_empty_filter() {
        let filter = MetadataFilter::new();
        assert!(scalar_conditions(&filter).is_empty());
    }

    #[test]
    fn scalar_conditions_include_equality_and_range() {
        let from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let filter = MetadataFilter::new()
            .message_type("text")
            .sender("alice")
            .date_range(Some(from), None);

        let conditions = scalar_conditions(&filter);
        assert_eq!(conditions.len(), 3);
    }

    #[test]
    fn scalar_conditions_skip_list_filters() {
        // Category filters are substring approximations applied after
        // retrieval, never pushed down.
        let filter = MetadataFilter::new().category("tech");
        assert!(scalar_conditions(&filter).is_empty());
    }
}
