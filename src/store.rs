//! Message store
//!
//! Durable-for-the-process record of messages with id-addressed CRUD and
//! filtered listing. Enrichment state lives here: `enriched` flips to true
//! exactly once per enrichment run, whether the run succeeded or failed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::analysis::models::{MessageAnalysis, MessageType};
use crate::error::{Error, Result};
use crate::parser::ParsedMessage;

/// A stored message with its enrichment state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Store-assigned identity
    pub id: i64,
    /// Message text content
    pub content: String,
    /// Content type
    pub message_type: MessageType,
    /// Sender display name
    pub sender_name: String,
    /// Stable sender identifier
    pub sender_id: String,
    /// Chat this message belongs to
    pub chat_label: String,
    /// Source-scoped message id (e.g. position within an imported file)
    pub source_message_id: String,
    /// Message timestamp
    pub timestamp: DateTime<Utc>,
    /// Record creation time
    pub created_at: DateTime<Utc>,
    /// AI-detected categories
    pub categories: Vec<String>,
    /// AI-generated tags
    pub tags: Vec<String>,
    /// Sentiment score (-1.0 to 1.0)
    pub sentiment: f32,
    /// AI-generated summary
    pub summary: String,
    /// Embedding store document reference; Some iff a vector was stored
    pub embedding_ref: Option<String>,
    /// Derived from embedding_ref at enrichment time
    pub has_embedding: bool,
    /// Terminal enrichment flag, set once per enrichment run
    pub enriched: bool,
    /// Failure description when enrichment ended in an error
    pub enrichment_error: Option<String>,
}

/// Fields required to create a message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub content: String,
    pub message_type: MessageType,
    pub sender_name: String,
    pub sender_id: String,
    pub chat_label: String,
    pub source_message_id: String,
    pub timestamp: DateTime<Utc>,
}

impl NewMessage {
    pub fn from_parsed(parsed: &ParsedMessage) -> Self {
        Self {
            content: parsed.body.clone(),
            message_type: parsed.message_type,
            sender_name: parsed.sender.clone(),
            sender_id: parsed.sender_id(),
            chat_label: parsed.chat_label.clone(),
            source_message_id: parsed.source_message_id(),
            timestamp: parsed.timestamp,
        }
    }
}

/// Filter for message listing
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    /// Match messages sharing at least one of these categories
    pub categories: Vec<String>,
    /// Match any of these types
    pub message_types: Vec<MessageType>,
    pub sender_id: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl MessageFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(&self, msg: &MessageRecord) -> bool {
        if !self.categories.is_empty()
            && !msg.categories.iter().any(|c| self.categories.contains(c))
        {
            return false;
        }
        if !self.message_types.is_empty() && !self.message_types.contains(&msg.message_type) {
            return false;
        }
        if let Some(ref sender_id) = self.sender_id {
            if &msg.sender_id != sender_id {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if msg.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if msg.timestamp > to {
                return false;
            }
        }
        true
    }
}

struct StoreInner {
    next_id: i64,
    messages: HashMap<i64, MessageRecord>,
}

/// In-process message store
pub struct MessageStore {
    inner: RwLock<StoreInner>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                next_id: 1,
                messages: HashMap::new(),
            }),
        }
    }

    /// Create a message record; enrichment fields start unset
    pub async fn create(&self, new: NewMessage) -> MessageRecord {
        let mut inner = self.inner.write().await;
        let id = inner.next_id;
        inner.next_id += 1;

        let record = MessageRecord {
            id,
            content: new.content,
            message_type: new.message_type,
            sender_name: new.sender_name,
            sender_id: new.sender_id,
            chat_label: new.chat_label,
            source_message_id: new.source_message_id,
            timestamp: new.timestamp,
            created_at: Utc::now(),
            categories: Vec::new(),
            tags: Vec::new(),
            sentiment: 0.0,
            summary: String::new(),
            embedding_ref: None,
            has_embedding: false,
            enriched: false,
            enrichment_error: None,
        };

        inner.messages.insert(id, record.clone());
        record
    }

    pub async fn get(&self, id: i64) -> Option<MessageRecord> {
        self.inner.read().await.messages.get(&id).cloned()
    }

    /// Apply a successful enrichment result in one update
    pub async fn update_enrichment(
        &self,
        id: i64,
        analysis: &MessageAnalysis,
        embedding_ref: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let msg = inner
            .messages
            .get_mut(&id)
            .ok_or(Error::MessageNotFound(id))?;

        msg.categories = analysis.categories.clone();
        msg.tags = analysis.tags.clone();
        msg.sentiment = analysis.sentiment;
        msg.summary = analysis.summary.clone();
        msg.has_embedding = embedding_ref.is_some();
        msg.embedding_ref = embedding_ref;
        msg.enriched = true;
        Ok(())
    }

    /// Record a failed enrichment; the message is still terminal
    pub async fn mark_enrichment_failed(&self, id: i64, error: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let msg = inner
            .messages
            .get_mut(&id)
            .ok_or(Error::MessageNotFound(id))?;

        msg.enrichment_error = Some(error.to_string());
        msg.enriched = true;
        Ok(())
    }

    /// Delete a message; returns false for an unknown id
    pub async fn delete(&self, id: i64) -> bool {
        self.inner.write().await.messages.remove(&id).is_some()
    }

    /// List messages matching the filter, newest first
    pub async fn list(&self, filter: &MessageFilter) -> Vec<MessageRecord> {
        let inner = self.inner.read().await;

        let mut matched: Vec<MessageRecord> = inner
            .messages
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        matched
            .into_iter()
            .skip(filter.skip)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.messages.len()
    }
}
