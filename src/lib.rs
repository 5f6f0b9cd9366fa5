//! Message Vault Library
//!
//! This library provides tools to:
//! - Parse exported chat history files into discrete, timestamped messages
//! - Store messages and enrich them in the background with AI-derived
//!   categories, tags, sentiment, summaries and vector embeddings
//! - Serve hybrid (vector similarity + keyword overlap) search over the
//!   enriched corpus
//! - Fall back to a volatile in-memory vector store when Qdrant is down

pub mod analysis;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod metrics;
pub mod parser;
pub mod search;
pub mod service;
pub mod store;

// Re-export common types
pub use analysis::{EmbeddingService, EmbeddingStore, MessageClassifier, MessageType, MetadataFilter};
pub use config::Config;
pub use enrichment::EnrichmentWorker;
pub use error::{Error, Result};
pub use parser::{ChatExportParser, ParsedMessage};
pub use service::{MessageQuery, MessageService, SearchResponse};
pub use store::{MessageFilter, MessageRecord, MessageStore, NewMessage};
