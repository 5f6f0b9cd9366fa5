//! Message analysis module
//!
//! Provides tools for:
//! - Classifying messages with AI (categories, tags, sentiment, summary)
//! - Generating embeddings for messages using OpenAI
//! - Storing embeddings in Qdrant, with a volatile in-memory fallback

pub mod classifier;
pub mod embeddings;
pub mod memory_db;
pub mod models;
pub mod store;
pub mod vector_db;

pub use classifier::MessageClassifier;
pub use embeddings::EmbeddingService;
pub use models::{MessageAnalysis, MessageType};
pub use store::{EmbeddingRecord, EmbeddingStore, MetadataFilter};
