//! Embedding generation service using OpenAI

use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client as OpenAIClient,
};
use tracing::{debug, info, warn};

/// Service for generating text embeddings
pub struct EmbeddingService {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
}

impl EmbeddingService {
    /// Create a new embedding service
    pub fn new() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let config = OpenAIConfig::new().with_api_key(api_key);
        let client = OpenAIClient::with_config(config);

        Ok(Self {
            client,
            model: "text-embedding-3-small".to_string(),
        })
    }

    /// Create with custom model
    pub fn with_model(model: impl Into<String>) -> Result<Self> {
        let mut service = Self::new()?;
        service.model = model.into();
        Ok(service)
    }

    /// Create against a custom API base URL (mock servers in tests)
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key.into())
            .with_api_base(base_url.into());

        Self {
            client: OpenAIClient::with_config(config),
            model: "text-embedding-3-small".to_string(),
        }
    }

    /// Generate embedding for a single text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }

    /// Generate an embedding, absorbing failure into an empty vector.
    ///
    /// This is the capability boundary the enrichment pipeline calls: an
    /// empty result signals "no embedding available" and nothing propagates
    /// past it.
    pub async fn embed_or_empty(&self, text: &str) -> Vec<f32> {
        match self.embed(text).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!("Embedding generation failed: {}", err);
                Vec::new()
            }
        }
    }

    /// Generate embeddings for multiple texts in batch
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        // Filter out empty texts and truncate long ones
        let processed: Vec<String> = texts
            .iter()
            .map(|t| {
                let trimmed = t.trim();
                if trimmed.len() > 8000 {
                    let cut = trimmed
                        .char_indices()
                        .take_while(|(idx, _)| *idx < 8000)
                        .last()
                        .map(|(idx, c)| idx + c.len_utf8())
                        .unwrap_or(0);
                    trimmed[..cut].to_string()
                } else {
                    trimmed.to_string()
                }
            })
            .filter(|t| !t.is_empty())
            .collect();

        if processed.is_empty() {
            return Ok(vec![Vec::new(); texts.len()]);
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(processed.clone()))
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        info!(
            "Generated {} embeddings, tokens used: {}",
            response.data.len(),
            response.usage.total_tokens
        );

        // Map back to original indices (empty texts get empty vectors)
        let mut result = Vec::with_capacity(texts.len());
        let mut embed_iter = response.data.into_iter();

        for text in texts {
            if text.trim().is_empty() {
                result.push(Vec::new());
            } else if let Some(embed) = embed_iter.next() {
                result.push(embed.embedding);
            }
        }

        Ok(result)
    }

    /// Get the embedding dimension for the current model
    pub fn dimension(&self) -> usize {
        match self.model.as_str() {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536, // default
        }
    }
}
