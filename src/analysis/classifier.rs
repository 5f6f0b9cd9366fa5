//! AI message classification via the OpenAI chat completions API
//!
//! The classifier is a capability boundary: `analyze` never fails. Any
//! internal error — network, HTTP status, malformed JSON — degrades to an
//! uncategorized/neutral/truncated-summary result so the enrichment
//! pipeline always has metadata to persist.

use std::env;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::models::{MessageAnalysis, MessageType, CATEGORY_TAXONOMY};
use crate::config::Config;
use crate::{Error, Result};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI-backed message classifier
#[derive(Debug, Clone)]
pub struct MessageClassifier {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl MessageClassifier {
    /// Create classifier from environment variable and config
    pub fn from_env(config: &Config) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| Error::InvalidArgument("OPENAI_API_KEY not set".to_string()))?;
        Self::new(api_key, config)
    }

    /// Create classifier with API key
    pub fn new<S: Into<String>>(api_key: S, config: &Config) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::InvalidArgument("OPENAI_API_KEY is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent("datavault/0.1.0")
            .build()
            .map_err(|e| Error::InvalidArgument(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: OPENAI_API_URL.to_string(),
            model: config.openai_model.clone(),
            temperature: config.openai_temperature,
            max_tokens: config.openai_max_tokens,
        })
    }

    /// Create against a custom API base URL (mock servers in tests)
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        config: &Config,
    ) -> Result<Self> {
        let mut classifier = Self::new(api_key, config)?;
        classifier.base_url = base_url.into();
        Ok(classifier)
    }

    /// Analyze message content: categories, tags, sentiment, summary.
    ///
    /// Infallible by contract — failures degrade to
    /// `MessageAnalysis::degraded` and are only surfaced in the log.
    pub async fn analyze(&self, content: &str, message_type: MessageType) -> MessageAnalysis {
        match self.request_analysis(content, message_type).await {
            Ok(analysis) => analysis.normalized(),
            Err(err) => {
                warn!("AI analysis failed, using degraded result: {}", err);
                MessageAnalysis::degraded(content)
            }
        }
    }

    async fn request_analysis(
        &self,
        content: &str,
        message_type: MessageType,
    ) -> Result<MessageAnalysis> {
        let prompt = analysis_prompt(content, message_type);

        let response = self
            .chat_completion(vec![ChatMessage {
                role: "user".to_string(),
                content: Some(prompt),
            }])
            .await?;

        let json_text = extract_json(&response);
        let analysis: MessageAnalysis = serde_json::from_str(json_text)
            .map_err(|e| Error::OpenAiError(format!("Invalid analysis JSON: {}", e)))?;

        debug!(
            "Classified message: {:?} / {} tags",
            analysis.categories,
            analysis.tags.len()
        );
        Ok(analysis)
    }

    /// Answer a question over retrieved message context
    pub async fn answer(&self, query: &str, context: &str) -> Result<String> {
        let prompt = format!(
            "Based on the following message history, answer the user's question \
             comprehensively.\n\n\
             Message History:\n{}\n\n\
             User Question: {}\n\n\
             Provide a detailed answer based on the available information. If you \
             can't find specific information, mention what's available and suggest \
             what might be helpful to know.",
            context, query
        );

        self.chat_completion(vec![ChatMessage {
            role: "user".to_string(),
            content: Some(prompt),
        }])
        .await
    }

    /// Chat completion against the configured endpoint
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::OpenAiError(format!("Request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::OpenAiError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::OpenAiError(format!("OpenAI error {}: {}", status, text)));
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| Error::OpenAiError(format!("Invalid response: {}", e)))?;

        chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| Error::OpenAiError("Empty response from OpenAI".to_string()))
    }
}

fn analysis_prompt(content: &str, message_type: MessageType) -> String {
    format!(
        "Analyze this message content and provide:\n\
         1. Categories (max 3): {}\n\
         2. Tags (max 5): specific keywords or topics\n\
         3. Sentiment score (-1 to 1): negative to positive\n\
         4. Brief summary (max 50 words)\n\n\
         Message: \"{}\"\n\
         Message type: {}\n\n\
         Respond in JSON format:\n\
         {{\n\
             \"categories\": [\"category1\", \"category2\"],\n\
             \"tags\": [\"tag1\", \"tag2\", \"tag3\"],\n\
             \"sentiment\": 0.5,\n\
             \"summary\": \"Brief summary here\"\n\
         }}",
        CATEGORY_TAXONOMY.join(", "),
        content,
        message_type
    )
}

/// Strip markdown code fences the model sometimes wraps JSON in
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::models::UNCATEGORIZED;

    fn test_config() -> Config {
        Config::new()
    }

    #[test]
    fn new_rejects_empty_api_key() {
        let config = test_config();
        assert!(MessageClassifier::new("", &config).is_err());
        assert!(MessageClassifier::new("   ", &config).is_err());
    }

    #[test]
    fn new_accepts_key_and_config_values() {
        let config = test_config();
        let classifier = MessageClassifier::new("test_key", &config).unwrap();

        assert_eq!(classifier.model, config.openai_model);
        assert_eq!(classifier.base_url, OPENAI_API_URL);
    }

    #[test]
    fn with_base_url_overrides_endpoint() {
        let config = test_config();
        let classifier =
            MessageClassifier::with_base_url("test_key", "http://localhost:9/v1", &config).unwrap();

        assert_eq!(classifier.base_url, "http://localhost:9/v1");
    }

    #[test]
    fn extract_json_passes_plain_json() {
        let text = r#"{"categories": []}"#;
        assert_eq!(extract_json(text), text);
    }

    #[test]
    fn extract_json_strips_fences() {
        let fenced = "```json\n{\"sentiment\": 0.1}\n```";
        assert_eq!(extract_json(fenced), "{\"sentiment\": 0.1}");

        let bare_fence = "```\n{\"sentiment\": 0.1}\n```";
        assert_eq!(extract_json(bare_fence), "{\"sentiment\": 0.1}");
    }

    #[test]
    fn analysis_prompt_mentions_taxonomy_and_type() {
        let prompt = analysis_prompt("hello", MessageType::Link);

        assert!(prompt.contains("crypto"));
        assert!(prompt.contains("travel"));
        assert!(prompt.contains("Message type: link"));
        assert!(prompt.contains("\"hello\""));
    }

    #[tokio::test]
    async fn analyze_degrades_on_unreachable_endpoint() {
        let config = test_config();
        let classifier =
            MessageClassifier::with_base_url("test_key", "http://127.0.0.1:1/v1", &config).unwrap();

        let analysis = classifier
            .analyze("the market looks great today", MessageType::Text)
            .await;

        assert_eq!(analysis.categories, vec![UNCATEGORIZED.to_string()]);
        assert!(analysis.tags.is_empty());
        assert_eq!(analysis.sentiment, 0.0);
        assert_eq!(analysis.summary, "the market looks great today");
    }

    #[test]
    fn chat_request_serializes_expected_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some("hi".to_string()),
            }],
            temperature: 0.3,
            max_tokens: 300,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"model\":\"gpt-4o-mini\""));
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"max_tokens\":300"));
    }

    #[test]
    fn chat_response_deserializes() {
        let json = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "answer"}, "finish_reason": "stop"}
            ]
        }"#;

        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some("answer")
        );
    }
}
