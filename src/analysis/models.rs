//! Data models for message analysis

use serde::{Deserialize, Serialize};

/// Fixed category taxonomy offered to the classifier. Anything outside it
/// collapses to the "uncategorized" fallback.
pub const CATEGORY_TAXONOMY: &[&str] = &[
    "crypto",
    "ai-tools",
    "news",
    "personal",
    "work",
    "entertainment",
    "finance",
    "tech",
    "health",
    "travel",
];

/// Fallback category label
pub const UNCATEGORIZED: &str = "uncategorized";

/// Message content type inferred at parse time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    Document,
    Link,
    Media,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Audio => "audio",
            MessageType::Document => "document",
            MessageType::Link => "link",
            MessageType::Media => "media",
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "video" => Ok(MessageType::Video),
            "audio" => Ok(MessageType::Audio),
            "document" => Ok(MessageType::Document),
            "link" => Ok(MessageType::Link),
            "media" => Ok(MessageType::Media),
            other => Err(crate::error::Error::InvalidArgument(format!(
                "unknown message type: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AI-derived metadata attached to a message during enrichment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageAnalysis {
    /// Up to 3 labels from the fixed taxonomy, or the uncategorized fallback
    pub categories: Vec<String>,
    /// Up to 5 free-form keywords
    pub tags: Vec<String>,
    /// Sentiment score in [-1.0, 1.0]
    pub sentiment: f32,
    /// Short summary, at most ~50 words
    pub summary: String,
}

impl MessageAnalysis {
    /// Degraded-but-valid result used whenever classification fails: the
    /// pipeline always has something to persist.
    pub fn degraded(content: &str) -> Self {
        Self {
            categories: vec![UNCATEGORIZED.to_string()],
            tags: Vec::new(),
            sentiment: 0.0,
            summary: truncate_summary(content),
        }
    }

    /// Clamp fields to their contractual bounds (≤3 categories, ≤5 tags,
    /// sentiment in [-1, 1]).
    pub fn normalized(mut self) -> Self {
        self.categories.truncate(3);
        if self.categories.is_empty() {
            self.categories.push(UNCATEGORIZED.to_string());
        }
        self.tags.truncate(5);
        self.sentiment = self.sentiment.clamp(-1.0, 1.0);
        self
    }
}

/// Truncated-content summary for the degraded path
pub fn truncate_summary(content: &str) -> String {
    const MAX: usize = 100;
    let count = content.chars().count();
    if count > MAX {
        let cut: String = content.chars().take(MAX).collect();
        format!("{}...", cut)
    } else {
        content.to_string()
    }
}

/// Frequency-ranked category labels across a result set
pub fn suggest_categories<'a, I>(category_lists: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Vec<String>>,
{
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for list in category_lists {
        for cat in list {
            *counts.entry(cat.as_str()).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(5).map(|(c, _)| c.to_string()).collect()
}
