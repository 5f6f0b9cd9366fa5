//! Configuration for the message vault
//!
//! Loads configuration from config.yml file

use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Default constants (fallback if config.yml not found)
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "datavault_messages";
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// YAML config structures
#[derive(Debug, Deserialize)]
struct YamlConfig {
    openai: Option<OpenAIConfig>,
    qdrant: Option<QdrantConfig>,
    metrics: Option<MetricsConfig>,
    search: Option<SearchConfig>,
}

#[derive(Debug, Deserialize)]
struct OpenAIConfig {
    model: Option<String>,
    embedding_model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct QdrantConfig {
    url: Option<String>,
    collection: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetricsConfig {
    addr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchConfig {
    default_limit: Option<usize>,
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_model: String,
    pub openai_max_tokens: u32,
    pub openai_temperature: f32,
    pub embedding_model: String,
    pub qdrant_url: String,
    pub qdrant_collection: String,
    pub metrics_addr: Option<String>,
    pub default_search_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Load configuration from config.yml or use defaults
    /// Environment variables take precedence over config.yml values
    pub fn new() -> Self {
        Self::load_from_file("config.yml")
            .or_else(|_| Self::load_from_file("../config.yml"))
            .unwrap_or_else(|_| Self::defaults())
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> Option<String> {
        // If value from YAML looks like ${...}, try env var
        if let Some(ref v) = value {
            if v.starts_with("${") && v.ends_with('}') {
                // Extract var name from ${VAR_NAME}
                let var_name = &v[2..v.len() - 1];
                if let Ok(env_val) = std::env::var(var_name) {
                    return Some(env_val);
                }
            }
        }
        // Also check explicit env_key as fallback
        if let Ok(env_val) = std::env::var(env_key) {
            return Some(env_val);
        }
        value
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        // Try to load from current directory first, then parent
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        // Load .env file first
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let yaml: YamlConfig = serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        let openai = yaml.openai.unwrap_or(OpenAIConfig {
            model: None,
            embedding_model: None,
            max_tokens: None,
            temperature: None,
        });

        let qdrant = yaml.qdrant.unwrap_or(QdrantConfig {
            url: None,
            collection: None,
        });

        let metrics = yaml.metrics.unwrap_or(MetricsConfig { addr: None });
        let search = yaml.search.unwrap_or(SearchConfig {
            default_limit: None,
        });

        // Resolve values with env var precedence
        let qdrant_url = Self::resolve_env_string(qdrant.url, "QDRANT_URL")
            .unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string());
        let metrics_addr = Self::resolve_env_string(metrics.addr, "METRICS_ADDR");

        Ok(Self {
            openai_model: openai
                .model
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_max_tokens: openai.max_tokens.unwrap_or(300),
            openai_temperature: openai.temperature.unwrap_or(0.3),
            embedding_model: openai
                .embedding_model
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            qdrant_url,
            qdrant_collection: qdrant
                .collection
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            metrics_addr,
            default_search_limit: search.default_limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
        })
    }

    /// Create config with compiled-in defaults (fallback)
    fn defaults() -> Self {
        Self {
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_max_tokens: 300,
            openai_temperature: 0.3,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            qdrant_url: std::env::var("QDRANT_URL")
                .unwrap_or_else(|_| DEFAULT_QDRANT_URL.to_string()),
            qdrant_collection: DEFAULT_COLLECTION.to_string(),
            metrics_addr: std::env::var("METRICS_ADDR").ok(),
            default_search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}
