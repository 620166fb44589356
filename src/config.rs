//! Configuration management for the retrieval core

use serde::{Deserialize, Serialize};

/// Top-level configuration for the retrieval core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Vector index / dimension and artifact paths
    pub index: IndexConfig,

    /// Chunk and article splitting parameters
    pub ingestion: IngestionConfig,

    /// Recall, rerank and query-rewrite sampling parameters
    pub retrieval: RetrievalConfig,

    /// Embedder and generator backend configuration
    pub backend: BackendConfig,
}

/// Dimension and on-disk artifact paths for C1-C4
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Embedding dimension shared by chunk and article vectors
    pub dimension: usize,

    /// Path to the dense vector index file
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Path to the chunk map document
    #[serde(default = "default_doc_map_path")]
    pub doc_map_path: String,

    /// Path to the file/article metadata document
    #[serde(default = "default_metadata_path")]
    pub metadata_path: String,

    /// Path to the article embedding archive
    #[serde(default = "default_article_embeddings_path")]
    pub article_embeddings_path: String,
}

fn default_index_path() -> String {
    "faiss.index".to_string()
}

fn default_doc_map_path() -> String {
    "doc_map.json".to_string()
}

fn default_metadata_path() -> String {
    "metadata.json".to_string()
}

fn default_article_embeddings_path() -> String {
    "article_embeddings.npz".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: 512,
            index_path: default_index_path(),
            doc_map_path: default_doc_map_path(),
            metadata_path: default_metadata_path(),
            article_embeddings_path: default_article_embeddings_path(),
        }
    }
}

/// Chunk/article split parameters for the ingestion pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Sliding window size, in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Sliding window overlap, in characters; must satisfy `0 <= chunk_overlap < chunk_size`
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Retrieval pipeline and chat sampling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks recalled from the coarse stage
    #[serde(default = "default_top_k_retrieval")]
    pub top_k_retrieval: usize,

    /// Maximum number of articles returned after rerank
    #[serde(default = "default_max_retrieved_articles")]
    pub max_retrieved_articles: usize,

    /// Minimum top-article score below which a result is "low confidence"
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Sampling temperature used for the query-rewrite call
    #[serde(default = "default_rewrite_temperature")]
    pub rewrite_temperature: f32,

    /// Sampling top_p used for the query-rewrite call
    #[serde(default = "default_rewrite_top_p")]
    pub rewrite_top_p: f32,

    /// Max tokens for the query-rewrite call
    #[serde(default = "default_rewrite_max_tokens")]
    pub rewrite_max_tokens: u32,

    /// Sampling temperature used for answer generation
    #[serde(default = "default_chat_temperature")]
    pub chat_temperature: f32,

    /// Sampling top_p used for answer generation
    #[serde(default = "default_chat_top_p")]
    pub chat_top_p: f32,

    /// Max tokens for answer generation
    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_tokens: u32,
}

fn default_top_k_retrieval() -> usize {
    8
}

fn default_max_retrieved_articles() -> usize {
    5
}

fn default_similarity_threshold() -> f32 {
    0.5
}

fn default_rewrite_temperature() -> f32 {
    0.01
}

fn default_rewrite_top_p() -> f32 {
    0.1
}

fn default_rewrite_max_tokens() -> u32 {
    512
}

fn default_chat_temperature() -> f32 {
    0.3
}

fn default_chat_top_p() -> f32 {
    0.9
}

fn default_chat_max_tokens() -> u32 {
    1024
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_retrieval: default_top_k_retrieval(),
            max_retrieved_articles: default_max_retrieved_articles(),
            similarity_threshold: default_similarity_threshold(),
            rewrite_temperature: default_rewrite_temperature(),
            rewrite_top_p: default_rewrite_top_p(),
            rewrite_max_tokens: default_rewrite_max_tokens(),
            chat_temperature: default_chat_temperature(),
            chat_top_p: default_chat_top_p(),
            chat_max_tokens: default_chat_max_tokens(),
        }
    }
}

/// External collaborator configuration: embedder and generator backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the embedding backend
    pub embedder_base_url: String,

    /// Model identifier passed to the embedding backend
    #[serde(default = "default_embedder_model")]
    pub embedder_model: String,

    /// Base URL of the text-generation backend
    pub generator_base_url: String,

    /// Generation endpoint path, appended to `generator_base_url`
    #[serde(default = "default_generator_endpoint")]
    pub generator_endpoint: String,

    /// Request timeout, in seconds, applied to both backends
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_embedder_model() -> String {
    "default".to_string()
}

fn default_generator_endpoint() -> String {
    "/generate".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            embedder_base_url: "http://127.0.0.1:8081".to_string(),
            embedder_model: default_embedder_model(),
            generator_base_url: "http://127.0.0.1:8082".to_string(),
            generator_endpoint: default_generator_endpoint(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            ingestion: IngestionConfig::default(),
            retrieval: RetrievalConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a file; format is inferred from the extension
    /// (`json`, `toml`, `yaml`/`yml`).
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let config = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yml::from_str(&content)?,
            _ => return Err(anyhow::anyhow!("unsupported config file format")),
        };
        Ok(config)
    }

    /// Save configuration to a file; format is inferred from the extension.
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string(self)?,
            Some("yaml") | Some("yml") => serde_yml::to_string(self)?,
            _ => return Err(anyhow::anyhow!("unsupported config file format")),
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate cross-field invariants the `#[serde(default)]` machinery cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.index.dimension == 0 {
            return Err(anyhow::anyhow!("dimension must be greater than 0"));
        }

        if self.ingestion.chunk_overlap >= self.ingestion.chunk_size {
            return Err(anyhow::anyhow!(
                "chunk_overlap ({}) must be strictly less than chunk_size ({})",
                self.ingestion.chunk_overlap,
                self.ingestion.chunk_size
            ));
        }

        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(anyhow::anyhow!(
                "similarity_threshold must be between 0.0 and 1.0"
            ));
        }

        if self.retrieval.top_k_retrieval == 0 {
            return Err(anyhow::anyhow!("top_k_retrieval must be greater than 0"));
        }

        if self.retrieval.max_retrieved_articles == 0 {
            return Err(anyhow::anyhow!(
                "max_retrieved_articles must be greater than 0"
            ));
        }

        if self.backend.embedder_base_url.is_empty() {
            return Err(anyhow::anyhow!("embedder_base_url cannot be empty"));
        }

        if self.backend.generator_base_url.is_empty() {
            return Err(anyhow::anyhow!("generator_base_url cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chunk_overlap_equal_to_size_rejected() {
        let mut config = AppConfig::default();
        config.ingestion.chunk_size = 10;
        config.ingestion.chunk_overlap = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_overlap_one_less_than_size_accepted() {
        let mut config = AppConfig::default();
        config.ingestion.chunk_size = 10;
        config.ingestion.chunk_overlap = 9;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_similarity_threshold_out_of_range_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_trip_json() {
        let config = AppConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        config.to_file(&path).unwrap();
        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.index.dimension, config.index.dimension);
    }
}
