//! Retrieval core of a RAG knowledge service.
//!
//! Ingests plain-text documents, decomposes them into chunks (dense
//! recall units) and articles (reranked output units), embeds and
//! persists them durably, and serves nearest-neighbor search joined to a
//! two-tier rerank. The embedding model and text-generation backend are
//! external collaborators reached over HTTP; the HTTP boundary,
//! configuration, and logging are ambient infrastructure around that
//! core.
//!
//! # Example
//!
//! ```rust,no_run
//! use ragcore::config::AppConfig;
//! use ragcore::embedder::{Embedder, HttpEmbedder};
//! use ragcore::store::KnowledgeStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     config.validate()?;
//!
//!     let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(
//!         config.backend.embedder_base_url.clone(),
//!         config.backend.embedder_model.clone(),
//!         std::time::Duration::from_secs(config.backend.request_timeout_secs),
//!     )?);
//!     let store = KnowledgeStore::open(&config, embedder)?;
//!     let _ = store.list_files().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod article_store;
pub mod chunk_map;
pub mod chunker;
pub mod config;
pub mod embedder;
pub mod error;
pub mod generator;
pub mod metadata;
pub mod retrieval;
pub mod rewriter;
pub mod store;
pub mod types;
pub mod vector_index;

pub use config::AppConfig;
pub use error::{RagError, Result};
pub use store::KnowledgeStore;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with(char::is_numeric));
    }
}
