//! Typed records for the data model: files, articles, chunks, and the
//! documents that persist them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An ingested file. Destroyed only via delete-by-file, which cascades to
/// all of its articles, article embeddings, and chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub file_id: String,
    pub filename: String,
    pub size: usize,
    pub chunk_count: usize,
    pub article_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One line of a document, the unit of reranked output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleMeta {
    pub article_id: String,
    pub file_id: String,
    pub title: String,
    pub offset: usize,
    pub length: usize,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A fixed-size sliding-window unit over a document's text, the unit of
/// dense recall. `chunk_id` is the position of its vector in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub chunk_id: usize,
    pub file_id: String,
    pub offset: usize,
    pub length: usize,
    pub text: String,
    pub article_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Persistent `chunk_id -> ChunkMeta` mapping, co-persisted with the
/// monotonic id counter. Invariant: `next_id == chunks.len()` and equal to
/// the index vector count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocMap {
    pub next_id: usize,
    pub chunks: HashMap<usize, ChunkMeta>,
}

/// The file and article half of the metadata repository, persisted as one
/// structured document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataSchema {
    pub files: HashMap<String, FileMeta>,
    pub articles: HashMap<String, ArticleMeta>,
}

/// Generate an opaque 128-bit hex id, used for both `file_id` and `article_id`.
pub fn new_hex_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_hex_id_is_32_hex_chars() {
        let id = new_hex_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_doc_map_default_is_empty() {
        let map = DocMap::default();
        assert_eq!(map.next_id, 0);
        assert!(map.chunks.is_empty());
    }
}
