//! The orchestrator (C11) wiring the vector index, chunk map, metadata
//! repository, and article embedding store into the ingestion and
//! delete-by-file transactions that cut across all four.

use crate::article_store::ArticleEmbeddingStore;
use crate::chunk_map::ChunkMapStore;
use crate::chunker::{char_offset_to_byte, intervals_overlap, split_into_articles, split_into_chunks};
use crate::config::AppConfig;
use crate::embedder::Embedder;
use crate::error::{RagError, Result};
use crate::metadata::MetadataRepository;
use crate::types::{new_hex_id, ArticleMeta, ChunkMeta, FileMeta};
use crate::vector_index::{FlatIpIndex, VectorIndex};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

pub struct KnowledgeStore {
    dim: usize,
    chunk_size: usize,
    chunk_overlap: usize,
    index: RwLock<FlatIpIndex>,
    index_path: PathBuf,
    chunk_map: RwLock<ChunkMapStore>,
    doc_map_path: PathBuf,
    metadata: RwLock<MetadataRepository>,
    articles: ArticleEmbeddingStore,
    embedder: Arc<dyn Embedder>,
    write_lock: Mutex<()>,
}

impl KnowledgeStore {
    pub fn open(config: &AppConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let index_path = PathBuf::from(&config.index.index_path);
        let doc_map_path = PathBuf::from(&config.index.doc_map_path);
        let metadata_path = PathBuf::from(&config.index.metadata_path);
        let article_embeddings_path = PathBuf::from(&config.index.article_embeddings_path);

        let index = FlatIpIndex::load_or_create(&index_path, config.index.dimension)?;
        let chunk_map = ChunkMapStore::load_or_create(&doc_map_path)?;
        let metadata = MetadataRepository::load_or_create(&metadata_path)?;
        let articles = ArticleEmbeddingStore::new(article_embeddings_path, config.index.dimension);

        if index.count() != chunk_map.next_id() {
            tracing::warn!(
                index_count = index.count(),
                next_id = chunk_map.next_id(),
                "vector index and chunk map out of sync on startup"
            );
        }

        Ok(Self {
            dim: config.index.dimension,
            chunk_size: config.ingestion.chunk_size,
            chunk_overlap: config.ingestion.chunk_overlap,
            index: RwLock::new(index),
            index_path,
            chunk_map: RwLock::new(chunk_map),
            doc_map_path,
            metadata: RwLock::new(metadata),
            articles,
            embedder,
            write_lock: Mutex::new(()),
        })
    }

    pub async fn list_files(&self) -> Vec<FileMeta> {
        self.metadata
            .read()
            .await
            .list_all_files()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn get_article(&self, article_id: &str) -> Option<ArticleMeta> {
        self.metadata.read().await.get_article(article_id).cloned()
    }

    pub async fn get_chunk_article_ids(&self, chunk_id: usize) -> Vec<String> {
        self.chunk_map
            .read()
            .await
            .get(chunk_id)
            .map(|c| c.article_ids.clone())
            .unwrap_or_default()
    }

    /// Coarse recall over the dense index (C1.search); used by the
    /// retrieval pipeline, which owns article expansion and rerank.
    pub async fn search_chunks(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        self.index.read().await.search(query, k).await
    }

    pub async fn article_embedding(&self, article_id: &str) -> Result<Option<Vec<f32>>> {
        self.articles.get(article_id).await
    }

    /// Ingestion Pipeline (C5): split, embed, and durably write a new file.
    pub async fn add_file(&self, filename: &str, content: &str) -> Result<FileMeta> {
        let _guard = self.write_lock.lock().await;

        // Step 1: duplicate check.
        {
            let metadata = self.metadata.read().await;
            if metadata.list_all_files().iter().any(|f| f.filename == filename) {
                return Err(RagError::Duplicate(filename.to_string()));
            }
        }

        // Step 2 + 3: split.
        let raw_chunks = split_into_chunks(content, self.chunk_size, self.chunk_overlap);
        let raw_articles = split_into_articles(content);

        let now = Utc::now();
        let file_id = new_hex_id();

        if raw_chunks.is_empty() {
            let file_meta = FileMeta {
                file_id,
                filename: filename.to_string(),
                size: content.len(),
                chunk_count: 0,
                article_ids: vec![],
                created_at: now,
            };
            let mut metadata = self.metadata.write().await;
            metadata.add_file(file_meta.clone());
            metadata.save().await?;
            return Ok(file_meta);
        }

        // Step 4: chunk embeddings.
        let chunk_texts: Vec<String> = raw_chunks.iter().map(|c| c.text.clone()).collect();
        let chunk_vectors = self
            .embedder
            .embed_batch(&chunk_texts)
            .await
            .map_err(|e| RagError::BackendError(format!("chunk embedding failed: {e}")))?;

        // Step 5: article embeddings (independent calls, per spec 4.5 step 5).
        let mut article_metas = Vec::with_capacity(raw_articles.len());
        let mut article_vectors = Vec::with_capacity(raw_articles.len());
        for article in &raw_articles {
            let article_id = new_hex_id();
            let vector = self
                .embedder
                .embed_one(&article.text)
                .await
                .map_err(|e| RagError::BackendError(format!("article embedding failed: {e}")))?;
            article_metas.push(ArticleMeta {
                article_id,
                file_id: file_id.clone(),
                title: article.title.clone(),
                offset: article.offset,
                length: article.length,
                text: article.text.clone(),
                created_at: now,
            });
            article_vectors.push(vector);
        }

        // Step 6: chunk <-> article alignment. Chunk offsets are characters,
        // article offsets are bytes (per the data model), so the chunk
        // interval is converted to bytes before comparing.
        let mut chunk_metas: Vec<ChunkMeta> = Vec::with_capacity(raw_chunks.len());
        for chunk in &raw_chunks {
            let ce = chunk.offset + chunk.length;
            let cs_bytes = char_offset_to_byte(content, chunk.offset);
            let ce_bytes = char_offset_to_byte(content, ce);
            let article_ids: Vec<String> = article_metas
                .iter()
                .filter(|a| intervals_overlap(cs_bytes, ce_bytes, a.offset, a.offset + a.length))
                .map(|a| a.article_id.clone())
                .collect();
            chunk_metas.push(ChunkMeta {
                chunk_id: 0, // assigned below once index positions are known
                file_id: file_id.clone(),
                offset: chunk.offset,
                length: chunk.length,
                text: chunk.text.clone(),
                article_ids,
                created_at: now,
            });
        }

        // Step 7a: append chunk vectors to C1, stamp ids, persist C1+C2.
        {
            let mut index = self.index.write().await;
            let mut chunk_map = self.chunk_map.write().await;

            let range = index.add(chunk_vectors).await?;
            for (meta, id) in chunk_metas.iter_mut().zip(range) {
                meta.chunk_id = id;
            }
            chunk_map.put_all(chunk_metas.clone());

            index.save(&self.index_path).await?;
            chunk_map.save().await?;
        }

        // Step 7b: persist FileMeta.
        let article_ids: Vec<String> = article_metas.iter().map(|a| a.article_id.clone()).collect();
        let file_meta = FileMeta {
            file_id: file_id.clone(),
            filename: filename.to_string(),
            size: content.len(),
            chunk_count: chunk_metas.len(),
            article_ids,
            created_at: now,
        };
        {
            let mut metadata = self.metadata.write().await;
            metadata.add_file(file_meta.clone());
            metadata.save().await?;
        }

        // Step 7c: persist each ArticleMeta, then its embedding.
        for (meta, vector) in article_metas.into_iter().zip(article_vectors) {
            let article_id = meta.article_id.clone();
            {
                let mut metadata = self.metadata.write().await;
                metadata.add_article(meta);
                metadata.save().await?;
            }
            self.articles.save(&article_id, vector).await?;
        }

        info!(
            file_id = %file_meta.file_id,
            filename,
            chunks = file_meta.chunk_count,
            articles = file_meta.article_ids.len(),
            "file ingested"
        );
        Ok(file_meta)
    }

    /// Delete-by-file: cascades to every article, article embedding, and
    /// chunk belonging to `file_id`, rebuilding the dense index in place.
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let file_meta = {
            let mut metadata = self.metadata.write().await;
            metadata.remove_file(file_id)?
        };

        {
            let mut chunk_map = self.chunk_map.write().await;
            let mut index = self.index.write().await;

            let mut keep_ids: Vec<usize> = (0..chunk_map.next_id())
                .filter(|id| {
                    chunk_map
                        .get(*id)
                        .map(|c| c.file_id != file_id)
                        .unwrap_or(false)
                })
                .collect();
            keep_ids.sort_unstable();

            if keep_ids.is_empty() {
                chunk_map.reset();
                *index = FlatIpIndex::new(self.dim);
            } else {
                let kept_metas: Vec<ChunkMeta> = keep_ids
                    .iter()
                    .map(|id| chunk_map.get(*id).expect("id was just enumerated").clone())
                    .collect();
                let relabel = index.rebuild_keeping(&keep_ids).await?;

                let mut new_chunks = std::collections::HashMap::with_capacity(kept_metas.len());
                for mut meta in kept_metas {
                    let new_id = *relabel.get(&meta.chunk_id).expect("relabel covers every kept id");
                    meta.chunk_id = new_id;
                    new_chunks.insert(new_id, meta);
                }
                chunk_map.replace(keep_ids.len(), new_chunks);
            }

            index.save(&self.index_path).await?;
            chunk_map.save().await?;
        }

        {
            let mut metadata = self.metadata.write().await;
            for article_id in &file_meta.article_ids {
                let _ = metadata.remove_article(article_id);
            }
            metadata.save().await?;
        }
        self.articles.delete_batch(&file_meta.article_ids).await?;

        info!(file_id, "file deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::fakes::FakeEmbedder;

    async fn new_test_store(dir: &std::path::Path) -> KnowledgeStore {
        let mut config = AppConfig::default();
        config.index.dimension = 8;
        config.index.index_path = dir.join("faiss.index").to_string_lossy().to_string();
        config.index.doc_map_path = dir.join("doc_map.json").to_string_lossy().to_string();
        config.index.metadata_path = dir.join("metadata.json").to_string_lossy().to_string();
        config.index.article_embeddings_path =
            dir.join("article_embeddings.npz").to_string_lossy().to_string();
        config.ingestion.chunk_size = 10;
        config.ingestion.chunk_overlap = 2;

        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder { dim: 8 });
        KnowledgeStore::open(&config, embedder).unwrap()
    }

    const LAW_TEXT: &str = "第一条 合同成立。\n第二条 合同生效。\n";

    #[tokio::test]
    async fn test_add_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_test_store(dir.path()).await;

        let file_meta = store.add_file("law.txt", LAW_TEXT).await.unwrap();
        assert!(file_meta.chunk_count >= 1);
        assert_eq!(file_meta.article_ids.len(), 2);

        let files = store.list_files().await;
        assert_eq!(files.len(), 1);

        let chunk_map = store.chunk_map.read().await;
        for id in 0..chunk_map.next_id() {
            let chunk = chunk_map.get(id).unwrap();
            assert_eq!(chunk.article_ids.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_duplicate_filename_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_test_store(dir.path()).await;

        store.add_file("x.txt", "hello world").await.unwrap();
        let err = store.add_file("x.txt", "other content").await.unwrap_err();
        assert!(matches!(err, RagError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_empty_content_is_a_no_op_add() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_test_store(dir.path()).await;

        let file_meta = store.add_file("empty.txt", "").await.unwrap();
        assert_eq!(file_meta.chunk_count, 0);
    }

    #[tokio::test]
    async fn test_delete_rebuild_preserves_remaining_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_test_store(dir.path()).await;

        let first = store.add_file("first.txt", LAW_TEXT).await.unwrap();
        let second = store.add_file("second.txt", "0123456789abcdefghij").await.unwrap();

        store.delete_file(&first.file_id).await.unwrap();

        let index = store.index.read().await;
        assert_eq!(index.count(), second.chunk_count);

        let chunk_map = store.chunk_map.read().await;
        for id in 0..chunk_map.next_id() {
            assert!(id < index.count());
        }
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_test_store(dir.path()).await;

        let file_meta = store.add_file("x.txt", "hello world").await.unwrap();
        store.delete_file(&file_meta.file_id).await.unwrap();
        let err = store.delete_file(&file_meta.file_id).await.unwrap_err();
        assert!(matches!(err, RagError::NotFound(_)));
    }
}
