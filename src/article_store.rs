//! Article embedding store (C3): a persistent `article_id -> vector`
//! mapping, rewritten wholesale on every mutation under an exclusive lock.
//! Rewritten only on ingest/delete, which are infrequent, so full-archive
//! read-modify-write is an acceptable cost (see the embedding-archive Open
//! Question).

use crate::error::{RagError, Result};
use ndarray::Array1;
use ndarray_npy::{NpzReader, NpzWriter};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct ArticleEmbeddingStore {
    path: PathBuf,
    dim: usize,
    lock: Mutex<()>,
}

impl ArticleEmbeddingStore {
    pub fn new(path: PathBuf, dim: usize) -> Self {
        Self {
            path,
            dim,
            lock: Mutex::new(()),
        }
    }

    fn load_all(&self) -> Result<HashMap<String, Vec<f32>>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let file = std::fs::File::open(&self.path)?;
        let mut reader = match NpzReader::new(file) {
            Ok(r) => r,
            Err(e) => return self.reset_corrupt(&e.to_string()),
        };

        let names = match reader.names() {
            Ok(n) => n,
            Err(e) => return self.reset_corrupt(&e.to_string()),
        };

        let mut out = HashMap::with_capacity(names.len());
        for name in names {
            let array: Array1<f32> = match reader.by_name(name.as_str()) {
                Ok(a) => a,
                Err(e) => return self.reset_corrupt(&e.to_string()),
            };
            out.insert(name, array.into_raw_vec());
        }
        Ok(out)
    }

    fn reset_corrupt(&self, reason: &str) -> Result<HashMap<String, Vec<f32>>> {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let backup = self.path.with_file_name(format!(
            "{}.corrupt.{ts}",
            self.path.file_name().unwrap_or_default().to_string_lossy()
        ));
        std::fs::rename(&self.path, &backup)?;
        warn!(
            path = %self.path.display(),
            backup = %backup.display(),
            reason,
            "article embedding archive corrupted on load, backed up and reinitialized"
        );
        Ok(HashMap::new())
    }

    fn save_all(&self, data: &HashMap<String, Vec<f32>>) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = NpzWriter::new_compressed(tmp.reopen()?);
            for (name, vector) in data.iter() {
                let array = Array1::from_vec(vector.clone());
                writer
                    .add_array(name, &array)
                    .map_err(|e| RagError::BackendError(format!("npz write failed: {e}")))?;
            }
            writer
                .finish()
                .map_err(|e| RagError::BackendError(format!("npz finalize failed: {e}")))?;
        }
        tmp.persist(&self.path)
            .map_err(|e| RagError::IoFailure(e.error))?;
        info!(path = %self.path.display(), count = data.len(), "article embeddings persisted");
        Ok(())
    }

    pub async fn get(&self, article_id: &str) -> Result<Option<Vec<f32>>> {
        let all = self.load_all()?;
        Ok(all.get(article_id).cloned())
    }

    pub async fn get_batch(&self, article_ids: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        let all = self.load_all()?;
        Ok(article_ids
            .iter()
            .filter_map(|id| all.get(id).map(|v| (id.clone(), v.clone())))
            .collect())
    }

    pub async fn save(&self, article_id: &str, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dim {
            return Err(RagError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        let _guard = self.lock.lock().await;
        let mut all = self.load_all()?;
        all.insert(article_id.to_string(), vector);
        self.save_all(&all)
    }

    pub async fn save_batch(&self, items: Vec<(String, Vec<f32>)>) -> Result<()> {
        for (_, v) in items.iter() {
            if v.len() != self.dim {
                return Err(RagError::DimensionMismatch {
                    expected: self.dim,
                    actual: v.len(),
                });
            }
        }
        let _guard = self.lock.lock().await;
        let mut all = self.load_all()?;
        for (id, vector) in items {
            all.insert(id, vector);
        }
        self.save_all(&all)
    }

    pub async fn delete(&self, article_id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut all = self.load_all()?;
        all.remove(article_id);
        self.save_all(&all)
    }

    pub async fn delete_batch(&self, article_ids: &[String]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut all = self.load_all()?;
        for id in article_ids {
            all.remove(id);
        }
        self.save_all(&all)
    }

    pub async fn exists(&self, article_id: &str) -> Result<bool> {
        let all = self.load_all()?;
        Ok(all.contains_key(article_id))
    }

    pub async fn count(&self) -> Result<usize> {
        let all = self.load_all()?;
        Ok(all.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("article_embeddings.npz");
        let store = ArticleEmbeddingStore::new(path, 3);

        store.save("a1", vec![1.0, 2.0, 3.0]).await.unwrap();
        let v = store.get("a1").await.unwrap();
        assert_eq!(v, Some(vec![1.0, 2.0, 3.0]));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("article_embeddings.npz");
        let store = ArticleEmbeddingStore::new(path, 3);

        let err = store.save("a1", vec![1.0, 2.0]).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("article_embeddings.npz");
        let store = ArticleEmbeddingStore::new(path, 3);

        store.save("a1", vec![1.0, 2.0, 3.0]).await.unwrap();
        store.delete("a1").await.unwrap();
        store.delete("a1").await.unwrap();
        assert!(!store.exists("a1").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_batch_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("article_embeddings.npz");
        let store = ArticleEmbeddingStore::new(path, 2);

        store.save("a1", vec![1.0, 0.0]).await.unwrap();
        let batch = store
            .get_batch(&["a1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch.contains_key("a1"));
    }
}
