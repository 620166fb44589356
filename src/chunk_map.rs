//! Chunk map (C2): the persistent `chunk_id -> ChunkMeta` mapping. The
//! index never stores text; this is the source of truth for what a vector
//! position means.

use crate::error::Result;
use crate::types::{ChunkMeta, DocMap};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct ChunkMapStore {
    path: PathBuf,
    map: DocMap,
}

impl ChunkMapStore {
    /// Load the chunk map from `path`, or create an empty one if absent.
    /// A corrupt file is backed up with a `.corrupt.<unix-ts>` suffix and
    /// replaced with an empty map; the decision is logged.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                map: DocMap::default(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<DocMap>(&content) {
            Ok(map) => Ok(Self {
                path: path.to_path_buf(),
                map,
            }),
            Err(e) => {
                let ts = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                let backup = path.with_file_name(format!(
                    "{}.corrupt.{ts}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                ));
                std::fs::rename(path, &backup)?;
                warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    reason = %e,
                    "chunk map corrupted on load, backed up and reinitialized"
                );
                Ok(Self {
                    path: path.to_path_buf(),
                    map: DocMap::default(),
                })
            }
        }
    }

    pub fn get(&self, chunk_id: usize) -> Option<&ChunkMeta> {
        self.map.chunks.get(&chunk_id)
    }

    pub fn next_id(&self) -> usize {
        self.map.next_id
    }

    pub fn count(&self) -> usize {
        self.map.chunks.len()
    }

    /// Insert freshly assigned chunks, advancing `next_id` to match.
    pub fn put_all(&mut self, chunks: Vec<ChunkMeta>) {
        for chunk in chunks {
            self.map.next_id = self.map.next_id.max(chunk.chunk_id + 1);
            self.map.chunks.insert(chunk.chunk_id, chunk);
        }
    }

    /// Replace the whole map, used after a delete-triggered rebuild.
    pub fn replace(&mut self, next_id: usize, chunks: std::collections::HashMap<usize, ChunkMeta>) {
        self.map = DocMap { next_id, chunks };
    }

    pub fn reset(&mut self) {
        self.map = DocMap::default();
    }

    /// Atomically persist the map via write-tmp + rename.
    pub async fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.map)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        use std::io::Write;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(&self.path)
            .map_err(|e| crate::error::RagError::IoFailure(e.error))?;
        info!(path = %self.path.display(), chunks = self.count(), "chunk map persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_chunk(id: usize, file_id: &str) -> ChunkMeta {
        ChunkMeta {
            chunk_id: id,
            file_id: file_id.to_string(),
            offset: 0,
            length: 10,
            text: "hello".to_string(),
            article_ids: vec![],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_put_all_advances_next_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc_map.json");
        let mut store = ChunkMapStore::load_or_create(&path).unwrap();
        store.put_all(vec![sample_chunk(0, "f1"), sample_chunk(1, "f1")]);
        assert_eq!(store.next_id(), 2);
        assert_eq!(store.count(), 2);
    }

    #[tokio::test]
    async fn test_save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc_map.json");
        let mut store = ChunkMapStore::load_or_create(&path).unwrap();
        store.put_all(vec![sample_chunk(0, "f1")]);
        store.save().await.unwrap();

        let reloaded = ChunkMapStore::load_or_create(&path).unwrap();
        assert_eq!(reloaded.count(), 1);
        assert_eq!(reloaded.get(0).unwrap().file_id, "f1");
    }

    #[test]
    fn test_corrupt_doc_map_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc_map.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = ChunkMapStore::load_or_create(&path).unwrap();
        assert_eq!(store.count(), 0);

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("corrupt"))
            .collect();
        assert_eq!(backups.len(), 1);
    }
}
