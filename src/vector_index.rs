//! Dense vector index (C1): a contiguous array of L2-normalized vectors
//! searchable by inner product, keyed by monotonically increasing chunk-id.

use crate::error::{RagError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

const MAGIC: u32 = 0x5241_4756; // "RAGV"
const FORMAT_VERSION: u16 = 1;

/// Zero-vector guard, matching the reference implementation's normalization epsilon.
const NORM_EPSILON: f32 = 1e-12;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Configured dimension `D`.
    fn dim(&self) -> usize;

    /// Append `vectors` (each normalized in place), returning the assigned id range.
    async fn add(&mut self, vectors: Vec<Vec<f32>>) -> Result<std::ops::Range<usize>>;

    /// Ordered `(chunk_id, score)` pairs, length <= k, sorted by score descending,
    /// ties broken by lower chunk_id.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>>;

    /// Rebuild the index to contain exactly the vectors at `ids` (ascending),
    /// returning the `old_id -> new_id` relabeling map. Always succeeds in place.
    async fn rebuild_keeping(&mut self, ids: &[usize]) -> Result<HashMap<usize, usize>>;

    /// Current vector count `N`.
    fn count(&self) -> usize;

    /// Atomically persist the index to `path`.
    async fn save(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    magic: u32,
    version: u16,
    dim: u32,
    vectors: Vec<f32>,
}

/// Brute-force flat inner-product index. The whole vector array lives in
/// memory, row-major, and search is a linear scan; this matches the "flat
/// IP over float32[N x D]" contract without linking a third-party ANN library.
pub struct FlatIpIndex {
    dim: usize,
    vectors: Vec<f32>,
}

fn normalize_in_place(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    let norm = norm_sq.sqrt();
    let denom = if norm == 0.0 { NORM_EPSILON } else { norm };
    for x in v.iter_mut() {
        *x /= denom;
    }
}

impl FlatIpIndex {
    /// Construct a fresh, empty index for the given dimension.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: Vec::new(),
        }
    }

    fn row(&self, id: usize) -> &[f32] {
        &self.vectors[id * self.dim..(id + 1) * self.dim]
    }

    /// Load the index from `path`, or create an empty one if the file does
    /// not exist. A corrupt file is backed up with a `.corrupt.<unix-ts>`
    /// suffix and replaced by a fresh empty index; the decision is logged.
    pub fn load_or_create(path: &Path, dim: usize) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new(dim));
        }

        let bytes = std::fs::read(path)?;
        match bincode::deserialize::<IndexFile>(&bytes) {
            Ok(file) if file.magic == MAGIC && file.version == FORMAT_VERSION => {
                if file.dim as usize != dim {
                    warn!(
                        path = %path.display(),
                        expected = dim,
                        found = file.dim,
                        "vector index dimension mismatch on load, resetting"
                    );
                    return Self::reset_corrupt(path, dim, "dimension mismatch");
                }
                Ok(Self {
                    dim,
                    vectors: file.vectors,
                })
            }
            Ok(_) => Self::reset_corrupt(path, dim, "magic or version mismatch"),
            Err(e) => Self::reset_corrupt(path, dim, &e.to_string()),
        }
    }

    fn reset_corrupt(path: &Path, dim: usize, reason: &str) -> Result<Self> {
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
            reason,
            "vector index corrupted on load, backed up and reinitialized"
        );
        Ok(Self::new(dim))
    }
}

#[async_trait]
impl VectorIndex for FlatIpIndex {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn add(&mut self, mut vectors: Vec<Vec<f32>>) -> Result<std::ops::Range<usize>> {
        let row_len = vectors.first().map(|r| r.len());
        if let Some(len) = row_len {
            if vectors.iter().any(|r| r.len() != len) {
                return Err(RagError::ShapeError(
                    "vectors must be a rectangular 2D array".to_string(),
                ));
            }
            if len != self.dim {
                return Err(RagError::DimensionMismatch {
                    expected: self.dim,
                    actual: len,
                });
            }
        }

        let start = self.count();
        for row in vectors.iter_mut() {
            normalize_in_place(row);
            self.vectors.extend_from_slice(row);
        }
        let end = self.count();
        Ok(start..end)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dim {
            return Err(RagError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }
        let mut q = query.to_vec();
        normalize_in_place(&mut q);

        let mut scored: Vec<(usize, f32)> = (0..self.count())
            .map(|id| {
                let row = self.row(id);
                let score: f32 = row.iter().zip(q.iter()).map(|(a, b)| a * b).sum();
                (id, score)
            })
            .collect();

        scored.sort_by(|a, b| match b.1.partial_cmp(&a.1).unwrap() {
            std::cmp::Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn rebuild_keeping(&mut self, ids: &[usize]) -> Result<HashMap<usize, usize>> {
        let mut new_vectors = Vec::with_capacity(ids.len() * self.dim);
        let mut relabel = HashMap::with_capacity(ids.len());
        for (new_id, &old_id) in ids.iter().enumerate() {
            new_vectors.extend_from_slice(self.row(old_id));
            relabel.insert(old_id, new_id);
        }
        self.vectors = new_vectors;
        Ok(relabel)
    }

    fn count(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.vectors.len() / self.dim
        }
    }

    async fn save(&self, path: &Path) -> Result<()> {
        let file = IndexFile {
            magic: MAGIC,
            version: FORMAT_VERSION,
            dim: self.dim as u32,
            vectors: self.vectors.clone(),
        };
        let bytes = bincode::serialize(&file)
            .map_err(|e| RagError::BackendError(format!("failed to encode vector index: {e}")))?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        use std::io::Write;
        tmp.write_all(&bytes)?;
        tmp.persist(path)
            .map_err(|e| RagError::IoFailure(e.error))?;
        info!(path = %path.display(), vectors = self.count(), "vector index persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_and_search() {
        let mut idx = FlatIpIndex::new(3);
        let range = idx.add(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]).await.unwrap();
        assert_eq!(range, 0..2);
        assert_eq!(idx.count(), 2);

        let results = idx.search(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(results[0].0, 0);
        assert!((results[0].1 - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let mut idx = FlatIpIndex::new(3);
        let err = idx.add(vec![vec![1.0, 0.0]]).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_ragged_input_rejected() {
        let mut idx = FlatIpIndex::new(3);
        let err = idx
            .add(vec![vec![1.0, 0.0, 0.0], vec![1.0, 0.0]])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ShapeError(_)));
    }

    #[tokio::test]
    async fn test_rebuild_keeping_relabels_and_drops() {
        let mut idx = FlatIpIndex::new(2);
        idx.add(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]])
            .await
            .unwrap();
        let relabel = idx.rebuild_keeping(&[0, 2]).await.unwrap();
        assert_eq!(idx.count(), 2);
        assert_eq!(relabel.get(&0), Some(&0));
        assert_eq!(relabel.get(&2), Some(&1));
        assert_eq!(relabel.get(&1), None);
    }

    #[tokio::test]
    async fn test_zero_vector_normalizes_to_zero() {
        let mut idx = FlatIpIndex::new(2);
        idx.add(vec![vec![0.0, 0.0]]).await.unwrap();
        let results = idx.search(&[0.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].1, 0.0);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faiss.index");

        let mut idx = FlatIpIndex::new(3);
        idx.add(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]).await.unwrap();
        idx.save(&path).await.unwrap();

        let loaded = FlatIpIndex::load_or_create(&path, 3).unwrap();
        assert_eq!(loaded.count(), 2);
    }

    #[test]
    fn test_corrupt_file_backed_up_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faiss.index");
        std::fs::write(&path, b"not a valid index file").unwrap();

        let idx = FlatIpIndex::load_or_create(&path, 3).unwrap();
        assert_eq!(idx.count(), 0);

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("corrupt"))
            .collect();
        assert_eq!(backups.len(), 1);
    }
}
