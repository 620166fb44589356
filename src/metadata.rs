//! Metadata repository (C4): files and articles, persisted as one
//! structured document with referential integrity enforced by callers
//! (the ingestion pipeline owns filename-uniqueness checks).

use crate::error::{RagError, Result};
use crate::types::{ArticleMeta, FileMeta, MetadataSchema};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct MetadataRepository {
    path: PathBuf,
    data: MetadataSchema,
}

impl MetadataRepository {
    /// Load the metadata document from `path`, or create an empty one if
    /// absent. A corrupt file is backed up with a `.corrupt.<unix-ts>`
    /// suffix and replaced with an empty document; the decision is logged.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                data: MetadataSchema::default(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<MetadataSchema>(&content) {
            Ok(data) => Ok(Self {
                path: path.to_path_buf(),
                data,
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
                    "metadata repository corrupted on load, backed up and reinitialized"
                );
                Ok(Self {
                    path: path.to_path_buf(),
                    data: MetadataSchema::default(),
                })
            }
        }
    }

    pub fn list_all_files(&self) -> Vec<&FileMeta> {
        self.data.files.values().collect()
    }

    pub fn get_file(&self, file_id: &str) -> Option<&FileMeta> {
        self.data.files.get(file_id)
    }

    pub fn add_file(&mut self, file: FileMeta) {
        self.data.files.insert(file.file_id.clone(), file);
    }

    pub fn remove_file(&mut self, file_id: &str) -> Result<FileMeta> {
        self.data
            .files
            .remove(file_id)
            .ok_or_else(|| RagError::NotFound(format!("file {file_id} not found")))
    }

    pub fn list_all_articles(&self) -> Vec<&ArticleMeta> {
        self.data.articles.values().collect()
    }

    pub fn list_articles_by_file(&self, file_id: &str) -> Vec<&ArticleMeta> {
        self.data
            .articles
            .values()
            .filter(|a| a.file_id == file_id)
            .collect()
    }

    pub fn get_article(&self, article_id: &str) -> Option<&ArticleMeta> {
        self.data.articles.get(article_id)
    }

    pub fn add_article(&mut self, article: ArticleMeta) {
        self.data.articles.insert(article.article_id.clone(), article);
    }

    pub fn remove_article(&mut self, article_id: &str) -> Result<ArticleMeta> {
        self.data
            .articles
            .remove(article_id)
            .ok_or_else(|| RagError::NotFound(format!("article {article_id} not found")))
    }

    /// Atomically persist the repository via write-tmp + rename.
    pub async fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.data)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        use std::io::Write;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(&self.path)
            .map_err(|e| RagError::IoFailure(e.error))?;
        info!(
            path = %self.path.display(),
            files = self.data.files.len(),
            articles = self.data.articles.len(),
            "metadata repository persisted"
        );
        Ok(())
    }
}
