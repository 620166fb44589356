//! The embedding model, treated as an external collaborator: a pure
//! function `text -> vector` of fixed dimension, reached over HTTP.

use crate::error::{RagError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single query string.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many documents in one backend call, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP-backed embedder calling `{base_url}/embed`.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RagError::Http)?;
        Ok(Self {
            client,
            base_url,
            model,
        })
    }

    async fn call(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embed", self.base_url.trim_end_matches('/'));
        let request = EmbedRequest {
            model: &self.model,
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::BackendError(format!("embedder request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(RagError::BackendError(format!(
                "embedder returned status {}",
                response.status()
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::BackendError(format!("embedder response invalid: {e}")))?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.call(&[text]).await?;
        result
            .pop()
            .ok_or_else(|| RagError::BackendError("embedder returned no vectors".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        self.call(&refs).await
    }
}

/// Deterministic in-memory fakes shared across this crate's pipeline
/// tests, so no test touches the network.
#[cfg(test)]
pub mod fakes {
    use super::*;

    pub struct FakeEmbedder {
        pub dim: usize,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
            Ok(fake_vector(text, self.dim))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| fake_vector(t, self.dim)).collect())
        }
    }

    fn fake_vector(text: &str, dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dim];
        for (i, byte) in text.bytes().enumerate() {
            v[i % dim] += byte as f32;
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::FakeEmbedder;
    use super::*;

    #[tokio::test]
    async fn test_fake_embedder_is_deterministic() {
        let embedder = FakeEmbedder { dim: 8 };
        let a = embedder.embed_one("hello").await.unwrap();
        let b = embedder.embed_one("hello").await.unwrap();
        assert_eq!(a, b);
    }
}
