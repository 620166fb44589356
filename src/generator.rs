//! The text-generation backend, treated as an external collaborator:
//! `prompt -> string`, reached over HTTP.

use crate::error::{RagError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sampling parameters for a single generation call.
#[derive(Debug, Clone, Copy)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, sampling: SamplingParams) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    status: String,
    #[serde(default)]
    text: String,
}

/// HTTP-backed generator calling `{base_url}{endpoint}`, matching the
/// reference collaborator's `{"status": "ok", "text": ...}` contract.
pub struct HttpGenerator {
    client: reqwest::Client,
    base_url: String,
    endpoint: String,
}

impl HttpGenerator {
    pub fn new(base_url: String, endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RagError::Http)?;
        Ok(Self {
            client,
            base_url,
            endpoint,
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str, sampling: SamplingParams) -> Result<String> {
        let url = format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint
        );
        let request = GenerateRequest {
            prompt,
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            max_tokens: sampling.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::BackendError(format!("generator request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(RagError::BackendError(format!(
                "generator returned status {}",
                response.status()
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RagError::BackendError(format!("generator response invalid: {e}")))?;

        if parsed.status != "ok" {
            return Err(RagError::BackendError(format!(
                "generator reported non-ok status: {}",
                parsed.status
            )));
        }

        Ok(parsed.text)
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::FakeGenerator;
    use super::*;

    #[tokio::test]
    async fn test_fake_generator_returns_fixed_response() {
        let generator = FakeGenerator {
            response: "no json here".to_string(),
        };
        let sampling = SamplingParams {
            temperature: 0.01,
            top_p: 0.1,
            max_tokens: 512,
        };
        let out = generator.generate("anything", sampling).await.unwrap();
        assert_eq!(out, "no json here");
    }
}
