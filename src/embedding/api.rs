use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::{WeftError, WeftResult};

use super::{Embedder, Embedding};

/// Client for OpenAI-style `/v1/embeddings` endpoints.
pub struct ApiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dim: usize,
}

impl ApiEmbedder {
    /// Default width of `text-embedding-3-small` vectors.
    pub const DEFAULT_DIM: usize = 1536;

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: "https://api.openai.com".into(),
            api_key: api_key.into(),
            model: model.into(),
            dim: Self::DEFAULT_DIM,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the advertised vector width for models with other sizes.
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim.max(1);
        self
    }
}

fn parse_embeddings_response(
    data: &serde_json::Value,
    expected: usize,
) -> WeftResult<Vec<Embedding>> {
    let items = data
        .get("data")
        .and_then(|v| v.as_array())
        .ok_or_else(|| WeftError::Embedding("response missing data array".into()))?;

    let mut embeddings = Vec::with_capacity(items.len());
    for item in items {
        let values = item
            .get("embedding")
            .and_then(|v| v.as_array())
            .ok_or_else(|| WeftError::Embedding("response item missing embedding".into()))?;
        let vector: Vec<f32> = values
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(Embedding::new(vector));
    }

    if embeddings.len() != expected {
        return Err(WeftError::Embedding(format!(
            "expected {expected} vectors, got {}",
            embeddings.len()
        )));
    }
    Ok(embeddings)
}

#[async_trait]
impl Embedder for ApiEmbedder {
    async fn embed(&self, texts: &[String]) -> WeftResult<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.model,
            "input": texts,
        });
        let url = format!("{}/v1/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(WeftError::RateLimited {
                    provider: "openai".into(),
                    retry_after_ms: 5000,
                });
            }
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(WeftError::Auth(format!("Embeddings auth failed: {body}")));
            }
            return Err(WeftError::Embedding(format!(
                "Embeddings API error {status}: {body}"
            )));
        }

        let data: serde_json::Value = response.json().await?;
        parse_embeddings_response(&data, texts.len())
    }

    fn dim(&self) -> usize {
        self.dim
    }
}
