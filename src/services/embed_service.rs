use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;

#[derive(Clone, Debug, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub dimension: usize,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        let dimension = vector.len();
        Self { vector, dimension }
    }
}

/// Turns text into a fixed-length vector. Every failure, including a
/// missing key, is reported as [`Error::EmbeddingUnavailable`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;
}

#[derive(Clone)]
pub struct EmbedService {
    client: Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
}

impl EmbedService {
    pub fn new(api_key: Option<String>, model: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            model,
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        #[derive(serde::Serialize)]
        struct EmbReq<'a> {
            model: &'a str,
            input: &'a [String],
        }
        #[derive(serde::Deserialize)]
        struct EmbData {
            embedding: Vec<f32>,
        }
        #[derive(serde::Deserialize)]
        struct EmbResp {
            data: Vec<EmbData>,
        }

        let Some(api_key) = self.api_key.as_deref() else {
            return Err(Error::EmbeddingUnavailable("no embedding API key configured".to_string()));
        };
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbReq {
            model: &self.model,
            input: texts,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::EmbeddingUnavailable(format!("embeddings request failed: {}", e)))?;

        let status = resp.status();
        let txt = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Error::EmbeddingUnavailable(format!(
                "embeddings status {}: {}",
                status.as_u16(),
                txt
            )));
        }
        let parsed: EmbResp = serde_json::from_str(&txt)
            .map_err(|e| Error::EmbeddingUnavailable(format!("embeddings parse failed: {}", e)))?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingClient for EmbedService {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vectors = self.embed_texts(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) if !v.is_empty() => Ok(Embedding::new(v)),
            _ => Err(Error::EmbeddingUnavailable("empty embedding returned".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_reports_unavailable() {
        let service = EmbedService::new(None, "m".into(), Client::new());
        assert!(!service.is_configured());
        let err = service.embed("text").await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
    }

    #[test]
    fn embedding_records_its_dimension() {
        assert_eq!(Embedding::new(vec![0.1, 0.2, 0.3]).dimension, 3);
    }
}
