//! HTTP-backed embedding providers.
//!
//! All three speak JSON over a blocking `ureq` agent with a shared
//! timeout. API keys arrive via configuration at construction and are
//! held only in memory; they are read from the environment, never from
//! collection metadata.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::Vectorizer;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(HTTP_TIMEOUT)
        .build()
}

fn provider_err(context: &str, err: &ureq::Error) -> Error {
    Error::Provider(format!("{context}: {err}"))
}

fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(Error::Provider(format!(
            "provider returned dimension {} (expected {expected})",
            vector.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// OpenAI-compatible
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

/// Any endpoint speaking the OpenAI `/v1/embeddings` shape.
pub struct OpenAiCompatibleVectorizer {
    agent: ureq::Agent,
    url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
}

impl OpenAiCompatibleVectorizer {
    /// Creates a provider; `endpoint` defaults to the OpenAI API base.
    #[must_use]
    pub fn new(
        endpoint: Option<String>,
        model: String,
        api_key: Option<String>,
        dimension: usize,
    ) -> Self {
        let base = endpoint.unwrap_or_else(|| "https://api.openai.com".to_string());
        Self {
            agent: agent(),
            url: format!("{}/v1/embeddings", base.trim_end_matches('/')),
            model,
            api_key,
            dimension,
        }
    }
}

impl Vectorizer for OpenAiCompatibleVectorizer {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text.to_string()])?;
        batch
            .pop()
            .ok_or_else(|| Error::Provider("provider returned no embeddings".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(count = texts.len(), model = %self.model, "openai-compatible embed");
        let mut request = self.agent.post(&self.url);
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }

        let response: OpenAiResponse = request
            .send_json(OpenAiRequest {
                input: texts,
                model: &self.model,
            })
            .map_err(|e| provider_err("embeddings request failed", &e))?
            .into_json()
            .map_err(|e| Error::Provider(format!("malformed embeddings response: {e}")))?;

        if response.data.len() != texts.len() {
            return Err(Error::Provider(format!(
                "provider returned {} embeddings for {} inputs",
                response.data.len(),
                texts.len()
            )));
        }

        let vectors: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();
        for v in &vectors {
            check_dimension(self.dimension, v)?;
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

/// A local Ollama daemon. The API embeds one prompt per call; batches
/// loop.
pub struct OllamaVectorizer {
    agent: ureq::Agent,
    url: String,
    model: String,
    dimension: usize,
}

impl OllamaVectorizer {
    /// Creates a provider; `endpoint` defaults to the local daemon.
    #[must_use]
    pub fn new(endpoint: Option<String>, model: String, dimension: usize) -> Self {
        let base = endpoint.unwrap_or_else(|| "http://localhost:11434".to_string());
        Self {
            agent: agent(),
            url: format!("{}/api/embeddings", base.trim_end_matches('/')),
            model,
            dimension,
        }
    }
}

impl Vectorizer for OllamaVectorizer {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(model = %self.model, "ollama embed");
        let response: OllamaResponse = self
            .agent
            .post(&self.url)
            .send_json(OllamaRequest {
                model: &self.model,
                prompt: text,
            })
            .map_err(|e| provider_err("ollama request failed", &e))?
            .into_json()
            .map_err(|e| Error::Provider(format!("malformed ollama response: {e}")))?;

        check_dimension(self.dimension, &response.embedding)?;
        Ok(response.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// HuggingFace hosted inference
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HfRequest<'a> {
    inputs: &'a [String],
}

/// The hosted feature-extraction pipeline.
pub struct HuggingFaceVectorizer {
    agent: ureq::Agent,
    url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
}

impl HuggingFaceVectorizer {
    /// Creates a provider; `endpoint` defaults to the hosted inference API.
    #[must_use]
    pub fn new(
        endpoint: Option<String>,
        model: String,
        api_key: Option<String>,
        dimension: usize,
    ) -> Self {
        let url = match endpoint {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), model),
            None => format!(
                "https://api-inference.huggingface.co/pipeline/feature-extraction/{model}"
            ),
        };
        Self {
            agent: agent(),
            url,
            model,
            api_key,
            dimension,
        }
    }
}

impl Vectorizer for HuggingFaceVectorizer {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text.to_string()])?;
        batch
            .pop()
            .ok_or_else(|| Error::Provider("provider returned no embeddings".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(count = texts.len(), model = %self.model, "huggingface embed");
        let mut request = self.agent.post(&self.url);
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }

        let vectors: Vec<Vec<f32>> = request
            .send_json(HfRequest { inputs: texts })
            .map_err(|e| provider_err("feature-extraction request failed", &e))?
            .into_json()
            .map_err(|e| Error::Provider(format!("malformed feature-extraction response: {e}")))?;

        if vectors.len() != texts.len() {
            return Err(Error::Provider(format!(
                "provider returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        for v in &vectors {
            check_dimension(self.dimension, v)?;
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
