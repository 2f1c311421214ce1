//! `embed(texts) -> vectors` collaborator interface.
//!
//! The core never depends on a specific embedding model: it calls an
//! [`EmbeddingProvider`] trait object. [`DeterministicEmbeddingProvider`] is
//! the always-available default — a seeded `xorshift64*` stream derived from
//! a `blake3` hash of the input — so ingestion and querying work out of the
//! box. [`FastEmbedProvider`] and [`ExternalEmbeddingProvider`] are real
//! model-backed implementations that plug into the same trait without any
//! call-site changes.

use pdfidx_core::error::VectorError;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

const VOYAGE_EMBED_ENDPOINT: &str = "https://api.voyageai.com/v1/embeddings";
const OPENAI_EMBED_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";

pub trait EmbeddingProvider {
    fn model_id(&self) -> &str;
    fn dimensions(&self) -> usize;
    fn embed_batch(&mut self, inputs: &[String]) -> Result<Vec<Vec<f32>>, VectorError>;
}

/// Deterministic, allocation-light fallback: no model download, no network
/// call, stable output for a given `(model_id, input)` pair.
pub struct DeterministicEmbeddingProvider {
    model_id: String,
    dimensions: usize,
}

impl DeterministicEmbeddingProvider {
    pub fn new(model_id: impl Into<String>, dimensions: usize) -> Self {
        Self { model_id: model_id.into(), dimensions }
    }
}

impl EmbeddingProvider for DeterministicEmbeddingProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&mut self, inputs: &[String]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(inputs
            .iter()
            .map(|input| deterministic_embedding(&format!("{}:{}", self.model_id, input), self.dimensions))
            .collect())
    }
}

fn deterministic_embedding(input: &str, dimensions: usize) -> Vec<f32> {
    if dimensions == 0 {
        return Vec::new();
    }
    let seed_hash = blake3::hash(input.as_bytes());
    let mut state = u64::from_le_bytes(
        seed_hash.as_bytes()[0..8]
            .try_into()
            .expect("seed hash has at least 8 bytes"),
    );
    if state == 0 {
        // xorshift generators must not use an all-zero state.
        state = 0x9e37_79b9_7f4a_7c15;
    }

    let mut vector = Vec::with_capacity(dimensions);
    for _ in 0..dimensions {
        state ^= state >> 12;
        state ^= state << 25;
        state ^= state >> 27;
        let n = state.wrapping_mul(0x2545_F491_4F6C_DD1D);
        let scaled = (n as f64 / u64::MAX as f64) * 2.0 - 1.0;
        vector.push(scaled as f32);
    }

    let norm = vector.iter().map(|v| (*v as f64) * (*v as f64)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return vector;
    }
    vector.into_iter().map(|v| (v as f64 / norm) as f32).collect()
}

/// A real, locally-run embedding model via `fastembed`. Falls back to the
/// deterministic stream if the runtime fails to initialize (missing model
/// cache, no network access to fetch weights, unsupported platform).
pub struct FastEmbedProvider {
    model_id: String,
    dimensions: usize,
    runtime: Option<fastembed::TextEmbedding>,
    fallback: DeterministicEmbeddingProvider,
}

impl FastEmbedProvider {
    pub fn new(model: fastembed::EmbeddingModel, model_id: impl Into<String>, dimensions: usize) -> Self {
        let model_id = model_id.into();
        let options = fastembed::TextInitOptions::new(model).with_show_download_progress(false);
        let runtime = match fastembed::TextEmbedding::try_new(options) {
            Ok(rt) => Some(rt),
            Err(err) => {
                warn!(model = %model_id, error = %err, "fastembed init failed, falling back to deterministic embeddings");
                None
            }
        };
        Self {
            fallback: DeterministicEmbeddingProvider::new(model_id.clone(), dimensions),
            model_id,
            dimensions,
            runtime,
        }
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&mut self, inputs: &[String]) -> Result<Vec<Vec<f32>>, VectorError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(runtime) = self.runtime.as_mut() {
            let refs: Vec<&str> = inputs.iter().map(String::as_str).collect();
            match runtime.embed(refs, None) {
                Ok(vectors) if vectors.iter().all(|v| v.len() == self.dimensions) => return Ok(vectors),
                Ok(_) => {
                    warn!(model = %self.model_id, "fastembed returned an unexpected vector shape, switching to deterministic fallback");
                    self.runtime = None;
                }
                Err(err) => {
                    warn!(model = %self.model_id, error = %err, "fastembed embed call failed, switching to deterministic fallback");
                    self.runtime = None;
                }
            }
        }
        self.fallback.embed_batch(inputs)
    }
}

/// A hosted embedding API (Voyage AI, OpenAI-compatible) reached over HTTPS.
pub struct ExternalEmbeddingProvider {
    model_id: String,
    dimensions: usize,
    endpoint: String,
    api_key_env: String,
    client: Client,
}

impl ExternalEmbeddingProvider {
    pub fn new(
        provider: &str,
        model_id: impl Into<String>,
        dimensions: usize,
        api_key_env: impl Into<String>,
    ) -> Result<Self, VectorError> {
        let endpoint = match provider {
            "voyage" => VOYAGE_EMBED_ENDPOINT,
            _ => OPENAI_EMBED_ENDPOINT,
        }
        .to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(VectorError::external)?;
        Ok(Self { model_id: model_id.into(), dimensions, endpoint, api_key_env: api_key_env.into(), client })
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingProvider for ExternalEmbeddingProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&mut self, inputs: &[String]) -> Result<Vec<Vec<f32>>, VectorError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let api_key = std::env::var(&self.api_key_env)
            .map_err(|_| VectorError::external(format!("missing {} env var", self.api_key_env)))?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&serde_json::json!({ "model": self.model_id, "input": inputs }))
            .send()
            .map_err(VectorError::external)?;
        if !response.status().is_success() {
            return Err(VectorError::external(format!("embedding http {}", response.status().as_u16())));
        }
        let body: EmbeddingApiResponse = response.json().map_err(VectorError::external)?;
        if body.data.len() != inputs.len() {
            return Err(VectorError::external(format!(
                "embedding result count mismatch expected={} got={}",
                inputs.len(),
                body.data.len()
            )));
        }
        for item in &body.data {
            if item.embedding.len() != self.dimensions {
                return Err(VectorError::DimensionMismatch { expected: self.dimensions, actual: item.embedding.len() });
            }
        }
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_embeddings_are_stable_and_unit_length() {
        let mut provider = DeterministicEmbeddingProvider::new("pdfidx/deterministic-v1", 32);
        let first = provider.embed_batch(&["a study of transference".to_string()]).unwrap();
        let second = provider.embed_batch(&["a study of transference".to_string()]).unwrap();
        assert_eq!(first, second);
        let norm: f64 = first[0].iter().map(|v| (*v as f64) * (*v as f64)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn deterministic_embeddings_differ_by_input() {
        let mut provider = DeterministicEmbeddingProvider::new("pdfidx/deterministic-v1", 16);
        let vectors = provider
            .embed_batch(&["alpha".to_string(), "beta".to_string()])
            .unwrap();
        assert_ne!(vectors[0], vectors[1]);
    }

    #[test]
    fn zero_dimension_embeds_to_empty_vector() {
        let mut provider = DeterministicEmbeddingProvider::new("model", 0);
        let vectors = provider.embed_batch(&["x".to_string()]).unwrap();
        assert!(vectors[0].is_empty());
    }
}
