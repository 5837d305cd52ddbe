use std::io::{BufRead, BufReader};

use serde::{Deserialize, Serialize};

use super::{GenerationError, GenerationOptions, LlmGenerate};

/// Ollama HTTP client for local LLM inference and embeddings.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Create a client pointing at an Ollama instance.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, GenerationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GenerationError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    /// Default Ollama instance at localhost:11434 with 2-minute timeout.
    pub fn default_local() -> Result<Self, GenerationError> {
        Self::new("http://localhost:11434", 120)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_connect() {
            GenerationError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            GenerationError::Timeout(self.timeout_secs)
        } else {
            GenerationError::HttpClient(e.to_string())
        }
    }

    fn check_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, GenerationError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Single-shot completion via `/api/generate`.
    pub fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest::new(model, prompt, system, options, false);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response)?;

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| GenerationError::ResponseParsing(e.to_string()))?;

        Ok(parsed.response)
    }

    /// Streaming completion. Ollama answers with one JSON object per line;
    /// each `response` fragment is forwarded as it arrives.
    pub fn generate_streaming(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
        options: &GenerationOptions,
        token_tx: std::sync::mpsc::Sender<String>,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest::new(model, prompt, system, options, true);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response)?;

        let mut full = String::new();
        for line in BufReader::new(response).lines() {
            let line = line.map_err(|e| GenerationError::HttpClient(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let chunk: OllamaStreamChunk = serde_json::from_str(&line)
                .map_err(|e| GenerationError::ResponseParsing(e.to_string()))?;
            if let Some(error) = chunk.error {
                return Err(GenerationError::HttpClient(error));
            }
            if !chunk.response.is_empty() {
                full.push_str(&chunk.response);
                token_tx
                    .send(chunk.response)
                    .map_err(|_| GenerationError::Cancelled)?;
            }
            if chunk.done {
                break;
            }
        }

        Ok(full)
    }

    /// Embedding vector via `/api/embeddings`.
    pub fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, GenerationError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = OllamaEmbeddingRequest {
            model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response)?;

        let parsed: OllamaEmbeddingResponse = response
            .json()
            .map_err(|e| GenerationError::ResponseParsing(e.to_string()))?;

        Ok(parsed.embedding)
    }

    pub fn is_model_available(&self, model: &str) -> Result<bool, GenerationError> {
        let models = self.list_models()?;
        Ok(models.iter().any(|m| m.starts_with(model)))
    }

    pub fn list_models(&self) -> Result<Vec<String>, GenerationError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response)?;

        let parsed: OllamaTagsResponse = response
            .json()
            .map_err(|e| GenerationError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
}

impl<'a> OllamaGenerateRequest<'a> {
    fn new(
        model: &'a str,
        prompt: &'a str,
        system: &'a str,
        options: &GenerationOptions,
        stream: bool,
    ) -> Self {
        Self {
            model,
            prompt,
            system,
            stream,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        }
    }
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// One line of a streamed /api/generate response
#[derive(Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

/// `LlmGenerate` backed by a fixed Ollama model.
pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
}

impl OllamaGenerator {
    pub fn new(client: OllamaClient, model: String) -> Self {
        Self { client, model }
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }
}

impl LlmGenerate for OllamaGenerator {
    fn generate(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        self.client.generate(&self.model, prompt, system, options)
    }

    fn generate_streaming(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
        token_tx: std::sync::mpsc::Sender<String>,
    ) -> Result<String, GenerationError> {
        self.client
            .generate_streaming(&self.model, prompt, system, options, token_tx)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
