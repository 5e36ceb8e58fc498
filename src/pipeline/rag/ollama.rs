use serde::{Deserialize, Serialize};

use super::orchestrator::LlmGenerate;
use super::RagError;

/// Generation timeout for the local model, in seconds.
pub const GENERATE_TIMEOUT_SECS: u64 = 300;

/// Ollama HTTP client for local LLM inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
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

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, RagError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RagError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send_error(&self, e: reqwest::Error) -> RagError {
        if e.is_connect() {
            RagError::OllamaConnection(self.base_url.clone())
        } else if e.is_timeout() {
            RagError::HttpClient(format!("Request timed out after {}s", self.timeout_secs))
        } else {
            RagError::HttpClient(e.to_string())
        }
    }

    fn check_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, RagError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(RagError::OllamaError {
            status: status.as_u16(),
            body,
        })
    }

    /// Single non-streaming completion. The model output is returned verbatim.
    pub fn generate(&self, model: &str, prompt: &str) -> Result<String, RagError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.send_error(e))?;

        let parsed: OllamaGenerateResponse = Self::check_status(response)?
            .json()
            .map_err(|e| RagError::ResponseParsing(e.to_string()))?;

        Ok(parsed.response)
    }

    pub fn list_models(&self) -> Result<Vec<String>, RagError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.send_error(e))?;

        let parsed: OllamaTagsResponse = Self::check_status(response)?
            .json()
            .map_err(|e| RagError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether `model` is pulled. A bare name also matches its tagged variants.
    pub fn is_model_available(&self, model: &str) -> Result<bool, RagError> {
        Ok(model_matches(&self.list_models()?, model))
    }
}

fn model_matches(available: &[String], model: &str) -> bool {
    available.iter().any(|name| {
        name == model
            || name
                .strip_prefix(model)
                .is_some_and(|rest| rest.starts_with(':'))
    })
}

/// `LlmGenerate` bound to one configured model.
pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
}

impl OllamaGenerator {
    pub fn new(client: OllamaClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl LlmGenerate for OllamaGenerator {
    fn generate(&self, prompt: &str) -> Result<String, RagError> {
        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Calling Ollama");
        self.client.generate(&self.model, prompt)
    }
}
