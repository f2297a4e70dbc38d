//! Completion client for a local Ollama server.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::llm::{CompletionClient, GenerationError, ModelOptions};

const FALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

pub struct OllamaClient {
    options: ModelOptions,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(options: ModelOptions) -> Result<Self, GenerationError> {
        let base_url = options.base_url.trim_end_matches('/').to_owned();
        let timeout =
            Duration::try_from_secs_f64(options.request_timeout_secs).unwrap_or_else(|_| {
                warn!(
                    "Invalid request timeout {}, using {}s",
                    options.request_timeout_secs,
                    FALLBACK_TIMEOUT.as_secs()
                );
                FALLBACK_TIMEOUT
            });
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GenerationError::ModelUnavailable {
                endpoint: base_url.clone(),
                message: err.to_string(),
            })?;
        Ok(Self {
            options,
            base_url,
            client,
        })
    }

    fn unavailable(&self, err: reqwest::Error) -> GenerationError {
        let message = match err.is_timeout() {
            true => "request timed out".to_owned(),
            false => err.to_string(),
        };
        GenerationError::ModelUnavailable {
            endpoint: self.base_url.clone(),
            message,
        }
    }

    pub fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.options.name,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.options.temperature,
                "top_p": self.options.top_p,
                "top_k": self.options.top_k,
                "num_ctx": self.options.num_ctx,
                "num_thread": self.options.num_thread,
                "num_predict": self.options.max_tokens,
            }
        })
    }

    pub fn parse_response(json: &Value) -> Result<String, GenerationError> {
        json.get("response")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| GenerationError::MalformedResponse {
                message: "missing 'response' field".into(),
            })
    }

    /// Checks that the server answers and reports whether the configured
    /// model has been pulled.
    pub async fn health_check(&self) -> Result<bool, GenerationError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|err| self.unavailable(err))?;
        if !response.status().is_success() {
            return Err(GenerationError::Status {
                code: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let tags: Value = response
            .json()
            .await
            .map_err(|err| GenerationError::MalformedResponse {
                message: err.to_string(),
            })?;
        let model = &self.options.name;
        let latest = format!("{model}:latest");
        let available = tags
            .get("models")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.get("name").and_then(Value::as_str))
            .any(|name| name == model || name == latest);
        if !available {
            warn!(
                "Model {model} is not available on {}; run `ollama pull {model}`",
                self.base_url
            );
        }
        Ok(available)
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        info!("Requesting completion from {}", self.options.name);
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|err| self.unavailable(err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Status {
                code: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let json: Value = response.json().await.map_err(|err| match err.is_timeout() {
            true => self.unavailable(err),
            false => GenerationError::MalformedResponse {
                message: err.to_string(),
            },
        })?;
        Self::parse_response(&json)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
