pub mod ollama;

use std::{error::Error, fmt::Display};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use ollama::OllamaClient;

#[derive(Debug, Clone)]
pub enum GenerationError {
    /// The endpoint could not be reached or did not answer in time.
    ModelUnavailable { endpoint: String, message: String },
    Status { code: u16, body: String },
    MalformedResponse { message: String },
}

impl Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::ModelUnavailable { endpoint, message } => write!(
                f,
                "Model endpoint {endpoint} is unavailable ({message}). Is `ollama serve` running?"
            ),
            GenerationError::Status { code, body } => {
                write!(f, "Model endpoint answered with status {code}: {body}")
            }
            GenerationError::MalformedResponse { message } => {
                write!(f, "Malformed model response: {message}")
            }
        }
    }
}

impl Error for GenerationError {}

/// Model name, endpoint and sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ModelOptions {
    pub name: String,
    pub base_url: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub num_ctx: u32,
    pub num_thread: u32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    pub request_timeout_secs: f64,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            name: "gemma3:4b".into(),
            base_url: "http://127.0.0.1:11434".into(),
            temperature: 0.1,
            top_p: 0.9,
            top_k: 40,
            num_ctx: 2048,
            num_thread: 4,
            max_tokens: 500,
            request_timeout_secs: 30.0,
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns the raw completion text for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;

    fn name(&self) -> &str;
}
