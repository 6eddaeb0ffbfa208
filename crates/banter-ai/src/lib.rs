pub mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use thiserror::Error;

/// Outcome of an upstream completion call. Callers decide how failures
/// surface; the client itself never substitutes content.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion provider returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("completion response missing candidate text")]
    MalformedResponse,
}

/// The only thing the rest of the system knows about the upstream AI:
/// a prompt goes in, text comes out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}
