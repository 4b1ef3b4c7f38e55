//! Generation backend abstraction and Ollama client.
//!
//! The relay only needs one capability from the generation service: start a streamed
//! completion for a prompt and hand back the raw NDJSON byte stream.

mod ollama;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;

pub use ollama::{GenerateRequest, GenerationChunk, OllamaClient, OllamaModel};

/// Raw response body of a streamed generation, chunk by chunk as the transport delivers it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("ollama request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("ollama api error: {0}")]
    Api(String),
}

/// Starts streamed completions. Implemented by [`OllamaClient`]; tests substitute their own.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Issue the request and return once the response headers arrived with a success status.
    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<ByteStream, LlmError>;
}
