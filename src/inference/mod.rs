// SPDX-License-Identifier: MIT

//! Language-model collaborator: free-form completion plus text embedding.
//! The engine treats it as a black box; determinism of replies is the
//! collaborator's contract, not the engine's.

pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

pub use openai::OpenAiBackend;

#[derive(Debug, Error)]
pub enum InferenceError {
    /// API key not configured.
    #[error("API key not configured: set {0}")]
    ApiKeyMissing(String),

    /// The provider's API rejected or failed the request.
    #[error("inference error from {provider}: {message}")]
    Api {
        provider: String,
        message: String,
        retryable: bool,
    },

    /// The provider answered with something unusable.
    #[error("invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },
}

impl InferenceError {
    pub fn api(provider: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
            retryable,
        }
    }

    pub fn invalid(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InferenceError::Api {
                retryable: true,
                ..
            }
        )
    }
}

/// Completion and embedding backend used by the role nodes.
#[async_trait]
pub trait Inference: Send + Sync {
    /// Free-form completion: `prompt` sets the role, `context` carries the
    /// task input.
    async fn complete(&self, prompt: &str, context: &str) -> Result<String, InferenceError>;

    /// Embedding vector for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError>;
}
