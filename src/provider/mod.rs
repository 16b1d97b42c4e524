// SPDX-License-Identifier: MIT

//! Capability provider client: the uniform surface nodes use to list and
//! invoke external tools, regardless of transport.

pub mod manager;
pub mod remote;
pub mod stdio;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use manager::ProviderManager;
pub use remote::RemoteProvider;
pub use stdio::StdioProvider;

/// Description of one tool advertised by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Tool invocation failures, classified for the engine's retry policy.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No provider advertises the tool.
    #[error("tool '{0}' not found on any provider")]
    NotFound(String),

    /// The provider reported a failure for this call.
    #[error("tool '{tool}' failed on {provider}: {message}")]
    Invoke {
        provider: String,
        tool: String,
        message: String,
        retryable: bool,
    },

    /// The per-call timeout elapsed.
    #[error("tool '{tool}' timed out after {timeout_secs}s")]
    TimedOut { tool: String, timeout_secs: u64 },

    /// The transport to the provider is broken.
    #[error("provider {provider} transport error: {message}")]
    Transport { provider: String, message: String },
}

impl ToolError {
    pub fn invoke(
        provider: impl Into<String>,
        tool: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self::Invoke {
            provider: provider.into(),
            tool: tool.into(),
            message: message.into(),
            retryable,
        }
    }

    pub fn transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether a retry of the same call could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ToolError::NotFound(_) => false,
            ToolError::Invoke { retryable, .. } => *retryable,
            ToolError::TimedOut { .. } => true,
            ToolError::Transport { .. } => true,
        }
    }
}

/// A connected tool provider.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError>;

    async fn invoke(&self, tool: &str, args: Value) -> Result<Value, ToolError>;
}

/// Text carried in an MCP tool result's content array, when present.
pub fn content_text(result: &Value) -> Option<String> {
    let items = result.get("content")?.as_array()?;

    let mut text = String::new();
    for item in items {
        if let Some(t) = item.get("text").and_then(Value::as_str) {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(t);
        }
    }

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
