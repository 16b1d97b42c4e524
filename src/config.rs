// SPDX-License-Identifier: MIT

//! YAML configuration for a newsdesk deployment.
//!
//! Every field has a default so an empty file yields a working local setup;
//! `providers` is the only section that has to be filled in before tools
//! can be called.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NewsdeskConfig {
    /// Topic the run researches and writes about.
    pub topic: String,
    /// SQLite database holding checkpoints and published articles.
    pub store_path: String,
    /// Consult the model for a routing second opinion on every decision.
    pub advisor: bool,
    pub engine: EngineConfig,
    pub quality: QualityConfig,
    pub researcher: ResearcherConfig,
    pub publisher: PublisherConfig,
    pub inference: InferenceConfig,
    /// Tool providers connected at startup.
    pub providers: Vec<ProviderConfig>,
}

impl Default for NewsdeskConfig {
    fn default() -> Self {
        Self {
            topic: "quantitative finance".to_string(),
            store_path: "newsdesk.db".to_string(),
            advisor: false,
            engine: EngineConfig::default(),
            quality: QualityConfig::default(),
            researcher: ResearcherConfig::default(),
            publisher: PublisherConfig::default(),
            inference: InferenceConfig::default(),
            providers: Vec::new(),
        }
    }
}

impl NewsdeskConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a YAML string. An empty document means
    /// all defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Engine budgets and retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Node invocations allowed before the run aborts.
    pub max_steps: u64,
    /// Retries after the first failed attempt of a node.
    pub retry_limit: u32,
    /// Base backoff between attempts; grows linearly per attempt.
    pub retry_backoff_ms: u64,
    /// Wall-clock budget for the whole run.
    pub run_timeout_secs: u64,
    /// Budget for a single tool call.
    pub call_timeout_secs: u64,
    /// Tool calls in flight at once during dispatch.
    pub tool_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 40,
            retry_limit: 2,
            retry_backoff_ms: 500,
            run_timeout_secs: 600,
            call_timeout_secs: 30,
            tool_concurrency: 4,
        }
    }
}

/// Uniqueness gate thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Cosine similarity above which a draft counts as a duplicate.
    pub similarity_threshold: f32,
    /// Published articles compared against each draft.
    pub neighbor_count: usize,
    /// Rejected drafts tolerated before the run gives up.
    pub max_redrafts: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            neighbor_count: 3,
            max_redrafts: 3,
        }
    }
}

/// Research planning limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResearcherConfig {
    /// Tool invoked for each search query.
    pub search_tool: String,
    /// Queries queued per planning round.
    pub max_queries: usize,
    /// Planning rounds before the run aborts with no findings.
    pub max_rounds: u32,
    /// Restrict search results to this many days back.
    pub window_days: i64,
}

impl Default for ResearcherConfig {
    fn default() -> Self {
        Self {
            search_tool: "search_and_content".to_string(),
            max_queries: 3,
            max_rounds: 2,
            window_days: 30,
        }
    }
}

/// Publishing tool and its fixed arguments.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub publish_tool: String,
    /// Author URN passed through to the publish tool.
    pub author: String,
    pub visibility: String,
    pub lifecycle_state: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            publish_tool: "create_linkedin_post".to_string(),
            author: String::new(),
            visibility: "PUBLIC".to_string(),
            lifecycle_state: "PUBLISHED".to_string(),
        }
    }
}

/// Model backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub model: String,
    pub embedding_model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Overrides the default API endpoint.
    pub base_url: Option<String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
        }
    }
}

/// One tool provider, keyed by transport.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Child process speaking MCP over stdio.
    Stdio {
        name: String,
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Streamable HTTP endpoint.
    Remote {
        name: String,
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}
