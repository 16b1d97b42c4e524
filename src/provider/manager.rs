// SPDX-License-Identifier: MIT

//! Aggregates every configured provider behind one tool-routing surface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

use super::{CapabilityProvider, ToolError, ToolSpec};

/// Routes tool calls to the provider that advertises the tool and applies
/// the per-call timeout.
pub struct ProviderManager {
    providers: Vec<Arc<dyn CapabilityProvider>>,
    routes: HashMap<String, usize>,
    call_timeout: Duration,
}

impl ProviderManager {
    /// Build the routing table by listing every provider's tools. A tool
    /// advertised twice routes to the provider registered last.
    pub async fn connect(
        providers: Vec<Arc<dyn CapabilityProvider>>,
        call_timeout: Duration,
    ) -> Result<Self, ToolError> {
        let mut routes = HashMap::new();
        for (index, provider) in providers.iter().enumerate() {
            let tools = provider.list_tools().await?;
            log::info!(
                "Provider '{}' advertises {} tools",
                provider.name(),
                tools.len()
            );
            for tool in tools {
                if let Some(previous) = routes.insert(tool.name.clone(), index) {
                    log::warn!(
                        "Tool '{}' on '{}' overrides '{}'",
                        tool.name,
                        provider.name(),
                        providers[previous].name()
                    );
                }
            }
        }

        Ok(Self {
            providers,
            routes,
            call_timeout,
        })
    }

    fn provider_for(&self, tool: &str) -> Result<&Arc<dyn CapabilityProvider>, ToolError> {
        self.routes
            .get(tool)
            .and_then(|index| self.providers.get(*index))
            .ok_or_else(|| ToolError::NotFound(tool.to_string()))
    }
}

#[async_trait]
impl CapabilityProvider for ProviderManager {
    fn name(&self) -> &str {
        "capabilities"
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError> {
        let mut specs = Vec::new();
        for provider in &self.providers {
            specs.extend(provider.list_tools().await?);
        }
        Ok(specs)
    }

    async fn invoke(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
        let provider = self.provider_for(tool)?;
        log::debug!("Dispatching '{}' to provider '{}'", tool, provider.name());

        match timeout(self.call_timeout, provider.invoke(tool, args)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::TimedOut {
                tool: tool.to_string(),
                timeout_secs: self.call_timeout.as_secs(),
            }),
        }
    }
}
