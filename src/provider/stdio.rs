use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, ClientCapabilities, ClientInfo, Implementation};
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::child_process::TokioChildProcess;
use rmcp::{ClientHandler, ServiceExt};
use serde_json::Value;
use tokio::process::Command;

use super::{content_text, CapabilityProvider, ToolError, ToolSpec};

#[derive(Debug, Clone)]
pub struct NewsdeskClientHandler;

impl ClientHandler for NewsdeskClientHandler {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "newsdesk".to_string(),
                version: "0.1.0".to_string(),
                ..Default::default()
            },
        }
    }
}

/// Capability provider backed by a child-process MCP server speaking over
/// stdio.
pub struct StdioProvider {
    name: String,
    service: RunningService<RoleClient, NewsdeskClientHandler>,
}

impl StdioProvider {
    /// Spawn the server command and complete the MCP handshake.
    pub async fn connect(name: &str, command: &str, args: &[String]) -> Result<Self, ToolError> {
        let mut server_cmd = Command::new(command);
        for arg in args {
            server_cmd.arg(arg);
        }

        let transport = TokioChildProcess::new(server_cmd)
            .map_err(|e| ToolError::transport(name, e.to_string()))?;
        let service = NewsdeskClientHandler
            .serve(transport)
            .await
            .map_err(|e| ToolError::transport(name, e.to_string()))?;

        log::info!("Connected stdio provider '{}' ({})", name, command);
        Ok(Self {
            name: name.to_string(),
            service,
        })
    }
}

#[async_trait]
impl CapabilityProvider for StdioProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError> {
        let tools = self
            .service
            .list_all_tools()
            .await
            .map_err(|e| ToolError::transport(&self.name, e.to_string()))?;

        Ok(tools
            .into_iter()
            .map(|tool| ToolSpec {
                name: tool.name.to_string(),
                description: tool.description.unwrap_or_default().to_string(),
                input_schema: serde_json::to_value(&tool.input_schema).unwrap_or_default(),
            })
            .collect())
    }

    async fn invoke(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
        let arguments = match args {
            Value::Object(map) => Some(map),
            _ => None,
        };

        let result = self
            .service
            .call_tool(CallToolRequestParam {
                name: tool.to_string().into(),
                arguments,
            })
            .await
            .map_err(|e| ToolError::invoke(&self.name, tool, e.to_string(), true))?;

        let value = serde_json::to_value(result)
            .map_err(|e| ToolError::invoke(&self.name, tool, e.to_string(), false))?;

        if value
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            let message =
                content_text(&value).unwrap_or_else(|| "tool reported an error".to_string());
            return Err(ToolError::invoke(&self.name, tool, message, true));
        }

        Ok(value)
    }
}
