// SPDX-License-Identifier: MIT

//! MCP provider over streamable HTTP.
//!
//! Requests are JSON-RPC POSTs against a single endpoint; servers may
//! answer with plain JSON or with a short SSE stream, so both body shapes
//! are accepted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

use super::{content_text, CapabilityProvider, ToolError, ToolSpec};

static INITIALIZE_PARAMS: Lazy<Value> = Lazy::new(|| {
    json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {},
        "clientInfo": {
            "name": "newsdesk",
            "version": "0.1.0"
        }
    })
});

/// Capability provider speaking MCP to a remote HTTP endpoint.
pub struct RemoteProvider {
    name: String,
    client: Client,
    endpoint: Url,
    headers: HashMap<String, String>,
    next_id: AtomicU64,
}

impl RemoteProvider {
    /// Connect to `url` and run the MCP initialize handshake. Extra headers
    /// (typically authorization) are sent with every request.
    pub async fn connect(
        name: &str,
        url: &str,
        headers: HashMap<String, String>,
    ) -> Result<Self, ToolError> {
        let endpoint = Url::parse(url).map_err(|e| ToolError::transport(name, e.to_string()))?;
        let provider = Self {
            name: name.to_string(),
            client: Client::new(),
            endpoint,
            headers,
            next_id: AtomicU64::new(1),
        };

        let info = provider.rpc("initialize", INITIALIZE_PARAMS.clone()).await?;
        let server = info
            .pointer("/serverInfo/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        log::info!("Connected remote provider '{}' to {}", name, server);

        provider.notify("notifications/initialized").await?;
        Ok(provider)
    }

    async fn post(&self, body: &Value) -> Result<(String, String), ToolError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream");
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| ToolError::transport(&self.name, e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let text = response
            .text()
            .await
            .map_err(|e| ToolError::transport(&self.name, e.to_string()))?;

        if !status.is_success() {
            let retryable = status.as_u16() == 429 || status.is_server_error();
            return Err(ToolError::invoke(
                &self.name,
                "rpc",
                format!("HTTP {}: {}", status, text),
                retryable,
            ));
        }

        Ok((content_type, text))
    }

    /// One JSON-RPC request/response exchange.
    async fn rpc(&self, method: &str, params: Value) -> Result<Value, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });

        let (content_type, text) = self.post(&body).await?;
        let message = if content_type.contains("text/event-stream") {
            sse_payload(&text, id).ok_or_else(|| {
                ToolError::transport(
                    &self.name,
                    format!("no reply for request {} in event stream", id),
                )
            })?
        } else {
            serde_json::from_str(&text)
                .map_err(|e| ToolError::transport(&self.name, e.to_string()))?
        };

        if let Some(error) = message.get("error") {
            let detail = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(ToolError::invoke(
                &self.name,
                method,
                detail.to_string(),
                false,
            ));
        }

        Ok(message.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Fire-and-forget JSON-RPC notification.
    async fn notify(&self, method: &str) -> Result<(), ToolError> {
        let body = json!({ "jsonrpc": "2.0", "method": method });
        self.post(&body).await?;
        Ok(())
    }
}

/// The JSON payload answering request `id` inside an SSE body. Falls back
/// to the last response-shaped payload when ids are absent.
fn sse_payload(body: &str, id: u64) -> Option<Value> {
    let mut last = None;
    for line in body.lines() {
        let data = match line.strip_prefix("data:") {
            Some(data) => data.trim(),
            None => continue,
        };
        let value = match serde_json::from_str::<Value>(data) {
            Ok(value) => value,
            Err(_) => continue,
        };

        if value.get("id").and_then(Value::as_u64) == Some(id) {
            return Some(value);
        }
        if value.get("result").is_some() || value.get("error").is_some() {
            last = Some(value);
        }
    }
    last
}

fn parse_tool_specs(result: &Value) -> Vec<ToolSpec> {
    let tools = match result.get("tools").and_then(Value::as_array) {
        Some(tools) => tools,
        None => return Vec::new(),
    };

    tools
        .iter()
        .map(|tool| ToolSpec {
            name: tool
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            description: tool
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            input_schema: tool.get("inputSchema").cloned().unwrap_or(Value::Null),
        })
        .collect()
}

#[async_trait]
impl CapabilityProvider for RemoteProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError> {
        let result = self.rpc("tools/list", json!({})).await?;
        Ok(parse_tool_specs(&result))
    }

    async fn invoke(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
        let result = self
            .rpc("tools/call", json!({ "name": tool, "arguments": args }))
            .await?;

        if result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            let message =
                content_text(&result).unwrap_or_else(|| "tool reported an error".to_string());
            return Err(ToolError::invoke(&self.name, tool, message, true));
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_payload_picks_the_matching_id() {
        let body = "event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"ok\":true}}\n\
                    \n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":8,\"result\":{\"ok\":false}}\n";

        let payload = sse_payload(body, 7).unwrap();
        assert_eq!(payload["result"]["ok"], true);
    }

    #[test]
    fn test_sse_payload_falls_back_to_last_response() {
        let body = "data: {\"method\":\"notifications/progress\"}\n\
                    data: {\"jsonrpc\":\"2.0\",\"result\":{\"done\":1}}\n";

        let payload = sse_payload(body, 99).unwrap();
        assert_eq!(payload["result"]["done"], 1);
    }

    #[test]
    fn test_sse_payload_ignores_garbage_lines() {
        let body = ": keepalive\n\
                    data: not json\n\
                    retry: 500\n";

        assert!(sse_payload(body, 1).is_none());
    }

    #[test]
    fn test_tool_specs_parse_from_a_listing() {
        let result = json!({
            "tools": [
                {
                    "name": "search_and_content",
                    "description": "Web search",
                    "inputSchema": {"type": "object"}
                },
                {
                    "name": "create_linkedin_post"
                }
            ]
        });

        let specs = parse_tool_specs(&result);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "search_and_content");
        assert_eq!(specs[0].input_schema["type"], "object");
        assert_eq!(specs[1].description, "");
        assert_eq!(parse_tool_specs(&json!({})).len(), 0);
    }
}
