// SPDX-License-Identifier: MIT

//! Researcher: plans search queries, then turns tool output into findings.
//!
//! The node runs in two phases. With no tool results in the state it asks
//! the model for search queries and queues them as pending tool calls. When
//! it re-enters after dispatch it harvests the results into findings. Rounds
//! are bounded; a run that exhausts them without findings aborts.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::mem;
use std::sync::Arc;

use super::inference_node_error;
use crate::config::ResearcherConfig;
use crate::engine::{
    CallId, FailureKind, Finding, NextHint, Node, NodeError, NodeName, RunState, ToolCallRequest,
    ToolOutcome,
};
use crate::inference::Inference;
use crate::provider::content_text;

const PLANNER_PROMPT: &str = "You plan web research for a newsroom. Given the topic, propose \
search queries that surface recent, substantive coverage. Reply with a JSON array of short \
search queries, nothing else.";

const SNIPPET_LIMIT: usize = 400;

/// Gathers research findings for the run's topic via search tools.
pub struct ResearcherNode {
    config: ResearcherConfig,
    inference: Arc<dyn Inference>,
}

impl ResearcherNode {
    pub fn new(config: ResearcherConfig, inference: Arc<dyn Inference>) -> Self {
        Self { config, inference }
    }

    async fn plan_queries(&self, state: &RunState) -> Result<Vec<String>, NodeError> {
        let tried: Vec<&str> = state
            .history
            .iter()
            .filter(|m| m.node == NodeName::Researcher)
            .map(|m| m.content.as_str())
            .collect();
        let context = format!(
            "Topic: {}\nAt most {} queries.\nAlready tried:\n{}",
            state.topic,
            self.config.max_queries,
            if tried.is_empty() {
                "nothing yet".to_string()
            } else {
                tried.join("\n")
            }
        );

        let reply = self
            .inference
            .complete(PLANNER_PROMPT, &context)
            .await
            .map_err(inference_node_error)?;
        let queries = parse_queries(&reply).ok_or_else(|| {
            NodeError::retryable(format!("planner reply is not a query list: {}", reply))
        })?;
        Ok(queries
            .into_iter()
            .take(self.config.max_queries)
            .collect())
    }

    fn search_call(&self, query: String) -> ToolCallRequest {
        let now = Utc::now();
        let start = now - Duration::days(self.config.window_days);
        ToolCallRequest {
            id: CallId::new(),
            tool: self.config.search_tool.clone(),
            args: json!({
                "query": query,
                "start_published_date": start.format("%Y-%m-%d").to_string(),
                "end_published_date": now.format("%Y-%m-%d").to_string(),
            }),
        }
    }
}

#[async_trait]
impl Node for ResearcherNode {
    fn name(&self) -> NodeName {
        NodeName::Researcher
    }

    async fn run(&self, mut state: RunState) -> Result<(RunState, NextHint), NodeError> {
        if !state.tool_results.is_empty() {
            let results = mem::take(&mut state.tool_results);
            let mut gathered = 0usize;
            for result in &results {
                if let ToolOutcome::Ok(value) = &result.outcome {
                    let findings = parse_findings(value);
                    gathered += findings.len();
                    state.research_findings.extend(findings);
                }
            }

            log::info!(
                "Research harvest: {} findings from {} calls",
                gathered,
                results.len()
            );
            if !state.research_findings.is_empty() {
                state.record(NodeName::Researcher, format!("gathered {} findings", gathered));
                return Ok((state, NextHint::ResearchReady));
            }
            log::warn!("No usable findings in tool output, planning another round");
        }

        if state.research_rounds >= self.config.max_rounds {
            return Err(NodeError::fatal(
                FailureKind::NoResearchFound,
                format!("no usable findings after {} rounds", state.research_rounds),
            ));
        }
        state.research_rounds += 1;

        let queries = self.plan_queries(&state).await?;
        state.record(
            NodeName::Researcher,
            format!("searching: {}", queries.join("; ")),
        );
        state.pending_tool_calls = queries.into_iter().map(|q| self.search_call(q)).collect();
        Ok((state, NextHint::NeedsTools))
    }
}

/// Extract a query list from a model reply. Tolerates prose around the JSON
/// array; returns `None` when no non-empty query survives.
fn parse_queries(reply: &str) -> Option<Vec<String>> {
    let start = reply.find('[')?;
    let end = reply.rfind(']')?;
    if end < start {
        return None;
    }

    let queries: Vec<String> = serde_json::from_str(&reply[start..=end]).ok()?;
    let queries: Vec<String> = queries
        .iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    if queries.is_empty() {
        None
    } else {
        Some(queries)
    }
}

/// Turn one search tool payload into findings. Search servers usually reply
/// with a `results` array, sometimes wrapped in text content.
fn parse_findings(value: &Value) -> Vec<Finding> {
    if let Some(results) = value["results"].as_array() {
        return collect_results(results);
    }
    if let Some(text) = content_text(value) {
        if let Ok(inner) = serde_json::from_str::<Value>(&text) {
            if let Some(results) = inner["results"].as_array() {
                return collect_results(results);
            }
        }
    }
    Vec::new()
}

fn collect_results(results: &[Value]) -> Vec<Finding> {
    results
        .iter()
        .filter_map(|item| {
            let title = item["title"].as_str().unwrap_or_default().trim().to_string();
            let url = item["url"].as_str().unwrap_or_default().trim().to_string();
            let snippet = ["snippet", "text", "description"]
                .iter()
                .find_map(|key| item[*key].as_str())
                .unwrap_or_default();
            let snippet: String = snippet.chars().take(SNIPPET_LIMIT).collect();

            if title.is_empty() && snippet.is_empty() {
                None
            } else {
                Some(Finding {
                    title,
                    url,
                    snippet,
                })
            }
        })
        .collect()
}
