// SPDX-License-Identifier: MIT

//! Run state carried between nodes and snapshotted into checkpoints.
//!
//! Nodes receive the state by value and return the updated copy. History
//! entries carry no timestamps so that a resumed run replays to a state
//! equal to an uninterrupted one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::node::{NextHint, NodeName};

/// Identifier of a single workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifier of one tool call within a dispatch batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One entry in the run's conversational record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub node: NodeName,
    pub content: String,
}

/// A single research result gathered by the researcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Outcome of the uniqueness gate for the current draft.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityVerdict {
    #[default]
    Unchecked,
    Unique,
    Duplicate,
}

/// A tool invocation requested by a node, executed by the dispatch node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: CallId,
    pub tool: String,
    pub args: Value,
}

/// Result of one dispatched tool call, keyed by the request's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: CallId,
    pub tool: String,
    pub outcome: ToolOutcome,
}

/// Per-call outcome; a failed call never aborts its batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok(Value),
    Failed(String),
    Canceled,
}

/// Full state of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: RunId,
    pub topic: String,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub draft: Option<String>,
    #[serde(default)]
    pub research_findings: Vec<Finding>,
    #[serde(default)]
    pub quality_verdict: QualityVerdict,
    /// Transient: filled by a planning node, drained by tool dispatch.
    #[serde(default)]
    pub pending_tool_calls: Vec<ToolCallRequest>,
    /// Transient: filled by tool dispatch, drained by the requesting node.
    #[serde(default)]
    pub tool_results: Vec<ToolCallResult>,
    #[serde(default)]
    pub research_rounds: u32,
    #[serde(default)]
    pub rejected_drafts: u32,
    /// Embedding of the current draft, set by the quality gate and cleared
    /// on redraft. The publish commit records exactly this vector.
    #[serde(default)]
    pub draft_embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub published_article: Option<String>,
    /// Hint produced by the node that produced this snapshot.
    #[serde(default)]
    pub last_hint: Option<NextHint>,
}

impl RunState {
    /// Fresh state for a new run on the given topic.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            topic: topic.into(),
            history: Vec::new(),
            draft: None,
            research_findings: Vec::new(),
            quality_verdict: QualityVerdict::Unchecked,
            pending_tool_calls: Vec::new(),
            tool_results: Vec::new(),
            research_rounds: 0,
            rejected_drafts: 0,
            draft_embedding: None,
            published_article: None,
            last_hint: None,
        }
    }

    /// Append a history entry attributed to `node`.
    pub fn record(&mut self, node: NodeName, content: impl Into<String>) {
        self.history.push(Message {
            node,
            content: content.into(),
        });
    }

    /// Latest history entry written by `node`, if any.
    pub fn last_message_from(&self, node: NodeName) -> Option<&Message> {
        self.history.iter().rev().find(|m| m.node == node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fresh_state_is_empty() {
        let state = RunState::new("quantitative finance");
        assert_eq!(state.topic, "quantitative finance");
        assert!(state.history.is_empty());
        assert!(state.draft.is_none());
        assert_eq!(state.quality_verdict, QualityVerdict::Unchecked);
        assert_eq!(state.rejected_drafts, 0);
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let mut state = RunState::new("markets");
        state.record(NodeName::Researcher, "searching: rates");
        state.research_findings.push(Finding {
            title: "Rates diverge".to_string(),
            url: "https://example.com/rates".to_string(),
            snippet: "Central banks split".to_string(),
        });
        state.draft = Some("Article text".to_string());
        state.quality_verdict = QualityVerdict::Unique;
        state.draft_embedding = Some(vec![0.1, 0.2]);
        state.last_hint = Some(NextHint::QualityChecked);
        state.pending_tool_calls.push(ToolCallRequest {
            id: CallId::new(),
            tool: "search_and_content".to_string(),
            args: json!({"query": "rates"}),
        });

        let encoded = serde_json::to_string(&state).unwrap();
        let decoded: RunState = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let raw = json!({
            "run_id": RunId::new().to_string(),
            "topic": "energy"
        });

        let state: RunState = serde_json::from_value(raw).unwrap();
        assert_eq!(state.quality_verdict, QualityVerdict::Unchecked);
        assert!(state.last_hint.is_none());
        assert!(state.tool_results.is_empty());
    }

    #[test]
    fn test_last_message_from_picks_the_latest() {
        let mut state = RunState::new("ai");
        state.record(NodeName::Quality, "first");
        state.record(NodeName::Writer, "drafted");
        state.record(NodeName::Quality, "second");

        let message = state.last_message_from(NodeName::Quality).unwrap();
        assert_eq!(message.content, "second");
        assert!(state.last_message_from(NodeName::Publisher).is_none());
    }

    #[test]
    fn test_run_ids_parse_back() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
