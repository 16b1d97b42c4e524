// SPDX-License-Identifier: MIT

//! The node contract shared by every workflow role.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::NodeError;
use super::state::RunState;

/// The closed set of nodes a run can visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeName {
    Supervisor,
    Researcher,
    Writer,
    Quality,
    Publisher,
    ToolDispatch,
}

impl NodeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeName::Supervisor => "supervisor",
            NodeName::Researcher => "researcher",
            NodeName::Writer => "writer",
            NodeName::Quality => "quality",
            NodeName::Publisher => "publisher",
            NodeName::ToolDispatch => "tool_dispatch",
        }
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supervisor" => Ok(NodeName::Supervisor),
            "researcher" => Ok(NodeName::Researcher),
            "writer" => Ok(NodeName::Writer),
            "quality" => Ok(NodeName::Quality),
            "publisher" => Ok(NodeName::Publisher),
            "tool_dispatch" => Ok(NodeName::ToolDispatch),
            other => Err(format!("unknown node name: {}", other)),
        }
    }
}

/// Symbolic signal a node returns to describe workflow progress. Hints never
/// name nodes; the transition table decides where control flows next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextHint {
    NeedsResearch,
    NeedsDraft,
    NeedsQualityCheck,
    ReadyToPublish,
    NeedsTools,
    ResearchReady,
    DraftReady,
    QualityChecked,
    ToolsApplied,
    Published,
}

impl NextHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            NextHint::NeedsResearch => "needs_research",
            NextHint::NeedsDraft => "needs_draft",
            NextHint::NeedsQualityCheck => "needs_quality_check",
            NextHint::ReadyToPublish => "ready_to_publish",
            NextHint::NeedsTools => "needs_tools",
            NextHint::ResearchReady => "research_ready",
            NextHint::DraftReady => "draft_ready",
            NextHint::QualityChecked => "quality_checked",
            NextHint::ToolsApplied => "tools_applied",
            NextHint::Published => "published",
        }
    }
}

impl fmt::Display for NextHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NextHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "needs_research" => Ok(NextHint::NeedsResearch),
            "needs_draft" => Ok(NextHint::NeedsDraft),
            "needs_quality_check" => Ok(NextHint::NeedsQualityCheck),
            "ready_to_publish" => Ok(NextHint::ReadyToPublish),
            "needs_tools" => Ok(NextHint::NeedsTools),
            "research_ready" => Ok(NextHint::ResearchReady),
            "draft_ready" => Ok(NextHint::DraftReady),
            "quality_checked" => Ok(NextHint::QualityChecked),
            "tools_applied" => Ok(NextHint::ToolsApplied),
            "published" => Ok(NextHint::Published),
            other => Err(format!("unknown hint: {}", other)),
        }
    }
}

/// A workflow role. Nodes take the run state, do their one job, and hand
/// back the updated state together with a hint about what happened.
#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> NodeName;

    async fn run(&self, state: RunState) -> Result<(RunState, NextHint), NodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_names_roundtrip_through_strings() {
        let names = [
            NodeName::Supervisor,
            NodeName::Researcher,
            NodeName::Writer,
            NodeName::Quality,
            NodeName::Publisher,
            NodeName::ToolDispatch,
        ];

        for name in names {
            let parsed: NodeName = name.to_string().parse().unwrap();
            assert_eq!(parsed, name);
        }
    }

    #[test]
    fn test_hints_roundtrip_through_strings() {
        let hints = [
            NextHint::NeedsResearch,
            NextHint::NeedsDraft,
            NextHint::NeedsQualityCheck,
            NextHint::ReadyToPublish,
            NextHint::NeedsTools,
            NextHint::ResearchReady,
            NextHint::DraftReady,
            NextHint::QualityChecked,
            NextHint::ToolsApplied,
            NextHint::Published,
        ];

        for hint in hints {
            let parsed: NextHint = hint.to_string().parse().unwrap();
            assert_eq!(parsed, hint);
        }
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        assert!("janitor".parse::<NodeName>().is_err());
        assert!("go_home".parse::<NextHint>().is_err());
    }
}
