// SPDX-License-Identifier: MIT

//! Supervisor: routes the run to the next role.
//!
//! Routing is a deterministic function of the run state so that a resumed
//! run takes the same path as an uninterrupted one. An optional advisor
//! model is consulted for a second opinion, but the table decision always
//! stands.

use async_trait::async_trait;
use std::sync::Arc;

use crate::engine::{FailureKind, NextHint, Node, NodeError, NodeName, QualityVerdict, RunState};
use crate::inference::Inference;

const ADVISOR_PROMPT: &str = "You coordinate a newsroom workflow. Given the run summary, \
answer with exactly one of: needs_research, needs_draft, needs_quality_check, \
ready_to_publish. Reply with the token only.";

/// Coordinates the team by inspecting the state and picking the next role.
pub struct SupervisorNode {
    max_redrafts: u32,
    advisor: Option<Arc<dyn Inference>>,
}

impl SupervisorNode {
    pub fn new(max_redrafts: u32) -> Self {
        Self {
            max_redrafts,
            advisor: None,
        }
    }

    /// Attach an advisor model that is consulted on every decision.
    pub fn with_advisor(mut self, advisor: Arc<dyn Inference>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    fn decide(&self, state: &RunState) -> Result<NextHint, NodeError> {
        if state.research_findings.is_empty() {
            return Ok(NextHint::NeedsResearch);
        }
        if state.draft.is_none() {
            return Ok(NextHint::NeedsDraft);
        }
        match state.quality_verdict {
            QualityVerdict::Unchecked => Ok(NextHint::NeedsQualityCheck),
            QualityVerdict::Unique => Ok(NextHint::ReadyToPublish),
            QualityVerdict::Duplicate if state.rejected_drafts < self.max_redrafts => {
                Ok(NextHint::NeedsDraft)
            }
            QualityVerdict::Duplicate => Err(NodeError::fatal(
                FailureKind::DuplicateContentRejected,
                format!(
                    "{} drafts rejected as duplicates, giving up",
                    state.rejected_drafts
                ),
            )),
        }
    }

    fn summarize(state: &RunState) -> String {
        format!(
            "Topic: {}\nFindings: {}\nDraft: {}\nVerdict: {:?}\nRejected drafts: {}",
            state.topic,
            state.research_findings.len(),
            if state.draft.is_some() {
                "present"
            } else {
                "missing"
            },
            state.quality_verdict,
            state.rejected_drafts
        )
    }

    async fn consult_advisor(&self, state: &RunState, decision: NextHint) {
        let Some(advisor) = &self.advisor else {
            return;
        };

        match advisor
            .complete(ADVISOR_PROMPT, &Self::summarize(state))
            .await
        {
            Ok(reply) => match reply.trim().parse::<NextHint>() {
                Ok(hint) if hint == decision => {
                    log::debug!("Advisor agrees with {}", decision);
                }
                Ok(hint) => {
                    log::warn!("Advisor proposed {}, keeping {}", hint, decision);
                }
                Err(_) => {
                    log::warn!("Advisor reply {:?} is not a routing token", reply.trim());
                }
            },
            Err(e) => log::warn!("Advisor unavailable: {}", e),
        }
    }
}

#[async_trait]
impl Node for SupervisorNode {
    fn name(&self) -> NodeName {
        NodeName::Supervisor
    }

    async fn run(&self, mut state: RunState) -> Result<(RunState, NextHint), NodeError> {
        let decision = self.decide(&state)?;
        self.consult_advisor(&state, decision).await;

        state.record(NodeName::Supervisor, format!("routing: {}", decision));
        Ok((state, decision))
    }
}
