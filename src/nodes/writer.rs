// SPDX-License-Identifier: MIT

//! Writer: turns research findings into an article draft.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;

use super::inference_node_error;
use crate::engine::{NextHint, Node, NodeError, NodeName, QualityVerdict, RunState};
use crate::inference::Inference;

const WRITER_PROMPT: &str = "You write concise, engaging LinkedIn articles from research \
notes. Pick the strongest finding, give the article a hook and a clear takeaway, and keep \
it under 300 words. Reply with the article text, no preamble.";

/// Drafts the article. Replacing the draft resets the quality verdict and
/// drops the previous draft's embedding.
pub struct WriterNode {
    inference: Arc<dyn Inference>,
}

impl WriterNode {
    pub fn new(inference: Arc<dyn Inference>) -> Self {
        Self { inference }
    }

    fn build_context(state: &RunState) -> String {
        let mut context = format!("Topic: {}\nResearch notes:\n", state.topic);
        for (i, finding) in state.research_findings.iter().enumerate() {
            let _ = writeln!(
                context,
                "{}. {} ({})\n{}",
                i + 1,
                finding.title,
                finding.url,
                finding.snippet
            );
        }

        if state.quality_verdict == QualityVerdict::Duplicate {
            if let Some(feedback) = state.last_message_from(NodeName::Quality) {
                let _ = write!(
                    context,
                    "\nThe previous draft was rejected: {}\nWrite a different article from a \
                     different finding.",
                    feedback.content
                );
            }
        }
        context
    }
}

#[async_trait]
impl Node for WriterNode {
    fn name(&self) -> NodeName {
        NodeName::Writer
    }

    async fn run(&self, mut state: RunState) -> Result<(RunState, NextHint), NodeError> {
        if state.research_findings.is_empty() {
            return Err(NodeError::precondition(
                "writer invoked without research findings",
            ));
        }

        let context = Self::build_context(&state);
        let reply = self
            .inference
            .complete(WRITER_PROMPT, &context)
            .await
            .map_err(inference_node_error)?;
        let draft = reply.trim().to_string();
        if draft.is_empty() {
            return Err(NodeError::retryable("model returned an empty draft"));
        }

        state.record(NodeName::Writer, format!("drafted {} chars", draft.len()));
        state.draft = Some(draft);
        state.quality_verdict = QualityVerdict::Unchecked;
        state.draft_embedding = None;
        Ok((state, NextHint::DraftReady))
    }
}
