// SPDX-License-Identifier: MIT

//! Quality gate: embeds the draft and compares it against published
//! articles. A near-duplicate goes back for a redraft; the supervisor
//! enforces the redraft budget.

use async_trait::async_trait;
use std::sync::Arc;

use super::inference_node_error;
use crate::config::QualityConfig;
use crate::engine::{NextHint, Node, NodeError, NodeName, QualityVerdict, RunState};
use crate::inference::Inference;
use crate::store::SimilarityIndex;

/// Vets the draft for similarity to anything already published.
pub struct QualityNode {
    config: QualityConfig,
    inference: Arc<dyn Inference>,
    index: Arc<dyn SimilarityIndex>,
}

impl QualityNode {
    pub fn new(
        config: QualityConfig,
        inference: Arc<dyn Inference>,
        index: Arc<dyn SimilarityIndex>,
    ) -> Self {
        Self {
            config,
            inference,
            index,
        }
    }
}

#[async_trait]
impl Node for QualityNode {
    fn name(&self) -> NodeName {
        NodeName::Quality
    }

    async fn run(&self, mut state: RunState) -> Result<(RunState, NextHint), NodeError> {
        let draft = match state.draft.as_deref() {
            Some(d) if !d.trim().is_empty() => d.to_string(),
            _ => {
                return Err(NodeError::precondition(
                    "quality check requires a non-empty draft",
                ))
            }
        };

        let embedding = self
            .inference
            .embed(&draft)
            .await
            .map_err(inference_node_error)?;
        let neighbors = self
            .index
            .nearest(&embedding, self.config.neighbor_count)
            .await
            .map_err(|e| NodeError::retryable(format!("similarity lookup failed: {}", e)))?;

        // Only a score strictly above the threshold counts as a duplicate.
        let (verdict, note) = match neighbors.first() {
            Some((record, score)) if *score > self.config.similarity_threshold => {
                state.rejected_drafts += 1;
                (
                    QualityVerdict::Duplicate,
                    format!(
                        "draft is too similar to article from run {} (score {:.2})",
                        record.run_id, score
                    ),
                )
            }
            Some((_, score)) => (
                QualityVerdict::Unique,
                format!(
                    "nearest published article scored {:.2}, below {:.2}",
                    score, self.config.similarity_threshold
                ),
            ),
            None => (
                QualityVerdict::Unique,
                "no published articles to compare against".to_string(),
            ),
        };

        log::info!("Quality verdict for run {}: {:?}", state.run_id, verdict);
        state.quality_verdict = verdict;
        state.draft_embedding = Some(embedding);
        state.record(NodeName::Quality, note);
        Ok((state, NextHint::QualityChecked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RunId;
    use crate::inference::InferenceError;
    use crate::store::{EpisodicRecord, StoreError};
    use chrono::Utc;

    struct EmbedStub;

    #[async_trait]
    impl Inference for EmbedStub {
        async fn complete(&self, _: &str, _: &str) -> Result<String, InferenceError> {
            Ok(String::new())
        }

        async fn embed(&self, _: &str) -> Result<Vec<f32>, InferenceError> {
            Ok(vec![1.0, 0.0])
        }
    }

    struct FixedIndex {
        neighbors: Vec<(EpisodicRecord, f32)>,
    }

    #[async_trait]
    impl SimilarityIndex for FixedIndex {
        async fn nearest(
            &self,
            _: &[f32],
            k: usize,
        ) -> Result<Vec<(EpisodicRecord, f32)>, StoreError> {
            Ok(self.neighbors.iter().take(k).cloned().collect())
        }
    }

    fn published() -> EpisodicRecord {
        EpisodicRecord {
            run_id: RunId::new(),
            article: "old article".to_string(),
            embedding: vec![1.0, 0.0],
            published_at: Utc::now(),
        }
    }

    fn node_with_neighbors(neighbors: Vec<(EpisodicRecord, f32)>) -> QualityNode {
        QualityNode::new(
            QualityConfig::default(),
            Arc::new(EmbedStub),
            Arc::new(FixedIndex { neighbors }),
        )
    }

    fn drafted_state() -> RunState {
        let mut state = RunState::new("markets");
        state.draft = Some("A fresh take".to_string());
        state
    }

    #[tokio::test]
    async fn test_empty_store_passes_the_draft() {
        let node = node_with_neighbors(Vec::new());
        let (state, hint) = node.run(drafted_state()).await.unwrap();

        assert_eq!(hint, NextHint::QualityChecked);
        assert_eq!(state.quality_verdict, QualityVerdict::Unique);
        assert_eq!(state.rejected_drafts, 0);
        assert_eq!(state.draft_embedding.as_deref(), Some(&[1.0, 0.0][..]));
        let note = state.last_message_from(NodeName::Quality).unwrap();
        assert!(note.content.contains("no published articles"));
    }

    #[tokio::test]
    async fn test_near_duplicates_are_rejected() {
        let node = node_with_neighbors(vec![(published(), 0.93)]);
        let (state, _) = node.run(drafted_state()).await.unwrap();

        assert_eq!(state.quality_verdict, QualityVerdict::Duplicate);
        assert_eq!(state.rejected_drafts, 1);
        let note = state.last_message_from(NodeName::Quality).unwrap();
        assert!(note.content.contains("too similar"));
        assert!(note.content.contains("0.93"));
    }

    #[tokio::test]
    async fn test_a_score_at_the_threshold_still_passes() {
        let node = node_with_neighbors(vec![(published(), 0.8)]);
        let (state, _) = node.run(drafted_state()).await.unwrap();
        assert_eq!(state.quality_verdict, QualityVerdict::Unique);
    }

    #[tokio::test]
    async fn test_distant_neighbors_pass_the_draft() {
        let node = node_with_neighbors(vec![(published(), 0.41)]);
        let (state, _) = node.run(drafted_state()).await.unwrap();

        assert_eq!(state.quality_verdict, QualityVerdict::Unique);
        let note = state.last_message_from(NodeName::Quality).unwrap();
        assert!(note.content.contains("0.41"));
    }

    #[tokio::test]
    async fn test_a_missing_draft_violates_the_contract() {
        let node = node_with_neighbors(Vec::new());
        let err = node.run(RunState::new("markets")).await.unwrap_err();
        assert!(err.to_string().contains("precondition_violation"));
    }
}
