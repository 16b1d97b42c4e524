// SPDX-License-Identifier: MIT

//! Episodic store interfaces: the append-only checkpoint log and the
//! similarity index over published articles.
//!
//! The two traits are deliberately narrow so tests can substitute either
//! side independently; `SqliteStore` implements both over one database.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::node::NodeName;
use crate::engine::state::{RunId, RunState};

pub use sqlite::SqliteStore;

/// Storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Other(String),
}

/// Snapshot of a run after one node invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: RunId,
    /// Node invocations completed so far; strictly increasing per run.
    pub step: u64,
    /// The node whose invocation produced this snapshot.
    pub node: NodeName,
    pub state: RunState,
    /// Set on the final checkpoint of a failed run.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(step: u64, node: NodeName, state: &RunState, error: Option<String>) -> Self {
        Self {
            run_id: state.run_id,
            step,
            node,
            state: state.clone(),
            error,
            created_at: Utc::now(),
        }
    }
}

/// One published article with the embedding that cleared the uniqueness
/// gate. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicRecord {
    pub run_id: RunId,
    pub article: String,
    pub embedding: Vec<f32>,
    pub published_at: DateTime<Utc>,
}

/// Append-only checkpoint log, one row per completed step.
#[async_trait]
pub trait CheckpointLog: Send + Sync {
    async fn append(&self, checkpoint: Checkpoint) -> Result<(), StoreError>;

    async fn latest(&self, run_id: RunId) -> Result<Option<Checkpoint>, StoreError>;

    /// Full trail for a run, ordered by step. Lets operators inspect a
    /// failed run without replaying it.
    async fn history(&self, run_id: RunId) -> Result<Vec<Checkpoint>, StoreError>;

    /// Persist the terminal checkpoint and the published record together.
    /// Either both survive or neither does.
    async fn commit_published(
        &self,
        checkpoint: Checkpoint,
        record: EpisodicRecord,
    ) -> Result<(), StoreError>;
}

/// Read side of the uniqueness gate.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Up to `k` records most similar to `embedding`, best first, each with
    /// its cosine similarity score.
    async fn nearest(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<(EpisodicRecord, f32)>, StoreError>;
}

/// Cosine similarity of two vectors. Returns 0.0 when the dimensions
/// disagree or either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.5, 0.2];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_of_opposite_vectors_is_negative_one() {
        let a = vec![1.0, 2.0];
        let b = vec![-1.0, -2.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
