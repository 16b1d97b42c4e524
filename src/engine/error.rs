// SPDX-License-Identifier: MIT

//! Typed error handling for newsdesk
//!
//! Node failures split into retryable and fatal variants; the engine only
//! re-invokes a node for retryable errors. Terminal failures carry a
//! `FailureKind` that is also written into the run's final checkpoint.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::state::RunId;
use crate::store::StoreError;

/// Failure classification recorded in a run's final checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A retryable error survived every retry attempt.
    RetryExhausted,
    /// Missing or inconsistent wiring: unknown tool, unresolvable transition.
    Configuration,
    /// A node was invoked with state that violates its contract.
    PreconditionViolation,
    /// Every redraft came back too similar to an already published article.
    DuplicateContentRejected,
    /// Research produced no usable findings within the round budget.
    NoResearchFound,
    /// The step budget ran out before the run terminated.
    StepBudgetExceeded,
    /// The wall-clock budget ran out before the run terminated.
    RunTimedOut,
    /// The run was canceled cooperatively.
    Canceled,
    /// The store failed while persisting run progress.
    Storage,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::RetryExhausted => "retry_exhausted",
            FailureKind::Configuration => "configuration",
            FailureKind::PreconditionViolation => "precondition_violation",
            FailureKind::DuplicateContentRejected => "duplicate_content_rejected",
            FailureKind::NoResearchFound => "no_research_found",
            FailureKind::StepBudgetExceeded => "step_budget_exceeded",
            FailureKind::RunTimedOut => "run_timed_out",
            FailureKind::Canceled => "canceled",
            FailureKind::Storage => "storage",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a single node invocation.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Transient failure; the engine may re-invoke the node.
    #[error("retryable: {0}")]
    Retryable(String),

    /// Unrecoverable failure; the engine aborts the run.
    #[error("{kind}: {message}")]
    Fatal { kind: FailureKind, message: String },
}

impl NodeError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable(message.into())
    }

    pub fn fatal(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Fatal {
            kind,
            message: message.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::fatal(FailureKind::PreconditionViolation, message)
    }

    /// The kind this error aborts the run with. Retryable errors only reach
    /// this point once retries are exhausted.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Retryable(_) => FailureKind::RetryExhausted,
            Self::Fatal { kind, .. } => *kind,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(message) => message,
            Self::Fatal { message, .. } => message,
        }
    }
}

/// Terminal error for a workflow run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The run aborted; a final checkpoint annotated with `kind` was written.
    #[error("run {run_id} aborted ({kind}): {message}")]
    Aborted {
        run_id: RunId,
        kind: FailureKind,
        message: String,
    },

    /// Engine wiring is inconsistent with the transition table.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The store failed outside a node invocation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Resume target has no checkpoints.
    #[error("no checkpoints recorded for run {0}")]
    RunNotFound(RunId),

    /// Resume target already reached a terminal state.
    #[error("run {0} already finished: {1}")]
    RunFinished(RunId, String),
}
