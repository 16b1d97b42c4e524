//! Workflow engine: a bounded, checkpointed walk over the node graph.
//!
//! The engine invokes one node at a time, persists a checkpoint after every
//! invocation, and resolves the node's hint against the transition table.
//! The publish side effect is special: its terminal checkpoint and the
//! episodic record commit in a single store transaction.

pub mod error;
pub mod node;
pub mod state;
pub mod transition;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};

use crate::config::EngineConfig;
use crate::store::{Checkpoint, CheckpointLog, EpisodicRecord};

pub use error::{EngineError, FailureKind, NodeError};
pub use node::{NextHint, Node, NodeName};
pub use state::{
    CallId, Finding, Message, QualityVerdict, RunId, RunState, ToolCallRequest, ToolCallResult,
    ToolOutcome,
};
pub use transition::{Route, TransitionTable};

/// Cooperative cancellation signal, checked between steps and before each
/// queued tool call.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Owner side of a cancel token.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// A fresh handle/token pair. Dropping the handle leaves the token in its
/// last state.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Drives runs over a fixed node team and transition table.
pub struct WorkflowEngine {
    nodes: HashMap<NodeName, Arc<dyn Node>>,
    transitions: TransitionTable,
    log: Arc<dyn CheckpointLog>,
    config: EngineConfig,
    cancel: CancelToken,
}

impl WorkflowEngine {
    pub fn new(
        nodes: HashMap<NodeName, Arc<dyn Node>>,
        transitions: TransitionTable,
        log: Arc<dyn CheckpointLog>,
        config: EngineConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            nodes,
            transitions,
            log,
            config,
            cancel,
        }
    }

    /// Run a fresh workflow to termination.
    pub async fn run(&self, initial: RunState) -> Result<RunState, EngineError> {
        log::info!(
            "Starting run {} on topic '{}'",
            initial.run_id,
            initial.topic
        );
        self.drive(initial, NodeName::Supervisor, 0).await
    }

    /// Continue a run from its last checkpoint. Refuses runs that already
    /// finished, successfully or not.
    pub async fn resume(&self, run_id: RunId) -> Result<RunState, EngineError> {
        let checkpoint = self
            .log
            .latest(run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))?;

        if let Some(error) = checkpoint.error {
            return Err(EngineError::RunFinished(
                run_id,
                format!("failed: {}", error),
            ));
        }

        let hint = match checkpoint.state.last_hint {
            Some(NextHint::Published) => {
                return Err(EngineError::RunFinished(
                    run_id,
                    "already published".to_string(),
                ))
            }
            Some(hint) => hint,
            None => {
                return Err(EngineError::RunFinished(
                    run_id,
                    "checkpoint carries no hint".to_string(),
                ))
            }
        };

        let next = match self.resolve(checkpoint.node, hint)? {
            Route::Node(next) => next,
            Route::Terminal => {
                return Err(EngineError::RunFinished(
                    run_id,
                    "already terminal".to_string(),
                ))
            }
        };

        log::info!(
            "Resuming run {} from step {} at {}",
            run_id,
            checkpoint.step,
            next
        );
        self.drive(checkpoint.state, next, checkpoint.step).await
    }

    fn resolve(&self, from: NodeName, hint: NextHint) -> Result<Route, EngineError> {
        self.transitions.resolve(from, hint).ok_or_else(|| {
            EngineError::Configuration(format!("no transition from {} on hint {}", from, hint))
        })
    }

    async fn drive(
        &self,
        mut state: RunState,
        mut current: NodeName,
        mut step: u64,
    ) -> Result<RunState, EngineError> {
        let run_id = state.run_id;
        let started = Instant::now();
        let budget = Duration::from_secs(self.config.run_timeout_secs);

        loop {
            if step >= self.config.max_steps {
                return self
                    .abort(
                        state,
                        current,
                        step,
                        FailureKind::StepBudgetExceeded,
                        format!("step budget of {} exhausted", self.config.max_steps),
                    )
                    .await;
            }
            if started.elapsed() >= budget {
                return self
                    .abort(
                        state,
                        current,
                        step,
                        FailureKind::RunTimedOut,
                        format!("run exceeded {}s", self.config.run_timeout_secs),
                    )
                    .await;
            }
            if self.cancel.is_canceled() {
                return self
                    .abort(
                        state,
                        current,
                        step,
                        FailureKind::Canceled,
                        "run canceled".to_string(),
                    )
                    .await;
            }

            let node = match self.nodes.get(&current) {
                Some(node) => node.clone(),
                None => {
                    return self
                        .abort(
                            state,
                            current,
                            step,
                            FailureKind::Configuration,
                            format!("no node registered for {}", current),
                        )
                        .await
                }
            };

            let (mut next_state, hint) = match self.invoke_with_retry(node.as_ref(), &state).await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    let kind = err.kind();
                    let message = err.message().to_string();
                    return self.abort(state, current, step, kind, message).await;
                }
            };

            step += 1;
            next_state.last_hint = Some(hint);
            log::info!("Run {} step {}: {} -> {}", run_id, step, current, hint);

            if hint == NextHint::Published {
                return self.commit_published(next_state, current, step).await;
            }

            self.log
                .append(Checkpoint::new(step, current, &next_state, None))
                .await?;

            match self.transitions.resolve(current, hint) {
                Some(Route::Node(next)) => {
                    state = next_state;
                    current = next;
                }
                Some(Route::Terminal) => {
                    log::info!("Run {} reached a terminal state at step {}", run_id, step);
                    return Ok(next_state);
                }
                None => {
                    return self
                        .abort(
                            next_state,
                            current,
                            step,
                            FailureKind::Configuration,
                            format!("no transition from {} on hint {}", current, hint),
                        )
                        .await
                }
            }
        }
    }

    /// Re-invoke a node while it fails with retryable errors. Every attempt
    /// starts from the same state snapshot.
    async fn invoke_with_retry(
        &self,
        node: &dyn Node,
        state: &RunState,
    ) -> Result<(RunState, NextHint), NodeError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match node.run(state.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(NodeError::Retryable(message)) => {
                    if attempt > self.config.retry_limit {
                        return Err(NodeError::fatal(
                            FailureKind::RetryExhausted,
                            format!(
                                "{} failed after {} attempts: {}",
                                node.name(),
                                attempt,
                                message
                            ),
                        ));
                    }
                    let backoff =
                        Duration::from_millis(self.config.retry_backoff_ms * attempt as u64);
                    log::warn!(
                        "{} attempt {} failed ({}), retrying in {:?}",
                        node.name(),
                        attempt,
                        message,
                        backoff
                    );
                    sleep(backoff).await;
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    /// Atomically persist the terminal checkpoint and the episodic record.
    /// The publisher is never re-invoked once its hint was observed, so a
    /// failed commit aborts the run instead of retrying the side effect.
    async fn commit_published(
        &self,
        state: RunState,
        node: NodeName,
        step: u64,
    ) -> Result<RunState, EngineError> {
        let run_id = state.run_id;

        let article = match state.published_article.clone() {
            Some(article) => article,
            None => {
                return self
                    .abort(
                        state,
                        node,
                        step,
                        FailureKind::PreconditionViolation,
                        "published hint without a published article".to_string(),
                    )
                    .await
            }
        };
        let embedding = match state.draft_embedding.clone() {
            Some(embedding) => embedding,
            None => {
                return self
                    .abort(
                        state,
                        node,
                        step,
                        FailureKind::PreconditionViolation,
                        "published hint without a draft embedding".to_string(),
                    )
                    .await
            }
        };

        let record = EpisodicRecord {
            run_id,
            article,
            embedding,
            published_at: Utc::now(),
        };
        let checkpoint = Checkpoint::new(step, node, &state, None);

        if let Err(e) = self.log.commit_published(checkpoint, record).await {
            return self
                .abort(
                    state,
                    node,
                    step,
                    FailureKind::Storage,
                    format!("publish commit failed: {}", e),
                )
                .await;
        }

        log::info!("Run {} published and recorded at step {}", run_id, step);
        Ok(state)
    }

    /// Write the annotated final checkpoint and surface the abort. The
    /// failure checkpoint is best effort; losing it must not mask the error.
    async fn abort(
        &self,
        state: RunState,
        node: NodeName,
        step: u64,
        kind: FailureKind,
        message: String,
    ) -> Result<RunState, EngineError> {
        let run_id = state.run_id;
        log::error!(
            "Run {} aborted at step {} ({}): {}",
            run_id,
            step,
            kind,
            message
        );

        let annotation = format!("{}: {}", kind, message);
        let checkpoint = Checkpoint::new(step + 1, node, &state, Some(annotation));
        if let Err(e) = self.log.append(checkpoint).await {
            log::error!("Failed to record failure checkpoint for run {}: {}", run_id, e);
        }

        Err(EngineError::Aborted {
            run_id,
            kind,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use crate::store::StoreError;

    #[derive(Default)]
    struct MemoryLog {
        checkpoints: Mutex<Vec<Checkpoint>>,
    }

    #[async_trait]
    impl CheckpointLog for MemoryLog {
        async fn append(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
            self.checkpoints.lock().unwrap().push(checkpoint);
            Ok(())
        }

        async fn latest(&self, run_id: RunId) -> Result<Option<Checkpoint>, StoreError> {
            Ok(self
                .checkpoints
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.run_id == run_id)
                .max_by_key(|c| c.step)
                .cloned())
        }

        async fn history(&self, run_id: RunId) -> Result<Vec<Checkpoint>, StoreError> {
            let mut trail: Vec<Checkpoint> = self
                .checkpoints
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.run_id == run_id)
                .cloned()
                .collect();
            trail.sort_by_key(|c| c.step);
            Ok(trail)
        }

        async fn commit_published(
            &self,
            checkpoint: Checkpoint,
            _record: EpisodicRecord,
        ) -> Result<(), StoreError> {
            self.append(checkpoint).await
        }
    }

    /// Node failing with retryable errors until `succeed_on` is reached.
    struct FlakyNode {
        attempts: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl Node for FlakyNode {
        fn name(&self) -> NodeName {
            NodeName::Researcher
        }

        async fn run(&self, state: RunState) -> Result<(RunState, NextHint), NodeError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < self.succeed_on {
                Err(NodeError::retryable("upstream hiccup"))
            } else {
                Ok((state, NextHint::ResearchReady))
            }
        }
    }

    fn engine_with(node: Arc<dyn Node>) -> WorkflowEngine {
        let mut nodes: HashMap<NodeName, Arc<dyn Node>> = HashMap::new();
        nodes.insert(node.name(), node);
        let config = EngineConfig {
            retry_backoff_ms: 1,
            ..EngineConfig::default()
        };
        WorkflowEngine::new(
            nodes,
            TransitionTable::standard(),
            Arc::new(MemoryLog::default()),
            config,
            cancel_pair().1,
        )
    }

    #[tokio::test]
    async fn test_retryable_failures_are_retried_until_success() {
        let node = Arc::new(FlakyNode {
            attempts: AtomicU32::new(0),
            succeed_on: 3,
        });
        let engine = engine_with(node.clone());

        let state = RunState::new("finance");
        let outcome = engine.invoke_with_retry(node.as_ref(), &state).await;

        assert!(outcome.is_ok());
        assert_eq!(node.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_turns_into_fatal_error() {
        let node = Arc::new(FlakyNode {
            attempts: AtomicU32::new(0),
            succeed_on: u32::MAX,
        });
        let engine = engine_with(node.clone());

        let state = RunState::new("finance");
        let err = engine
            .invoke_with_retry(node.as_ref(), &state)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::RetryExhausted);
        // Initial attempt plus the configured retries.
        assert_eq!(node.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_token_reports_after_cancel() {
        let (handle, token) = cancel_pair();
        assert!(!token.is_canceled());
        handle.cancel();
        assert!(token.is_canceled());
    }
}
