// SPDX-License-Identifier: MIT

//! Newsdesk: a supervised agent workflow that researches a topic, drafts an
//! article, vets it against everything already published, and pushes it out
//! through an external publishing tool.
//!
//! A run is a checkpointed walk over a fixed node graph. The supervisor
//! fans out to the worker roles and every worker hands control back:
//!
//! ```text
//! supervisor -- needs_research -------> researcher
//! supervisor -- needs_draft ----------> writer
//! supervisor -- needs_quality_check --> quality
//! supervisor -- ready_to_publish -----> publisher --> published (terminal)
//! researcher -- needs_tools ----------> tool_dispatch
//! ```
//!
//! Every step appends a checkpoint. An interrupted run resumes from its
//! latest checkpoint and replays to the same state an uninterrupted run
//! would have reached; the publish step commits atomically with its
//! episodic record so an article can never be posted twice.

pub mod config;
pub mod engine;
pub mod inference;
pub mod nodes;
pub mod provider;
pub mod store;

pub use config::NewsdeskConfig;
pub use engine::{
    cancel_pair, CancelHandle, CancelToken, EngineError, FailureKind, NextHint, Node, NodeError,
    NodeName, RunId, RunState, TransitionTable, WorkflowEngine,
};
pub use inference::{Inference, OpenAiBackend};
pub use provider::{CapabilityProvider, ProviderManager};
pub use store::{Checkpoint, CheckpointLog, EpisodicRecord, SimilarityIndex, SqliteStore};
