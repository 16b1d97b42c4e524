// SPDX-License-Identifier: MIT

//! The newsdesk team: one node per production role, plus the shared
//! tool dispatcher. [`standard_team`] assembles the full set from
//! configuration.

pub mod dispatch;
pub mod publisher;
pub mod quality;
pub mod researcher;
pub mod supervisor;
pub mod writer;

pub use dispatch::ToolDispatchNode;
pub use publisher::PublisherNode;
pub use quality::QualityNode;
pub use researcher::ResearcherNode;
pub use supervisor::SupervisorNode;
pub use writer::WriterNode;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::NewsdeskConfig;
use crate::engine::{CancelToken, FailureKind, Node, NodeError, NodeName};
use crate::inference::{Inference, InferenceError};
use crate::provider::{CapabilityProvider, ToolError};
use crate::store::SimilarityIndex;

/// Build the standard node set for a production run.
pub fn standard_team(
    config: &NewsdeskConfig,
    inference: Arc<dyn Inference>,
    capabilities: Arc<dyn CapabilityProvider>,
    index: Arc<dyn SimilarityIndex>,
    cancel: CancelToken,
) -> HashMap<NodeName, Arc<dyn Node>> {
    let mut supervisor = SupervisorNode::new(config.quality.max_redrafts);
    if config.advisor {
        supervisor = supervisor.with_advisor(inference.clone());
    }

    let mut team: HashMap<NodeName, Arc<dyn Node>> = HashMap::new();
    team.insert(NodeName::Supervisor, Arc::new(supervisor));
    team.insert(
        NodeName::Researcher,
        Arc::new(ResearcherNode::new(
            config.researcher.clone(),
            inference.clone(),
        )),
    );
    team.insert(NodeName::Writer, Arc::new(WriterNode::new(inference.clone())));
    team.insert(
        NodeName::Quality,
        Arc::new(QualityNode::new(config.quality.clone(), inference, index)),
    );
    team.insert(
        NodeName::Publisher,
        Arc::new(PublisherNode::new(
            config.publisher.clone(),
            capabilities.clone(),
        )),
    );
    team.insert(
        NodeName::ToolDispatch,
        Arc::new(ToolDispatchNode::new(
            capabilities,
            config.engine.tool_concurrency,
            cancel,
        )),
    );
    team
}

/// Tool failures marked retryable become retryable node errors; anything
/// else is a setup problem the operator has to fix.
pub(crate) fn tool_node_error(err: ToolError) -> NodeError {
    if err.is_retryable() {
        NodeError::retryable(err.to_string())
    } else {
        NodeError::fatal(FailureKind::Configuration, err.to_string())
    }
}

pub(crate) fn inference_node_error(err: InferenceError) -> NodeError {
    if err.is_retryable() {
        NodeError::retryable(err.to_string())
    } else {
        NodeError::fatal(FailureKind::Configuration, err.to_string())
    }
}
