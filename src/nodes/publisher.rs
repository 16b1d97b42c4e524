// SPDX-License-Identifier: MIT

//! Publisher: pushes the vetted draft out through the configured tool.
//!
//! The node itself only performs the external call. At-most-once semantics
//! come from the engine, which commits this node's checkpoint together with
//! the episodic record and refuses to resume past it.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::tool_node_error;
use crate::config::PublisherConfig;
use crate::engine::{NextHint, Node, NodeError, NodeName, QualityVerdict, RunState};
use crate::provider::CapabilityProvider;

pub struct PublisherNode {
    config: PublisherConfig,
    capabilities: Arc<dyn CapabilityProvider>,
}

impl PublisherNode {
    pub fn new(config: PublisherConfig, capabilities: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            config,
            capabilities,
        }
    }
}

#[async_trait]
impl Node for PublisherNode {
    fn name(&self) -> NodeName {
        NodeName::Publisher
    }

    async fn run(&self, mut state: RunState) -> Result<(RunState, NextHint), NodeError> {
        if state.quality_verdict != QualityVerdict::Unique {
            return Err(NodeError::precondition(format!(
                "publish requires a unique quality verdict, got {:?}",
                state.quality_verdict
            )));
        }
        let Some(draft) = state.draft.clone() else {
            return Err(NodeError::precondition("publish requires a draft"));
        };

        let args = json!({
            "author": self.config.author,
            "commentary": draft,
            "visibility": self.config.visibility,
            "lifecycleState": self.config.lifecycle_state,
        });
        self.capabilities
            .invoke(&self.config.publish_tool, args)
            .await
            .map_err(tool_node_error)?;

        log::info!("Published article for run {}", state.run_id);
        state.record(NodeName::Publisher, "article published");
        state.published_article = Some(draft);
        Ok((state, NextHint::Published))
    }
}
