// SPDX-License-Identifier: MIT

//! Tool dispatch: runs the pending tool calls against the providers.
//!
//! Calls run concurrently up to the configured limit, but the results land
//! in the state in request order so a resumed run sees the same sequence.
//! A failed call becomes a `Failed` outcome rather than a node error.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use crate::engine::{
    CallId, CancelToken, NextHint, Node, NodeError, NodeName, RunState, ToolCallRequest,
    ToolCallResult, ToolOutcome,
};
use crate::provider::CapabilityProvider;

pub struct ToolDispatchNode {
    capabilities: Arc<dyn CapabilityProvider>,
    concurrency: usize,
    cancel: CancelToken,
}

impl ToolDispatchNode {
    pub fn new(
        capabilities: Arc<dyn CapabilityProvider>,
        concurrency: usize,
        cancel: CancelToken,
    ) -> Self {
        Self {
            capabilities,
            concurrency: concurrency.max(1),
            cancel,
        }
    }

    async fn execute_one(&self, request: ToolCallRequest) -> ToolCallResult {
        if self.cancel.is_canceled() {
            return ToolCallResult {
                id: request.id,
                tool: request.tool,
                outcome: ToolOutcome::Canceled,
            };
        }

        let outcome = match self.capabilities.invoke(&request.tool, request.args).await {
            Ok(value) => ToolOutcome::Ok(value),
            Err(e) => {
                log::warn!("Tool call '{}' failed: {}", request.tool, e);
                ToolOutcome::Failed(e.to_string())
            }
        };
        ToolCallResult {
            id: request.id,
            tool: request.tool,
            outcome,
        }
    }
}

#[async_trait]
impl Node for ToolDispatchNode {
    fn name(&self) -> NodeName {
        NodeName::ToolDispatch
    }

    async fn run(&self, mut state: RunState) -> Result<(RunState, NextHint), NodeError> {
        if state.pending_tool_calls.is_empty() {
            return Err(NodeError::precondition(
                "tool dispatch invoked without pending calls",
            ));
        }

        let requests = mem::take(&mut state.pending_tool_calls);
        let order: HashMap<CallId, usize> = requests
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id, i))
            .collect();

        log::debug!(
            "Dispatching {} tool calls, {} at a time",
            requests.len(),
            self.concurrency
        );
        let mut results: Vec<ToolCallResult> = stream::iter(requests)
            .map(|request| self.execute_one(request))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by_key(|r| order.get(&r.id).copied().unwrap_or(usize::MAX));

        let mut ok = 0usize;
        let mut failed = 0usize;
        let mut canceled = 0usize;
        for result in &results {
            match result.outcome {
                ToolOutcome::Ok(_) => ok += 1,
                ToolOutcome::Failed(_) => failed += 1,
                ToolOutcome::Canceled => canceled += 1,
            }
        }
        state.record(
            NodeName::ToolDispatch,
            format!(
                "{} calls: {} ok, {} failed, {} canceled",
                results.len(),
                ok,
                failed,
                canceled
            ),
        );
        state.tool_results = results;
        Ok((state, NextHint::ToolsApplied))
    }
}
