// SPDX-License-Identifier: MIT

//! Transition rules mapping (node, hint) pairs to the next node.

use std::collections::HashMap;

use super::node::{NextHint, NodeName};

/// Where a resolved transition sends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Node(NodeName),
    Terminal,
}

/// The finite transition table. A run may only move along rows listed here;
/// a (node, hint) pair without a row aborts the run as a configuration
/// error.
#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    rows: HashMap<(NodeName, NextHint), Route>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }

    pub fn row(mut self, from: NodeName, hint: NextHint, to: Route) -> Self {
        self.rows.insert((from, hint), to);
        self
    }

    pub fn resolve(&self, from: NodeName, hint: NextHint) -> Option<Route> {
        self.rows.get(&(from, hint)).copied()
    }

    /// The content-production topology: the supervisor fans out to the role
    /// nodes, every role reports back to the supervisor, and a successful
    /// publish terminates the run.
    pub fn standard() -> Self {
        use NextHint::*;
        use NodeName::*;

        Self::new()
            .row(Supervisor, NeedsResearch, Route::Node(Researcher))
            .row(Supervisor, NeedsDraft, Route::Node(Writer))
            .row(Supervisor, NeedsQualityCheck, Route::Node(Quality))
            .row(Supervisor, ReadyToPublish, Route::Node(Publisher))
            .row(Researcher, NeedsTools, Route::Node(ToolDispatch))
            .row(Researcher, ResearchReady, Route::Node(Supervisor))
            .row(Writer, DraftReady, Route::Node(Supervisor))
            .row(Quality, QualityChecked, Route::Node(Supervisor))
            .row(ToolDispatch, ToolsApplied, Route::Node(Supervisor))
            .row(Publisher, Published, Route::Terminal)
    }
}
