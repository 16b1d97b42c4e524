//! End-to-end workflow tests over mock inference, tools and storage.
//!
//! These tests drive full runs through the real engine, nodes and
//! transition table; only the model, the tool providers and the store are
//! replaced with scripted mocks.

use async_trait::async_trait;
use chrono::Utc;
use newsdesk::config::NewsdeskConfig;
use newsdesk::engine::{
    cancel_pair, CancelHandle, EngineError, FailureKind, NextHint, NodeName, Route, RunId,
    RunState, ToolOutcome, TransitionTable, WorkflowEngine,
};
use newsdesk::inference::{Inference, InferenceError};
use newsdesk::nodes::standard_team;
use newsdesk::provider::{CapabilityProvider, ToolError, ToolSpec};
use newsdesk::store::{
    cosine_similarity, Checkpoint, CheckpointLog, EpisodicRecord, SimilarityIndex, StoreError,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock Components
// ============================================================================

/// Scripted model: replies are keyed on the prompt so a resumed run gets
/// the same answers regardless of call order.
struct ScriptedInference {
    queries: String,
    drafts: Mutex<VecDeque<String>>,
    embeddings: Vec<(String, Vec<f32>)>,
    fallback: Vec<f32>,
}

impl ScriptedInference {
    fn new(queries: &[&str], drafts: &[&str]) -> Self {
        Self {
            queries: serde_json::to_string(queries).unwrap(),
            drafts: Mutex::new(drafts.iter().map(|d| d.to_string()).collect()),
            embeddings: Vec::new(),
            fallback: vec![1.0, 0.0],
        }
    }

    /// Drafts containing `needle` embed as `vector`; everything else gets
    /// the fallback vector.
    fn with_embedding(mut self, needle: &str, vector: Vec<f32>) -> Self {
        self.embeddings.push((needle.to_string(), vector));
        self
    }
}

#[async_trait]
impl Inference for ScriptedInference {
    async fn complete(&self, prompt: &str, _context: &str) -> Result<String, InferenceError> {
        if prompt.contains("search queries") {
            return Ok(self.queries.clone());
        }

        // Writer prompt: hand out drafts in order, keeping the last one
        // available so replays see the same article.
        let mut drafts = self.drafts.lock().unwrap();
        if drafts.len() > 1 {
            Ok(drafts.pop_front().unwrap())
        } else {
            drafts
                .front()
                .cloned()
                .ok_or_else(|| InferenceError::invalid("mock", "no draft scripted"))
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        for (needle, vector) in &self.embeddings {
            if text.contains(needle) {
                return Ok(vector.clone());
            }
        }
        Ok(self.fallback.clone())
    }
}

/// Tool provider with canned search results keyed by query.
struct ScriptedProvider {
    search_results: HashMap<String, Value>,
    failing_queries: Vec<String>,
    publish_calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new() -> Self {
        Self {
            search_results: HashMap::new(),
            failing_queries: Vec::new(),
            publish_calls: AtomicUsize::new(0),
        }
    }

    fn with_results(mut self, query: &str, payload: Value) -> Self {
        self.search_results.insert(query.to_string(), payload);
        self
    }

    fn with_failing_query(mut self, query: &str) -> Self {
        self.failing_queries.push(query.to_string());
        self
    }

    fn publish_count(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError> {
        Ok(vec![
            ToolSpec {
                name: "search_and_content".to_string(),
                description: "Search the web".to_string(),
                input_schema: json!({"type": "object"}),
            },
            ToolSpec {
                name: "create_linkedin_post".to_string(),
                description: "Publish a post".to_string(),
                input_schema: json!({"type": "object"}),
            },
        ])
    }

    async fn invoke(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
        if tool == "create_linkedin_post" {
            self.publish_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(json!({"id": "post-1"}));
        }

        let query = args["query"].as_str().unwrap_or_default().to_string();
        if self.failing_queries.contains(&query) {
            return Err(ToolError::invoke("mock", tool, "search backend down", true));
        }
        Ok(self
            .search_results
            .get(&query)
            .cloned()
            .unwrap_or_else(|| json!({"results": []})))
    }
}

/// In-memory store with switchable failure modes.
#[derive(Default)]
struct MemoryStore {
    checkpoints: Mutex<Vec<Checkpoint>>,
    records: Mutex<Vec<EpisodicRecord>>,
    fail_commit: bool,
    fail_append_at: Option<u64>,
    append_failure_armed: AtomicBool,
}

impl MemoryStore {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing_commit() -> Arc<Self> {
        Arc::new(Self {
            fail_commit: true,
            ..Self::default()
        })
    }

    /// Fails exactly one append, the first one at `step`.
    fn failing_append_at(step: u64) -> Arc<Self> {
        Arc::new(Self {
            fail_append_at: Some(step),
            append_failure_armed: AtomicBool::new(true),
            ..Self::default()
        })
    }

    fn seed(self: Arc<Self>, record: EpisodicRecord) -> Arc<Self> {
        self.records.lock().unwrap().push(record);
        self
    }

    fn checkpoint_steps(&self) -> Vec<u64> {
        let mut steps: Vec<u64> = self
            .checkpoints
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.step)
            .collect();
        steps.sort_unstable();
        steps
    }

    fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl CheckpointLog for MemoryStore {
    async fn append(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
        if let Some(step) = self.fail_append_at {
            if checkpoint.step == step && self.append_failure_armed.swap(false, Ordering::SeqCst)
            {
                return Err(StoreError::Other("simulated write failure".to_string()));
            }
        }
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
        record: EpisodicRecord,
    ) -> Result<(), StoreError> {
        if self.fail_commit {
            return Err(StoreError::Other("simulated commit failure".to_string()));
        }
        self.checkpoints.lock().unwrap().push(checkpoint);
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

#[async_trait]
impl SimilarityIndex for MemoryStore {
    async fn nearest(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<(EpisodicRecord, f32)>, StoreError> {
        let mut scored: Vec<(EpisodicRecord, f32)> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.clone(), cosine_similarity(&r.embedding, embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

// ============================================================================
// Test Fixtures
// ============================================================================

fn test_config() -> NewsdeskConfig {
    let mut config = NewsdeskConfig::default();
    config.engine.retry_backoff_ms = 1;
    config.publisher.author = "urn:li:person:test".to_string();
    config
}

fn search_payload(entries: &[(&str, &str)]) -> Value {
    let results: Vec<Value> = entries
        .iter()
        .map(|(title, snippet)| {
            json!({
                "title": title,
                "url": format!("https://news.example/{}", title.to_lowercase().replace(' ', "-")),
                "snippet": snippet,
            })
        })
        .collect();
    json!({ "results": results })
}

fn happy_inference() -> Arc<ScriptedInference> {
    Arc::new(ScriptedInference::new(
        &["vol spike", "rates"],
        &["Volatility is back, and markets noticed."],
    ))
}

fn happy_provider() -> Arc<ScriptedProvider> {
    Arc::new(
        ScriptedProvider::new()
            .with_results(
                "vol spike",
                search_payload(&[
                    ("VIX jumps", "The volatility index jumped 30 percent."),
                    ("Options desks busy", "Hedging flows picked up."),
                ]),
            )
            .with_results(
                "rates",
                search_payload(&[("Rates on hold", "The central bank held steady.")]),
            ),
    )
}

fn published_record(embedding: Vec<f32>) -> EpisodicRecord {
    EpisodicRecord {
        run_id: RunId::new(),
        article: "Previously published article".to_string(),
        embedding,
        published_at: Utc::now(),
    }
}

fn build_engine(
    config: &NewsdeskConfig,
    inference: Arc<dyn Inference>,
    provider: Arc<dyn CapabilityProvider>,
    store: Arc<MemoryStore>,
) -> (WorkflowEngine, CancelHandle) {
    let (handle, token) = cancel_pair();
    let team = standard_team(config, inference, provider, store.clone(), token.clone());
    (
        WorkflowEngine::new(
            team,
            TransitionTable::standard(),
            store,
            config.engine.clone(),
            token,
        ),
        handle,
    )
}

fn aborted_kind(err: &EngineError) -> FailureKind {
    match err {
        EngineError::Aborted { kind, .. } => *kind,
        other => panic!("expected an aborted run, got {:?}", other),
    }
}

// ============================================================================
// Happy Path
// ============================================================================

#[tokio::test]
async fn test_run_publishes_a_unique_article() {
    let config = test_config();
    let provider = happy_provider();
    let store = MemoryStore::new();
    let (engine, _cancel) =
        build_engine(&config, happy_inference(), provider.clone(), store.clone());

    let state = RunState::new("markets");
    let run_id = state.run_id;
    let finished = engine.run(state).await.unwrap();

    assert_eq!(
        finished.published_article.as_deref(),
        Some("Volatility is back, and markets noticed.")
    );
    assert_eq!(finished.last_hint, Some(NextHint::Published));
    assert_eq!(finished.research_findings.len(), 3);
    assert!(finished.pending_tool_calls.is_empty());
    assert!(finished.tool_results.is_empty());
    assert_eq!(finished.rejected_drafts, 0);

    // supervisor, researcher, dispatch, supervisor, researcher, supervisor,
    // writer, supervisor, quality, supervisor, publisher.
    assert_eq!(store.checkpoint_steps(), (1..=11).collect::<Vec<u64>>());
    assert_eq!(provider.publish_count(), 1);
    assert_eq!(store.record_count(), 1);

    let record = store.records.lock().unwrap()[0].clone();
    assert_eq!(record.run_id, run_id);
    assert_eq!(record.article, finished.published_article.unwrap());
    assert_eq!(record.embedding, vec![1.0, 0.0]);
}

#[tokio::test]
async fn test_dispatch_tolerates_partial_search_failures() {
    let config = test_config();
    let inference = Arc::new(ScriptedInference::new(
        &["good one", "bad one", "good two"],
        &["An article built from partial research."],
    ));
    let provider = Arc::new(
        ScriptedProvider::new()
            .with_results("good one", search_payload(&[("A", "first hit")]))
            .with_failing_query("bad one")
            .with_results("good two", search_payload(&[("B", "second hit")])),
    );
    let store = MemoryStore::new();
    let (engine, _cancel) = build_engine(&config, inference, provider.clone(), store.clone());

    let finished = engine.run(RunState::new("markets")).await.unwrap();
    assert!(finished.published_article.is_some());
    assert_eq!(finished.research_findings.len(), 2);

    let trail = store.history(finished.run_id).await.unwrap();
    let dispatch = trail
        .iter()
        .find(|c| c.node == NodeName::ToolDispatch)
        .unwrap();
    assert!(matches!(
        dispatch.state.tool_results[1].outcome,
        ToolOutcome::Failed(_)
    ));
    let note = dispatch
        .state
        .last_message_from(NodeName::ToolDispatch)
        .unwrap();
    assert_eq!(note.content, "3 calls: 2 ok, 1 failed, 0 canceled");
}

// ============================================================================
// Redraft and Uniqueness Gate
// ============================================================================

#[tokio::test]
async fn test_duplicate_draft_is_redrafted_and_published() {
    let config = test_config();
    let inference = Arc::new(
        ScriptedInference::new(&["vol spike", "rates"], &["Old take", "New take"])
            .with_embedding("Old take", vec![1.0, 0.0])
            .with_embedding("New take", vec![0.0, 1.0]),
    );
    let provider = happy_provider();
    let store = MemoryStore::new().seed(published_record(vec![1.0, 0.0]));
    let (engine, _cancel) = build_engine(&config, inference, provider.clone(), store.clone());

    let finished = engine.run(RunState::new("markets")).await.unwrap();

    assert_eq!(finished.published_article.as_deref(), Some("New take"));
    assert_eq!(finished.rejected_drafts, 1);
    assert_eq!(provider.publish_count(), 1);
    assert_eq!(store.record_count(), 2);
}

#[tokio::test]
async fn test_redraft_budget_rejects_the_run() {
    let mut config = test_config();
    config.quality.max_redrafts = 1;
    let inference = Arc::new(
        ScriptedInference::new(&["vol spike", "rates"], &["Old take"])
            .with_embedding("Old take", vec![1.0, 0.0]),
    );
    let provider = happy_provider();
    let store = MemoryStore::new().seed(published_record(vec![1.0, 0.0]));
    let (engine, _cancel) = build_engine(&config, inference, provider.clone(), store.clone());

    let state = RunState::new("markets");
    let run_id = state.run_id;
    let err = engine.run(state).await.unwrap_err();

    assert_eq!(aborted_kind(&err), FailureKind::DuplicateContentRejected);
    assert_eq!(provider.publish_count(), 0);
    assert_eq!(store.record_count(), 1);

    let last = store.latest(run_id).await.unwrap().unwrap();
    let annotation = last.error.unwrap();
    assert!(annotation.contains("duplicate_content_rejected"));
    assert!(annotation.contains("1 drafts rejected"));
}

// ============================================================================
// Failure Handling and Budgets
// ============================================================================

#[tokio::test]
async fn test_publish_commit_failure_aborts_without_a_record() {
    let config = test_config();
    let provider = happy_provider();
    let store = MemoryStore::failing_commit();
    let (engine, _cancel) =
        build_engine(&config, happy_inference(), provider.clone(), store.clone());

    let state = RunState::new("markets");
    let run_id = state.run_id;
    let err = engine.run(state).await.unwrap_err();

    assert_eq!(aborted_kind(&err), FailureKind::Storage);
    // The post went out but the commit failed, so nothing is recorded and
    // the run can never be resumed into a second publish.
    assert_eq!(provider.publish_count(), 1);
    assert_eq!(store.record_count(), 0);

    let resume_err = engine.resume(run_id).await.unwrap_err();
    assert!(matches!(resume_err, EngineError::RunFinished(_, _)));
}

#[tokio::test]
async fn test_step_budget_aborts_the_run() {
    let mut config = test_config();
    config.engine.max_steps = 3;
    let provider = happy_provider();
    let store = MemoryStore::new();
    let (engine, _cancel) =
        build_engine(&config, happy_inference(), provider.clone(), store.clone());

    let state = RunState::new("markets");
    let run_id = state.run_id;
    let err = engine.run(state).await.unwrap_err();

    assert_eq!(aborted_kind(&err), FailureKind::StepBudgetExceeded);
    assert_eq!(provider.publish_count(), 0);

    let last = store.latest(run_id).await.unwrap().unwrap();
    assert!(last.error.unwrap().contains("step_budget_exceeded"));
}

#[tokio::test]
async fn test_unresolvable_transitions_abort_as_configuration_errors() {
    let config = test_config();
    let provider = happy_provider();
    let store = MemoryStore::new();

    // A table that knows how to start research but not how to dispatch it.
    let table = TransitionTable::new().row(
        NodeName::Supervisor,
        NextHint::NeedsResearch,
        Route::Node(NodeName::Researcher),
    );
    let (_handle, token) = cancel_pair();
    let team = standard_team(
        &config,
        happy_inference(),
        provider,
        store.clone(),
        token.clone(),
    );
    let engine = WorkflowEngine::new(team, table, store, config.engine.clone(), token);

    let err = engine.run(RunState::new("markets")).await.unwrap_err();
    assert_eq!(aborted_kind(&err), FailureKind::Configuration);
    assert!(err.to_string().contains("no transition"));
}

#[tokio::test]
async fn test_cancellation_stops_before_the_next_step() {
    let config = test_config();
    let provider = happy_provider();
    let store = MemoryStore::new();
    let (engine, cancel) =
        build_engine(&config, happy_inference(), provider.clone(), store.clone());

    cancel.cancel();
    let state = RunState::new("markets");
    let run_id = state.run_id;
    let err = engine.run(state).await.unwrap_err();

    assert_eq!(aborted_kind(&err), FailureKind::Canceled);
    assert_eq!(provider.publish_count(), 0);

    let trail = store.history(run_id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert!(trail[0].error.as_deref().unwrap().contains("canceled"));
}

// ============================================================================
// Resume Semantics
// ============================================================================

#[tokio::test]
async fn test_resumed_run_matches_an_uninterrupted_one() {
    let config = test_config();
    let initial = RunState::new("markets");
    let run_id = initial.run_id;

    // First engine: the checkpoint write after the research harvest fails,
    // interrupting the run mid-flight.
    let interrupted_store = MemoryStore::failing_append_at(5);
    let (interrupted_engine, _c1) = build_engine(
        &config,
        happy_inference(),
        happy_provider(),
        interrupted_store.clone(),
    );
    let err = interrupted_engine.run(initial.clone()).await.unwrap_err();
    assert!(matches!(err, EngineError::Store(_)));
    assert_eq!(interrupted_store.checkpoint_steps(), vec![1, 2, 3, 4]);

    let resumed = interrupted_engine.resume(run_id).await.unwrap();

    // Second engine: the same initial state runs through undisturbed.
    let clean_store = MemoryStore::new();
    let (clean_engine, _c2) = build_engine(
        &config,
        happy_inference(),
        happy_provider(),
        clean_store.clone(),
    );
    let uninterrupted = clean_engine.run(initial).await.unwrap();

    assert_eq!(resumed, uninterrupted);
    assert_eq!(
        interrupted_store.checkpoint_steps(),
        clean_store.checkpoint_steps()
    );
    assert_eq!(interrupted_store.record_count(), 1);
}

#[tokio::test]
async fn test_resume_refuses_published_runs() {
    let config = test_config();
    let provider = happy_provider();
    let store = MemoryStore::new();
    let (engine, _cancel) = build_engine(&config, happy_inference(), provider, store);

    let state = RunState::new("markets");
    let run_id = state.run_id;
    engine.run(state).await.unwrap();

    let err = engine.resume(run_id).await.unwrap_err();
    match err {
        EngineError::RunFinished(id, reason) => {
            assert_eq!(id, run_id);
            assert!(reason.contains("published"));
        }
        other => panic!("expected RunFinished, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resume_refuses_failed_runs() {
    let mut config = test_config();
    config.engine.max_steps = 3;
    let store = MemoryStore::new();
    let (engine, _cancel) =
        build_engine(&config, happy_inference(), happy_provider(), store);

    let state = RunState::new("markets");
    let run_id = state.run_id;
    engine.run(state).await.unwrap_err();

    let err = engine.resume(run_id).await.unwrap_err();
    assert!(matches!(err, EngineError::RunFinished(_, _)));
}

#[tokio::test]
async fn test_resume_of_an_unknown_run_is_an_error() {
    let config = test_config();
    let (engine, _cancel) = build_engine(
        &config,
        happy_inference(),
        happy_provider(),
        MemoryStore::new(),
    );

    let err = engine.resume(RunId::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::RunNotFound(_)));
}
