//! Test doubles: an in-memory graph transport plus canned model drivers.
//!
//! `MemoryGraph` dispatches on the exact statements in [`crate::cypher`] and
//! models their semantics against plain collections, including real cosine
//! scoring for the vector index calls. An unrecognized statement panics, so
//! a statement edit that breaks a test points straight at the mismatch.

use crate::cypher;
use crate::drivers::{EmbeddingDriver, GenerationDriver};
use crate::MemoryEngine;
use async_trait::async_trait;
use magpie_graph::{GraphStore, GraphTransport, RowSet};
use magpie_types::config::EngineConfig;
use magpie_types::error::{GraphError, GraphResult, ServiceError, ServiceResult};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub(crate) struct FragmentRow {
    pub id: String,
    pub text: String,
    pub role: String,
    pub created_at: String,
    pub embedding: Option<Vec<f32>>,
    pub embedding_pending: bool,
    pub embedding_fail_count: i64,
    pub dissonance_checked: Option<bool>,
    pub dissonance_flagged: Option<bool>,
    pub dissonance_report: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct SummaryRow {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub level: i64,
    pub child_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct SessionRow {
    pub id: String,
    pub name: String,
    pub active: bool,
    /// (message id, role, text, created_at) in append order.
    pub messages: Vec<(String, String, String, String)>,
}

#[derive(Debug, Default)]
pub(crate) struct GraphState {
    pub fragments: Vec<FragmentRow>,
    pub entities: BTreeSet<String>,
    /// (fragment id, entity name) MENTIONS edges.
    pub mentions: Vec<(String, String)>,
    /// Canonical (smaller, larger) entity pair to RELATED_TO weight.
    pub related: BTreeMap<(String, String), f64>,
    pub summaries: Vec<SummaryRow>,
    pub sessions: Vec<SessionRow>,
    /// (last_seen, status) for the metabolism singleton.
    pub heartbeat: Option<(String, String)>,
}

/// In-memory stand-in for the graph store.
pub(crate) struct MemoryGraph {
    pub state: Mutex<GraphState>,
    /// Every statement executed, in order.
    pub statements: Mutex<Vec<String>>,
    /// When set, every call fails as if the store were unreachable.
    pub fail: AtomicBool,
}

impl MemoryGraph {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GraphState::default()),
            statements: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    pub fn executed(&self, statement: &str) -> bool {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .any(|s| s == statement)
    }
}

fn p_str(params: &Value, key: &str) -> String {
    params[key].as_str().unwrap().to_string()
}

fn p_opt_str(params: &Value, key: &str) -> Option<String> {
    match &params[key] {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => panic!("parameter '{key}' is not a string: {other}"),
    }
}

fn p_bool(params: &Value, key: &str) -> bool {
    params[key].as_bool().unwrap()
}

fn p_f64(params: &Value, key: &str) -> f64 {
    params[key].as_f64().unwrap()
}

fn p_i64(params: &Value, key: &str) -> i64 {
    params[key].as_i64().unwrap()
}

fn p_usize(params: &Value, key: &str) -> usize {
    params[key].as_u64().unwrap() as usize
}

fn p_vec_f32(params: &Value, key: &str) -> Vec<f32> {
    params[key]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap() as f32)
        .collect()
}

fn p_str_list(params: &Value, key: &str) -> Vec<String> {
    params[key]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

fn count_row(column: &str, n: i64) -> RowSet {
    let mut rows = RowSet::new(vec![column.to_string()]);
    rows.push_row(vec![json!(n)]);
    rows
}

fn scored_rows(mut hits: Vec<(String, f32)>, k: usize) -> RowSet {
    hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    hits.truncate(k);
    let mut rows = RowSet::new(vec!["text".to_string(), "score".to_string()]);
    for (text, score) in hits {
        rows.push_row(vec![json!(text), json!(score)]);
    }
    rows
}

#[async_trait]
impl GraphTransport for MemoryGraph {
    async fn execute(&self, statement: &str, params: Value) -> GraphResult<RowSet> {
        self.statements.lock().unwrap().push(statement.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(GraphError::Http("store offline".to_string()));
        }

        let mut state = self.state.lock().unwrap();
        let rows = match statement {
            cypher::CREATE_FRAGMENT => {
                state.fragments.push(FragmentRow {
                    id: p_str(&params, "id"),
                    text: p_str(&params, "text"),
                    role: p_str(&params, "role"),
                    created_at: p_str(&params, "created_at"),
                    embedding: None,
                    embedding_pending: true,
                    embedding_fail_count: 0,
                    dissonance_checked: None,
                    dissonance_flagged: None,
                    dissonance_report: None,
                });
                RowSet::default()
            }
            cypher::MERGE_ENTITY_MENTION => {
                let fragment_id = p_str(&params, "fragment_id");
                let name = p_str(&params, "name");
                if state.fragments.iter().any(|f| f.id == fragment_id) {
                    state.entities.insert(name.clone());
                    let edge = (fragment_id, name);
                    if !state.mentions.contains(&edge) {
                        state.mentions.push(edge);
                    }
                }
                RowSet::default()
            }
            cypher::MERGE_RELATED_PAIR => {
                let a = p_str(&params, "a");
                let b = p_str(&params, "b");
                if state.entities.contains(&a) && state.entities.contains(&b) {
                    let initial = p_f64(&params, "initial");
                    let increment = p_f64(&params, "increment");
                    state
                        .related
                        .entry(pair_key(&a, &b))
                        .and_modify(|w| *w += increment)
                        .or_insert(initial);
                }
                RowSet::default()
            }
            cypher::PRUNE_WEAK_EDGES => {
                let threshold = p_f64(&params, "threshold");
                let before = state.related.len();
                state.related.retain(|_, w| *w > threshold);
                count_row("removed", (before - state.related.len()) as i64)
            }
            cypher::PRUNE_ORPHAN_ENTITIES => {
                let mentioned: BTreeSet<&String> =
                    state.mentions.iter().map(|(_, name)| name).collect();
                let linked: BTreeSet<&String> = state
                    .related
                    .keys()
                    .flat_map(|(a, b)| [a, b])
                    .collect();
                let keep: BTreeSet<String> = state
                    .entities
                    .iter()
                    .filter(|e| mentioned.contains(e) || linked.contains(e))
                    .cloned()
                    .collect();
                let removed = (state.entities.len() - keep.len()) as i64;
                state.entities = keep;
                count_row("removed", removed)
            }
            cypher::SELECT_PENDING_EMBEDDING => {
                let mut rows = RowSet::new(vec!["id".to_string(), "text".to_string()]);
                if let Some(f) = state.fragments.iter().find(|f| f.embedding_pending) {
                    rows.push_row(vec![json!(f.id), json!(f.text)]);
                }
                rows
            }
            cypher::STORE_EMBEDDING => {
                let id = p_str(&params, "id");
                let embedding = p_vec_f32(&params, "embedding");
                if let Some(f) = state.fragments.iter_mut().find(|f| f.id == id) {
                    f.embedding = Some(embedding);
                    f.embedding_pending = false;
                    f.embedding_fail_count = 0;
                }
                RowSet::default()
            }
            cypher::RECORD_EMBED_FAILURE => {
                let id = p_str(&params, "id");
                let f = state
                    .fragments
                    .iter_mut()
                    .find(|f| f.id == id)
                    .expect("failure recorded for missing fragment");
                f.embedding_fail_count += 1;
                count_row("fail_count", f.embedding_fail_count)
            }
            cypher::ABANDON_EMBEDDING => {
                let id = p_str(&params, "id");
                if let Some(f) = state.fragments.iter_mut().find(|f| f.id == id) {
                    f.embedding_pending = false;
                }
                RowSet::default()
            }
            cypher::SELECT_UNCHECKED => {
                let mut rows = RowSet::new(vec!["id".to_string(), "text".to_string()]);
                if let Some(f) = state.fragments.iter().find(|f| {
                    f.dissonance_checked.is_none()
                        && !f.embedding_pending
                        && f.embedding.is_some()
                }) {
                    rows.push_row(vec![json!(f.id), json!(f.text)]);
                }
                rows
            }
            cypher::MARK_CHECKED => {
                let id = p_str(&params, "id");
                if let Some(f) = state.fragments.iter_mut().find(|f| f.id == id) {
                    f.dissonance_checked = Some(true);
                    f.dissonance_flagged = Some(p_bool(&params, "flagged"));
                    f.dissonance_report = p_opt_str(&params, "report");
                }
                RowSet::default()
            }
            cypher::ACCEPT_DISSONANCE => {
                let id = p_str(&params, "id");
                let mut updated = 0;
                if let Some(f) = state.fragments.iter_mut().find(|f| f.id == id) {
                    f.dissonance_flagged = Some(false);
                    f.dissonance_report = None;
                    updated = 1;
                }
                count_row("updated", updated)
            }
            cypher::LIST_FLAGGED => {
                let mut flagged: Vec<&FragmentRow> = state
                    .fragments
                    .iter()
                    .filter(|f| f.dissonance_flagged == Some(true))
                    .collect();
                flagged.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                let mut rows = RowSet::new(vec![
                    "id".to_string(),
                    "text".to_string(),
                    "report".to_string(),
                ]);
                for f in flagged {
                    rows.push_row(vec![json!(f.id), json!(f.text), json!(f.dissonance_report)]);
                }
                rows
            }
            cypher::SELECT_UNSUMMARIZED_FRAGMENTS => {
                let limit = p_usize(&params, "limit");
                let covered: BTreeSet<&String> = state
                    .summaries
                    .iter()
                    .flat_map(|s| s.child_ids.iter())
                    .collect();
                let mut rows = RowSet::new(vec!["id".to_string(), "text".to_string()]);
                for f in state
                    .fragments
                    .iter()
                    .filter(|f| !covered.contains(&f.id))
                    .take(limit)
                {
                    rows.push_row(vec![json!(f.id), json!(f.text)]);
                }
                rows
            }
            cypher::SELECT_UNSUMMARIZED_SUMMARIES => {
                let level = p_i64(&params, "level");
                let limit = p_usize(&params, "limit");
                let covered: BTreeSet<&String> = state
                    .summaries
                    .iter()
                    .flat_map(|s| s.child_ids.iter())
                    .collect();
                let mut rows = RowSet::new(vec!["id".to_string(), "text".to_string()]);
                for s in state
                    .summaries
                    .iter()
                    .filter(|s| s.level == level && !covered.contains(&s.id))
                    .take(limit)
                {
                    rows.push_row(vec![json!(s.id), json!(s.text)]);
                }
                rows
            }
            cypher::CREATE_SUMMARY_OVER_FRAGMENTS => {
                let wanted = p_str_list(&params, "child_ids");
                let child_ids: Vec<String> = wanted
                    .into_iter()
                    .filter(|id| state.fragments.iter().any(|f| &f.id == id))
                    .collect();
                state.summaries.push(SummaryRow {
                    id: p_str(&params, "id"),
                    text: p_str(&params, "text"),
                    embedding: p_vec_f32(&params, "embedding"),
                    level: p_i64(&params, "level"),
                    child_ids,
                });
                RowSet::default()
            }
            cypher::CREATE_SUMMARY_OVER_SUMMARIES => {
                let wanted = p_str_list(&params, "child_ids");
                let child_ids: Vec<String> = wanted
                    .into_iter()
                    .filter(|id| state.summaries.iter().any(|s| &s.id == id))
                    .collect();
                state.summaries.push(SummaryRow {
                    id: p_str(&params, "id"),
                    text: p_str(&params, "text"),
                    embedding: p_vec_f32(&params, "embedding"),
                    level: p_i64(&params, "level"),
                    child_ids,
                });
                RowSet::default()
            }
            cypher::EPISODIC_SEARCH => {
                let k = p_usize(&params, "k");
                let query = p_vec_f32(&params, "embedding");
                let hits = state
                    .fragments
                    .iter()
                    .filter_map(|f| {
                        f.embedding
                            .as_ref()
                            .map(|e| (f.text.clone(), cosine(e, &query)))
                    })
                    .collect();
                scored_rows(hits, k)
            }
            cypher::EPISODIC_CONTEXT => {
                let k = p_usize(&params, "k");
                let query = p_vec_f32(&params, "embedding");
                let exclude = p_str(&params, "exclude");
                let hits = state
                    .fragments
                    .iter()
                    .filter(|f| f.id != exclude)
                    .filter_map(|f| {
                        f.embedding
                            .as_ref()
                            .map(|e| (f.text.clone(), cosine(e, &query)))
                    })
                    .collect();
                scored_rows(hits, k)
            }
            cypher::ABSTRACTIVE_SEARCH => {
                let k = p_usize(&params, "k");
                let query = p_vec_f32(&params, "embedding");
                let hits = state
                    .summaries
                    .iter()
                    .map(|s| (s.text.clone(), cosine(&s.embedding, &query)))
                    .collect();
                scored_rows(hits, k)
            }
            cypher::RELATIONAL_FACTS => {
                let names = p_str_list(&params, "names");
                let limit = p_usize(&params, "limit");
                let mut seen = BTreeSet::new();
                let mut rows = RowSet::new(vec!["source".to_string(), "target".to_string()]);
                'edges: for (a, b) in state.related.keys() {
                    for (source, target) in [(a, b), (b, a)] {
                        if rows.len() >= limit {
                            break 'edges;
                        }
                        if names.contains(source)
                            && seen.insert((source.clone(), target.clone()))
                        {
                            rows.push_row(vec![json!(source), json!(target)]);
                        }
                    }
                }
                rows
            }
            cypher::FORGET_FRAGMENT => {
                let id = p_str(&params, "id");
                let before = state.fragments.len();
                state.fragments.retain(|f| f.id != id);
                state.mentions.retain(|(fid, _)| fid != &id);
                count_row("removed", (before - state.fragments.len()) as i64)
            }
            cypher::UPDATE_FRAGMENT => {
                let id = p_str(&params, "id");
                let mut updated = 0;
                if let Some(f) = state.fragments.iter_mut().find(|f| f.id == id) {
                    f.text = p_str(&params, "text");
                    f.embedding = None;
                    f.embedding_pending = true;
                    f.embedding_fail_count = 0;
                    f.dissonance_checked = None;
                    f.dissonance_flagged = None;
                    f.dissonance_report = None;
                    updated = 1;
                }
                count_row("updated", updated)
            }
            cypher::COUNT_PENDING => {
                let n = state.fragments.iter().filter(|f| f.embedding_pending).count();
                count_row("n", n as i64)
            }
            cypher::COUNT_UNCHECKED => {
                let n = state
                    .fragments
                    .iter()
                    .filter(|f| {
                        f.dissonance_checked.is_none()
                            && !f.embedding_pending
                            && f.embedding.is_some()
                    })
                    .count();
                count_row("n", n as i64)
            }
            cypher::COUNT_UNSUMMARIZED => {
                let covered: BTreeSet<&String> = state
                    .summaries
                    .iter()
                    .flat_map(|s| s.child_ids.iter())
                    .collect();
                let n = state
                    .fragments
                    .iter()
                    .filter(|f| !covered.contains(&f.id))
                    .count();
                count_row("n", n as i64)
            }
            cypher::COUNT_FLAGGED => {
                let n = state
                    .fragments
                    .iter()
                    .filter(|f| f.dissonance_flagged == Some(true))
                    .count();
                count_row("n", n as i64)
            }
            cypher::HEARTBEAT_MERGE => {
                state.heartbeat = Some((p_str(&params, "now"), p_str(&params, "status")));
                RowSet::default()
            }
            cypher::HEARTBEAT_READ => {
                let mut rows =
                    RowSet::new(vec!["last_seen".to_string(), "status".to_string()]);
                if let Some((last_seen, status)) = &state.heartbeat {
                    rows.push_row(vec![json!(last_seen), json!(status)]);
                }
                rows
            }
            cypher::SESSION_START => {
                state.sessions.push(SessionRow {
                    id: p_str(&params, "id"),
                    name: p_str(&params, "name"),
                    active: true,
                    messages: Vec::new(),
                });
                RowSet::default()
            }
            cypher::SESSION_APPEND => {
                let session_id = p_str(&params, "session_id");
                let mut rows = RowSet::new(vec!["id".to_string()]);
                if let Some(s) = state
                    .sessions
                    .iter_mut()
                    .find(|s| s.id == session_id && s.active)
                {
                    let id = p_str(&params, "id");
                    s.messages.push((
                        id.clone(),
                        p_str(&params, "role"),
                        p_str(&params, "text"),
                        p_str(&params, "now"),
                    ));
                    rows.push_row(vec![json!(id)]);
                }
                rows
            }
            cypher::SESSION_END => {
                let id = p_str(&params, "id");
                let mut updated = 0;
                if let Some(s) = state.sessions.iter_mut().find(|s| s.id == id && s.active) {
                    s.active = false;
                    updated = 1;
                }
                count_row("updated", updated)
            }
            cypher::SESSION_LOG => {
                let id = p_str(&params, "id");
                let mut rows = RowSet::new(vec![
                    "role".to_string(),
                    "text".to_string(),
                    "created_at".to_string(),
                ]);
                if let Some(s) = state.sessions.iter().find(|s| s.id == id) {
                    for (_, role, text, created_at) in &s.messages {
                        rows.push_row(vec![json!(role), json!(text), json!(created_at)]);
                    }
                }
                rows
            }
            other => panic!("unhandled statement in test transport: {other}"),
        };
        Ok(rows)
    }
}

/// Embedder returning canned vectors; unknown text embeds as zeros.
pub(crate) struct FakeEmbedder {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    dims: usize,
}

impl FakeEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            vectors: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            dims,
        }
    }

    /// Teach the embedder a text-to-vector mapping.
    pub fn learn(&self, text: &str, vector: Vec<f32>) {
        self.vectors
            .lock()
            .unwrap()
            .insert(text.to_string(), vector);
    }
}

#[async_trait]
impl EmbeddingDriver for FakeEmbedder {
    async fn embed(&self, text: &str) -> ServiceResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Http("embedder offline".to_string()));
        }
        Ok(self
            .vectors
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dims]))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Generator returning one canned response and remembering the last prompt.
pub(crate) struct FakeGenerator {
    pub response: Mutex<String>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
}

impl FakeGenerator {
    pub fn new(response: &str) -> Self {
        Self {
            response: Mutex::new(response.to_string()),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn set_response(&self, response: &str) {
        *self.response.lock().unwrap() = response.to_string();
    }
}

#[async_trait]
impl GenerationDriver for FakeGenerator {
    async fn generate(&self, prompt: &str) -> ServiceResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Http("generator offline".to_string()));
        }
        Ok(self.response.lock().unwrap().clone())
    }
}

pub(crate) struct TestHarness {
    pub graph: Arc<MemoryGraph>,
    pub embedder: Arc<FakeEmbedder>,
    pub generator: Arc<FakeGenerator>,
    pub engine: MemoryEngine,
}

pub(crate) fn setup() -> TestHarness {
    setup_with(EngineConfig::default())
}

pub(crate) fn setup_with(config: EngineConfig) -> TestHarness {
    let graph = MemoryGraph::new();
    let embedder = Arc::new(FakeEmbedder::new(2));
    let generator = Arc::new(FakeGenerator::new("CONSISTENT"));
    let engine = MemoryEngine::new(
        GraphStore::with_transport(graph.clone()),
        embedder.clone(),
        generator.clone(),
        config,
    );
    TestHarness {
        graph,
        embedder,
        generator,
        engine,
    }
}
