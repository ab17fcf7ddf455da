//! In-process document store with near-real-time search.
//!
//! Writes land in a live map that `get`/`exists` read directly. Search,
//! count, delete-by-query and suggest read a snapshot that is refreshed once
//! the visibility lag has elapsed, or on demand.

use super::{DocVersion, Hit, IndexRequest, SearchBackend, SearchResponse, WriteCondition};
use crate::config::RefreshPolicy;
use crate::errors::{ConnectorError, Result};
use crate::query::{compare_docs, eval_query, get_path, parse_sort};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const PRIMARY_TERM: u64 = 1;
const DEFAULT_SEARCH_SIZE: usize = 10;
const DEFAULT_SUGGEST_SIZE: usize = 5;

#[derive(Debug, Clone)]
struct Stored {
    source: Map<String, Value>,
    seq_no: u64,
}

impl Stored {
    fn hit(&self, id: &str) -> Hit {
        Hit {
            id: id.to_string(),
            source: self.source.clone(),
            version: Some(DocVersion { seq_no: self.seq_no, primary_term: PRIMARY_TERM }),
        }
    }
}

#[derive(Debug)]
struct IndexState {
    live: BTreeMap<String, Stored>,
    searchable: BTreeMap<String, Stored>,
    next_seq: u64,
    last_refresh: Instant,
    mapping: Option<Value>,
}

impl IndexState {
    fn new() -> Self {
        Self { live: BTreeMap::new(), searchable: BTreeMap::new(), next_seq: 0, last_refresh: Instant::now(), mapping: None }
    }

    fn refresh(&mut self) {
        self.searchable = self.live.clone();
        self.last_refresh = Instant::now();
    }

    fn refresh_if_due(&mut self, lag: Duration) {
        if self.last_refresh.elapsed() >= lag {
            self.refresh();
        }
    }
}

#[derive(Debug)]
pub struct InMemoryBackend {
    indices: RwLock<HashMap<String, IndexState>>,
    lag: Duration,
    available: AtomicBool,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// A backend whose writes are searchable immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::with_visibility_lag(Duration::ZERO)
    }

    /// A backend that refreshes its searchable view every `lag`.
    #[must_use]
    pub fn with_visibility_lag(lag: Duration) -> Self {
        Self { indices: RwLock::new(HashMap::new()), lag, available: AtomicBool::new(true) }
    }

    #[must_use]
    pub const fn visibility_lag(&self) -> Duration {
        self.lag
    }

    /// Simulates an outage: while unavailable every call fails with a connectivity error.
    pub fn set_available(&self, up: bool) {
        self.available.store(up, Ordering::SeqCst);
    }

    /// Live document count of an index, ignoring refresh state.
    #[must_use]
    pub fn live_len(&self, index: &str) -> usize {
        self.indices.read().get(index).map_or(0, |s| s.live.len())
    }

    /// Mapping an index was created with, if any.
    #[must_use]
    pub fn mapping(&self, index: &str) -> Option<Value> {
        self.indices.read().get(index).and_then(|s| s.mapping.clone())
    }

    fn check_up(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConnectorError::Connectivity("in-memory backend is unavailable".into()))
        }
    }

    /// Matching searchable documents, in id order.
    fn matching(&self, index: &str, query: &Value) -> Result<Vec<Hit>> {
        let mut guard = self.indices.write();
        let Some(state) = guard.get_mut(index) else {
            return Ok(Vec::new());
        };
        state.refresh_if_due(self.lag);
        let mut out = Vec::new();
        for (id, doc) in &state.searchable {
            if eval_query(id, &doc.source, query)? {
                out.push(doc.hit(id));
            }
        }
        Ok(out)
    }

    async fn apply_refresh(&self, index: &str, refresh: RefreshPolicy) {
        if !refresh.is_immediate() {
            return;
        }
        if refresh == RefreshPolicy::WaitFor {
            let wait = self
                .indices
                .read()
                .get(index)
                .map_or(Duration::ZERO, |s| self.lag.saturating_sub(s.last_refresh.elapsed()));
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
        if let Some(s) = self.indices.write().get_mut(index) {
            s.refresh();
        }
    }
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        self.check_up()
    }

    async fn ensure_index(&self, index: &str, mapping: &Value) -> Result<()> {
        self.check_up()?;
        let mut guard = self.indices.write();
        let state = guard.entry(index.to_string()).or_insert_with(IndexState::new);
        if state.mapping.is_none() {
            log::debug!("memory: created index {index}");
            state.mapping = Some(mapping.clone());
        }
        Ok(())
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse> {
        self.check_up()?;
        let match_all = json!({ "match_all": {} });
        let query = body.get("query").unwrap_or(&match_all);
        let sort = parse_sort(body.get("sort"))?;
        let from = usize_param(body, "from")?.unwrap_or(0);
        let size = usize_param(body, "size")?.unwrap_or(DEFAULT_SEARCH_SIZE);

        let mut hits = self.matching(index, query)?;
        if !sort.is_empty() {
            hits.sort_by(|a, b| compare_docs((a.id.as_str(), &a.source), (b.id.as_str(), &b.source), &sort));
        }
        let total = hits.len() as u64;
        let hits = hits.into_iter().skip(from).take(size).collect();
        log::trace!("memory search index={index} total={total} from={from} size={size}");
        Ok(SearchResponse { total, hits })
    }

    async fn count(&self, index: &str, query: &Value) -> Result<u64> {
        self.check_up()?;
        Ok(self.matching(index, query)?.len() as u64)
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<Hit>> {
        self.check_up()?;
        Ok(self.indices.read().get(index).and_then(|s| s.live.get(id).map(|d| d.hit(id))))
    }

    async fn exists(&self, index: &str, id: &str) -> Result<bool> {
        self.check_up()?;
        Ok(self.indices.read().get(index).is_some_and(|s| s.live.contains_key(id)))
    }

    async fn index(&self, req: IndexRequest) -> Result<DocVersion> {
        self.check_up()?;
        let version = {
            let mut guard = self.indices.write();
            let state = guard.entry(req.index.clone()).or_insert_with(IndexState::new);
            let current = state.live.get(&req.id).map(|d| d.seq_no);
            match (req.condition, current) {
                (WriteCondition::Any, _) | (WriteCondition::CreateOnly, None) => {}
                (WriteCondition::CreateOnly, Some(_)) => {
                    return Err(ConnectorError::Conflict(format!(
                        "document `{}` already exists in `{}`",
                        req.id, req.index
                    )));
                }
                (WriteCondition::IfVersion(v), Some(seq)) if v.seq_no == seq && v.primary_term == PRIMARY_TERM => {}
                (WriteCondition::IfVersion(v), _) => {
                    return Err(ConnectorError::Conflict(format!(
                        "document `{}` is no longer at seq_no {}",
                        req.id, v.seq_no
                    )));
                }
            }
            let seq_no = state.next_seq;
            state.next_seq += 1;
            state.live.insert(req.id.clone(), Stored { source: req.source, seq_no });
            DocVersion { seq_no, primary_term: PRIMARY_TERM }
        };
        self.apply_refresh(&req.index, req.refresh).await;
        Ok(version)
    }

    async fn delete_by_query(&self, index: &str, query: &Value, refresh: RefreshPolicy) -> Result<u64> {
        self.check_up()?;
        let ids: Vec<String> = self.matching(index, query)?.into_iter().map(|h| h.id).collect();
        let deleted = {
            let mut guard = self.indices.write();
            let Some(state) = guard.get_mut(index) else {
                return Ok(0);
            };
            ids.iter().filter(|id| state.live.remove(id.as_str()).is_some()).count() as u64
        };
        self.apply_refresh(index, refresh).await;
        Ok(deleted)
    }

    async fn suggest(&self, index: &str, spec: &Value) -> Result<Value> {
        self.check_up()?;
        let spec = spec
            .as_object()
            .ok_or_else(|| ConnectorError::Backend("suggest expects an object".into()))?;
        let docs = self.matching(index, &json!({ "match_all": {} }))?;
        let global_text = spec.get("text").and_then(Value::as_str);
        let mut out = Map::new();
        for (name, entry) in spec {
            if name == "text" {
                continue;
            }
            let entries = if let Some(term) = entry.get("term") {
                let text = entry.get("text").and_then(Value::as_str).or(global_text).unwrap_or("");
                term_suggest(&docs, text, term)?
            } else if let Some(completion) = entry.get("completion") {
                let prefix = entry.get("prefix").and_then(Value::as_str).unwrap_or("");
                completion_suggest(&docs, prefix, completion)?
            } else {
                return Err(ConnectorError::Backend(format!("suggester `{name}` has no supported type")));
            };
            out.insert(name.clone(), Value::Array(entries));
        }
        Ok(Value::Object(out))
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        self.check_up()?;
        if let Some(s) = self.indices.write().get_mut(index) {
            s.refresh();
        }
        Ok(())
    }
}

fn usize_param(body: &Value, key: &str) -> Result<Option<usize>> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| ConnectorError::Backend(format!("`{key}` must be a non-negative integer"))),
    }
}

fn suggest_field<'a>(cfg: &'a Value) -> Result<&'a str> {
    cfg.get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| ConnectorError::Backend("suggester needs a field".into()))
}

fn suggest_size(cfg: &Value) -> usize {
    cfg.get("size").and_then(Value::as_u64).map_or(DEFAULT_SUGGEST_SIZE, |n| usize::try_from(n).unwrap_or(usize::MAX))
}

fn text_of(doc: &Map<String, Value>, field: &str) -> Vec<String> {
    match get_path(doc, field) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(String::from).collect(),
        _ => Vec::new(),
    }
}

/// Per input token, indexed tokens that extend it.
fn term_suggest(docs: &[Hit], text: &str, cfg: &Value) -> Result<Vec<Value>> {
    let field = suggest_field(cfg)?;
    let size = suggest_size(cfg);
    let mut freq: BTreeMap<String, u64> = BTreeMap::new();
    for d in docs {
        let mut seen: Vec<String> = text_of(&d.source, field)
            .iter()
            .flat_map(|s| s.split(|c: char| !c.is_alphanumeric()).map(str::to_lowercase).collect::<Vec<_>>())
            .filter(|t| !t.is_empty())
            .collect();
        seen.sort();
        seen.dedup();
        for t in seen {
            *freq.entry(t).or_default() += 1;
        }
    }
    let mut entries = Vec::new();
    let mut offset = 0usize;
    for raw in text.split(' ') {
        let token = raw.to_lowercase();
        if !token.is_empty() {
            let mut options: Vec<(&String, u64)> = freq
                .iter()
                .filter(|(t, _)| t.starts_with(&token) && **t != token)
                .map(|(t, f)| (t, *f))
                .collect();
            options.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.len().cmp(&b.0.len())).then_with(|| a.0.cmp(b.0)));
            let options: Vec<Value> = options
                .into_iter()
                .take(size)
                .map(|(t, f)| json!({ "text": t, "score": score(&token, t), "freq": f }))
                .collect();
            entries.push(json!({
                "text": raw,
                "offset": offset,
                "length": raw.chars().count(),
                "options": options,
            }));
        }
        offset += raw.chars().count() + 1;
    }
    Ok(entries)
}

/// Whole field values starting with the prefix, case-insensitively.
fn completion_suggest(docs: &[Hit], prefix: &str, cfg: &Value) -> Result<Vec<Value>> {
    let field = suggest_field(cfg)?;
    let size = suggest_size(cfg);
    let needle = prefix.to_lowercase();
    let mut values: Vec<String> = docs
        .iter()
        .flat_map(|d| text_of(&d.source, field))
        .filter(|v| v.to_lowercase().starts_with(&needle))
        .collect();
    values.sort();
    values.dedup();
    let options: Vec<Value> = values
        .into_iter()
        .take(size)
        .map(|v| json!({ "text": v, "score": 1.0, "freq": 1 }))
        .collect();
    Ok(vec![json!({ "text": prefix, "offset": 0, "length": prefix.chars().count(), "options": options })])
}

#[allow(clippy::cast_precision_loss)]
fn score(input: &str, option: &str) -> f64 {
    input.chars().count() as f64 / option.chars().count().max(1) as f64
}
