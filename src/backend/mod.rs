//! Document-store client seam.
//!
//! The connector talks to the search engine only through [`SearchBackend`].
//! Bodies are Query DSL JSON as produced by [`crate::query::QueryBuilder`].

mod memory;
#[cfg(feature = "elasticsearch")]
mod elastic;

pub use memory::InMemoryBackend;
#[cfg(feature = "elasticsearch")]
pub use elastic::ElasticsearchBackend;

use crate::config::RefreshPolicy;
use crate::errors::{ConnectorError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Optimistic concurrency token of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocVersion {
    pub seq_no: u64,
    pub primary_term: u64,
}

/// Precondition for an index write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// Create or overwrite.
    Any,
    /// Fail with a conflict when the id exists.
    CreateOnly,
    /// Fail with a conflict unless the stored document is at this version.
    IfVersion(DocVersion),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexRequest {
    pub index: String,
    pub id: String,
    pub source: Map<String, Value>,
    pub condition: WriteCondition,
    pub refresh: RefreshPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub source: Map<String, Value>,
    pub version: Option<DocVersion>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub total: u64,
    pub hits: Vec<Hit>,
}

impl SearchResponse {
    /// Reads a search response body (`hits.total.value`, `hits.hits[]`).
    ///
    /// # Errors
    /// Returns `ConnectorError::Backend` when the body has no hits section.
    pub fn from_es_json(body: &Value) -> Result<Self> {
        let hits = body
            .get("hits")
            .ok_or_else(|| ConnectorError::Backend(format!("search response without hits: {body}")))?;
        let total = match hits.get("total") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(t) => t.get("value").and_then(Value::as_u64).unwrap_or(0),
            None => 0,
        };
        let hits = hits
            .get("hits")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Hit::from_es_json).collect())
            .unwrap_or_default();
        Ok(Self { total, hits })
    }
}

impl Hit {
    /// Reads one hit or get response. `None` without an `_id`.
    #[must_use]
    pub fn from_es_json(v: &Value) -> Option<Self> {
        let id = v.get("_id")?.as_str()?.to_string();
        let source = v.get("_source").and_then(Value::as_object).cloned().unwrap_or_default();
        let version = match (
            v.get("_seq_no").and_then(Value::as_u64),
            v.get("_primary_term").and_then(Value::as_u64),
        ) {
            (Some(seq_no), Some(primary_term)) => Some(DocVersion { seq_no, primary_term }),
            _ => None,
        };
        Some(Self { id, source, version })
    }
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn ping(&self) -> Result<()>;

    /// Creates `index` with `mapping` unless it already exists.
    async fn ensure_index(&self, index: &str, mapping: &Value) -> Result<()>;

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse>;

    /// Counts documents matching a query clause.
    async fn count(&self, index: &str, query: &Value) -> Result<u64>;

    /// Realtime lookup, independent of refresh.
    async fn get(&self, index: &str, id: &str) -> Result<Option<Hit>>;

    async fn exists(&self, index: &str, id: &str) -> Result<bool>;

    /// Writes one document under `req.condition`; a failed precondition is a
    /// `ConnectorError::Conflict`.
    async fn index(&self, req: IndexRequest) -> Result<DocVersion>;

    /// Deletes searchable documents matching a query clause; returns the count.
    async fn delete_by_query(&self, index: &str, query: &Value, refresh: RefreshPolicy) -> Result<u64>;

    /// Runs a suggester specification and returns the `suggest` section.
    async fn suggest(&self, index: &str, spec: &Value) -> Result<Value>;

    async fn refresh(&self, index: &str) -> Result<()>;
}
