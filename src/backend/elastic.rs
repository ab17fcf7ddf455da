//! Elasticsearch client adapter.

use super::{DocVersion, Hit, IndexRequest, SearchBackend, SearchResponse, WriteCondition};
use crate::config::{ConnectorConfig, RefreshPolicy};
use crate::errors::{ConnectorError, Result};
use async_trait::async_trait;
use elasticsearch::http::response::Response;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::indices::{IndicesCreateParts, IndicesExistsParts, IndicesRefreshParts};
use elasticsearch::params::{Conflicts, OpType, Refresh};
use elasticsearch::{
    CountParts, DeleteByQueryParts, Elasticsearch, ExistsParts, GetParts, IndexParts, SearchParts,
};
use serde_json::{Value, json};
use std::time::Duration;

pub struct ElasticsearchBackend {
    client: Elasticsearch,
    timeout_ms: u64,
}

impl std::fmt::Debug for ElasticsearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchBackend").field("timeout_ms", &self.timeout_ms).finish_non_exhaustive()
    }
}

impl ElasticsearchBackend {
    /// Connects to the first configured node.
    pub fn new(config: &ConnectorConfig) -> Result<Self> {
        let url = config.nodes.first().cloned().unwrap_or_else(|| "http://localhost:9200".to_string());
        let parsed: elasticsearch::http::Url = url
            .parse()
            .map_err(|e| ConnectorError::Config(format!("invalid node url `{url}`: {e}")))?;
        let transport = TransportBuilder::new(SingleNodeConnectionPool::new(parsed))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ConnectorError::Connectivity(format!("failed to build transport: {e}")))?;
        Ok(Self { client: Elasticsearch::new(transport), timeout_ms: config.request_timeout_ms })
    }

    fn transport_error(&self, e: &elasticsearch::Error) -> ConnectorError {
        if e.is_timeout() {
            ConnectorError::Timeout(self.timeout_ms)
        } else {
            ConnectorError::Connectivity(e.to_string())
        }
    }

    /// Reads a JSON body, turning non-success statuses into errors.
    async fn json_body(response: Response, what: &str) -> Result<Value> {
        let status = response.status_code().as_u16();
        if !is_success(status) {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, what));
        }
        response.json::<Value>().await.map_err(|e| ConnectorError::Backend(format!("{what}: {e}")))
    }

    /// Like `json_body`, but `None` when the index does not exist.
    async fn json_body_or_missing(response: Response, what: &str) -> Result<Option<Value>> {
        let status = response.status_code().as_u16();
        if status != 404 {
            return Self::json_body(response, what).await.map(Some);
        }
        let body = response.text().await.unwrap_or_default();
        if index_missing(status, &body) {
            log::debug!("{what} on a missing index");
            return Ok(None);
        }
        Err(status_error(status, &body, what))
    }
}

const fn is_success(status: u16) -> bool {
    status >= 200 && status < 300
}

/// Error for a non-success status. Gateway failures mean the cluster could
/// not be reached.
fn status_error(status: u16, body: &str, what: &str) -> ConnectorError {
    match status {
        409 => ConnectorError::Conflict(format!("{what}: {body}")),
        502..=504 => ConnectorError::Connectivity(format!("{what} failed (status {status}): {body}")),
        _ => ConnectorError::Backend(format!("{what} failed (status {status}): {body}")),
    }
}

/// Outcome of a HEAD existence check.
fn exists_status(status: u16, what: &str) -> Result<bool> {
    match status {
        404 => Ok(false),
        s if is_success(s) => Ok(true),
        s => Err(status_error(s, "", what)),
    }
}

fn index_missing(status: u16, body: &str) -> bool {
    status == 404 && body.contains("index_not_found_exception")
}

const fn to_es_refresh(r: RefreshPolicy) -> Refresh {
    match r {
        RefreshPolicy::False => Refresh::False,
        RefreshPolicy::True => Refresh::True,
        RefreshPolicy::WaitFor => Refresh::WaitFor,
    }
}

fn as_es_i64(n: u64) -> Result<i64> {
    i64::try_from(n).map_err(|_| ConnectorError::validation(format!("version {n} out of range")))
}

/// Index API parameters for a write condition.
#[derive(Debug, Default, PartialEq, Eq)]
struct WriteParams {
    create_only: bool,
    if_seq_no: Option<i64>,
    if_primary_term: Option<i64>,
}

fn write_params(condition: WriteCondition) -> Result<WriteParams> {
    Ok(match condition {
        WriteCondition::Any => WriteParams::default(),
        WriteCondition::CreateOnly => WriteParams { create_only: true, ..WriteParams::default() },
        WriteCondition::IfVersion(v) => WriteParams {
            create_only: false,
            if_seq_no: Some(as_es_i64(v.seq_no)?),
            if_primary_term: Some(as_es_i64(v.primary_term)?),
        },
    })
}

fn query_body(query: &Value) -> Value {
    json!({ "query": query })
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn ping(&self) -> Result<()> {
        let response = self.client.ping().send().await.map_err(|e| self.transport_error(&e))?;
        if response.status_code().is_success() {
            Ok(())
        } else {
            Err(ConnectorError::Connectivity(format!("ping returned status {}", response.status_code())))
        }
    }

    async fn ensure_index(&self, index: &str, mapping: &Value) -> Result<()> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        if exists_status(response.status_code().as_u16(), "index exists")? {
            return Ok(());
        }
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(mapping.clone())
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        let status = response.status_code().as_u16();
        if is_success(status) {
            log::info!("created index {index}");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        // lost a creation race
        if body.contains("resource_already_exists_exception") {
            return Ok(());
        }
        Err(status_error(status, &body, "create index"))
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(body.clone())
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        match Self::json_body_or_missing(response, "search").await? {
            Some(body) => SearchResponse::from_es_json(&body),
            None => Ok(SearchResponse::default()),
        }
    }

    async fn count(&self, index: &str, query: &Value) -> Result<u64> {
        let response = self
            .client
            .count(CountParts::Index(&[index]))
            .body(query_body(query))
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        let body = Self::json_body_or_missing(response, "count").await?;
        Ok(body.and_then(|b| b.get("count").and_then(Value::as_u64)).unwrap_or(0))
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<Hit>> {
        let response = self
            .client
            .get(GetParts::IndexId(index, id))
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }
        let body = Self::json_body(response, "get").await?;
        if body.get("found").and_then(Value::as_bool) == Some(false) {
            return Ok(None);
        }
        Ok(Hit::from_es_json(&body))
    }

    async fn exists(&self, index: &str, id: &str) -> Result<bool> {
        let response = self
            .client
            .exists(ExistsParts::IndexId(index, id))
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        exists_status(response.status_code().as_u16(), "exists")
    }

    async fn index(&self, req: IndexRequest) -> Result<DocVersion> {
        let params = write_params(req.condition)?;
        let mut call = self
            .client
            .index(IndexParts::IndexId(&req.index, &req.id))
            .body(Value::Object(req.source))
            .refresh(to_es_refresh(req.refresh));
        if params.create_only {
            call = call.op_type(OpType::Create);
        }
        if let (Some(seq_no), Some(term)) = (params.if_seq_no, params.if_primary_term) {
            call = call.if_seq_no(seq_no).if_primary_term(term);
        }
        let response = call.send().await.map_err(|e| self.transport_error(&e))?;
        let body = Self::json_body(response, "index").await?;
        Ok(DocVersion {
            seq_no: body.get("_seq_no").and_then(Value::as_u64).unwrap_or(0),
            primary_term: body.get("_primary_term").and_then(Value::as_u64).unwrap_or(1),
        })
    }

    async fn delete_by_query(&self, index: &str, query: &Value, refresh: RefreshPolicy) -> Result<u64> {
        let response = self
            .client
            .delete_by_query(DeleteByQueryParts::Index(&[index]))
            .body(query_body(query))
            .conflicts(Conflicts::Proceed)
            .refresh(refresh.is_immediate())
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        let body = Self::json_body_or_missing(response, "delete_by_query").await?;
        Ok(body.and_then(|b| b.get("deleted").and_then(Value::as_u64)).unwrap_or(0))
    }

    async fn suggest(&self, index: &str, spec: &Value) -> Result<Value> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(json!({ "size": 0, "suggest": spec }))
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        let body = Self::json_body(response, "suggest").await?;
        Ok(body.get("suggest").cloned().unwrap_or_else(|| json!({})))
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        Self::json_body(response, "refresh").await.map(|_| ())
    }
}
