use super::common::{obj, user_schema};
use async_trait::async_trait;
use nexus_search::backend::{DocVersion, Hit, IndexRequest, SearchResponse, WriteCondition};
use nexus_search::{
    Connector, ConnectorConfig, ConnectorError, FieldType, InMemoryBackend, ModelSchema, RefreshPolicy,
    Result, SearchBackend,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn connector(backend: Arc<InMemoryBackend>, config: ConnectorConfig) -> Connector {
    Connector::new(user_schema(), backend, config).unwrap()
}

#[tokio::test]
async fn create_rejects_taken_identifiers() {
    let c = connector(Arc::new(InMemoryBackend::new()), ConnectorConfig::default());
    c.create(obj(json!({"seq": 1, "name": "Paul"}))).await.unwrap();
    let err = c.create(obj(json!({"seq": 1, "name": "Impostor"}))).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Conflict(_)));
    let stored = c.find_by_id(&json!(1)).await.unwrap().unwrap();
    assert_eq!(stored.get("name"), Some(&json!("Paul")));
}

#[tokio::test]
async fn create_generates_string_identifiers() {
    let schema = ModelSchema::builder("Note")
        .id("key", FieldType::String)
        .field("body", FieldType::String)
        .build()
        .unwrap();
    let c = Connector::new(schema, Arc::new(InMemoryBackend::new()), ConnectorConfig::default()).unwrap();
    let r = c.create(obj(json!({"body": "hello"}))).await.unwrap();
    let id = r.id().and_then(Value::as_str).unwrap().to_string();
    assert_eq!(id.len(), 36);
    assert!(c.exists(&json!(id)).await.unwrap());
}

#[tokio::test]
async fn numeric_identifiers_are_required() {
    let c = connector(Arc::new(InMemoryBackend::new()), ConnectorConfig::default());
    let err = c.create(obj(json!({"name": "Anonymous"}))).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Validation(_)));
}

#[tokio::test]
async fn upsert_is_idempotent() {
    let backend = Arc::new(InMemoryBackend::new());
    let c = connector(backend.clone(), ConnectorConfig::default());
    for _ in 0..3 {
        c.update_or_create(obj(json!({"seq": 7, "name": "Mal Evans", "order": 9}))).await.unwrap();
    }
    assert_eq!(backend.live_len(c.index()), 1);
    let r = c.update_or_create(obj(json!({"id": 7, "vip": true}))).await.unwrap();
    assert_eq!(r.get("name"), Some(&json!("Mal Evans")));
    assert_eq!(r.get("vip"), Some(&json!(true)));
    assert_eq!(backend.live_len(c.index()), 1);
}

#[tokio::test]
async fn upsert_without_identifier_needs_one_for_numeric_models() {
    let c = connector(Arc::new(InMemoryBackend::new()), ConnectorConfig::default());
    assert!(c.update_or_create(obj(json!({"name": "x"}))).await.is_err());
}

#[tokio::test]
async fn refresh_true_makes_writes_searchable_at_once() {
    let backend = Arc::new(InMemoryBackend::with_visibility_lag(Duration::from_secs(60)));
    let c = connector(backend, ConnectorConfig::default().with_refresh(RefreshPolicy::True));
    c.create(obj(json!({"seq": 1, "name": "Paul"}))).await.unwrap();
    let all = c.filter(&json!({})).unwrap();
    assert_eq!(c.find(&all).await.unwrap().len(), 1);
}

#[tokio::test]
async fn refresh_false_lags_behind() {
    let backend = Arc::new(InMemoryBackend::with_visibility_lag(Duration::from_secs(60)));
    let c = connector(backend.clone(), ConnectorConfig::default());
    c.create(obj(json!({"seq": 1, "name": "Paul"}))).await.unwrap();
    let all = c.filter(&json!({})).unwrap();
    assert!(c.find(&all).await.unwrap().is_empty());
    assert!(c.exists(&json!(1)).await.unwrap());
    backend.refresh(c.index()).await.unwrap();
    assert_eq!(c.find(&all).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upserts_keep_one_document() {
    let backend = Arc::new(InMemoryBackend::new());
    let c = connector(backend.clone(), ConnectorConfig::default());
    let mut tasks = Vec::new();
    for i in 0..16 {
        let c = c.clone();
        tasks.push(tokio::spawn(async move {
            let field = format!("f{i}");
            let mut payload = obj(json!({"seq": 42}));
            payload.insert(field.clone(), json!(i));
            (field, c.update_or_create(payload).await)
        }));
    }
    let mut applied = Vec::new();
    for t in tasks {
        let (field, res) = t.await.unwrap();
        match res {
            Ok(_) => applied.push(field),
            Err(ConnectorError::Conflict(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(!applied.is_empty());
    assert_eq!(backend.live_len(c.index()), 1);
    let stored = c.find_by_id(&json!(42)).await.unwrap().unwrap();
    for field in &applied {
        assert!(stored.get(field).is_some(), "lost update for {field}");
    }
}

/// Delegates to an in-memory store but loses every versioned write.
struct AlwaysStale {
    inner: InMemoryBackend,
    attempts: AtomicU32,
}

#[async_trait]
impl SearchBackend for AlwaysStale {
    fn name(&self) -> &'static str {
        "always-stale"
    }
    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
    async fn ensure_index(&self, index: &str, mapping: &Value) -> Result<()> {
        self.inner.ensure_index(index, mapping).await
    }
    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse> {
        self.inner.search(index, body).await
    }
    async fn count(&self, index: &str, query: &Value) -> Result<u64> {
        self.inner.count(index, query).await
    }
    async fn get(&self, index: &str, id: &str) -> Result<Option<Hit>> {
        self.inner.get(index, id).await
    }
    async fn exists(&self, index: &str, id: &str) -> Result<bool> {
        self.inner.exists(index, id).await
    }
    async fn index(&self, req: IndexRequest) -> Result<DocVersion> {
        if matches!(req.condition, WriteCondition::IfVersion(_)) {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            return Err(ConnectorError::Conflict("stale".into()));
        }
        self.inner.index(req).await
    }
    async fn delete_by_query(&self, index: &str, query: &Value, refresh: RefreshPolicy) -> Result<u64> {
        self.inner.delete_by_query(index, query, refresh).await
    }
    async fn suggest(&self, index: &str, spec: &Value) -> Result<Value> {
        self.inner.suggest(index, spec).await
    }
    async fn refresh(&self, index: &str) -> Result<()> {
        self.inner.refresh(index).await
    }
}

#[tokio::test]
async fn upsert_gives_up_after_bounded_attempts() {
    let backend = Arc::new(AlwaysStale { inner: InMemoryBackend::new(), attempts: AtomicU32::new(0) });
    let c = Connector::new(user_schema(), backend.clone(), ConnectorConfig::default()).unwrap();
    c.create(obj(json!({"seq": 1, "name": "Paul"}))).await.unwrap();
    let err = c.update_or_create(obj(json!({"seq": 1, "rating": 5}))).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Conflict(_)));
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 3);
    let err = c.update_attributes(&json!(1), obj(json!({"rating": 5}))).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Conflict(_)));
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 6);
}
