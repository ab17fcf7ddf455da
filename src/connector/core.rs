use crate::backend::SearchBackend;
use crate::config::ConnectorConfig;
use crate::errors::Result;
use crate::logger::QUERY_TARGET;
use crate::query::{QueryBuilder, QueryFilter, parse_filter};
use crate::schema::ModelSchema;
use serde_json::Value;
use std::sync::Arc;

/// Binds one model schema to a backend index. Holds no mutable state and is
/// cheap to clone.
#[derive(Clone)]
pub struct Connector {
    pub(crate) schema: Arc<ModelSchema>,
    pub(crate) backend: Arc<dyn SearchBackend>,
    pub(crate) config: ConnectorConfig,
    pub(crate) index: String,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("model", &self.schema.name())
            .field("index", &self.index)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl Connector {
    /// # Errors
    /// Returns a config error when `config` fails validation.
    pub fn new(
        schema: impl Into<Arc<ModelSchema>>,
        backend: Arc<dyn SearchBackend>,
        config: ConnectorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let schema = schema.into();
        let index = config.index_for(&schema);
        log::info!("connector: model={} index={index} backend={}", schema.name(), backend.name());
        Ok(Self { schema, backend, config, index })
    }

    #[must_use]
    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    #[must_use]
    pub const fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    #[must_use]
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Parses a filter object against this model's schema.
    ///
    /// # Errors
    /// Returns `ConnectorError::Validation` for malformed filters.
    pub fn filter(&self, value: &Value) -> Result<QueryFilter> {
        parse_filter(value, &self.schema)
    }

    /// Creates the backend index with the mapping derived from the schema.
    /// Existing indices are left untouched.
    pub async fn ensure_index(&self) -> Result<()> {
        let mapping = self.schema.index_mapping();
        self.log_request("ensure_index", &mapping);
        self.backend.ensure_index(&self.index, &mapping).await
    }

    pub(crate) fn builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.schema, &self.index, self.config.max_result_window)
    }

    pub(crate) fn log_request(&self, op: &str, body: &Value) {
        log::debug!(target: QUERY_TARGET, "{op} index={} body={body}", self.index);
        crate::devlog!("{op} {} {body}", self.index);
    }
}
