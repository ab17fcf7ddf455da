use super::{Connector, DeleteReport};
use crate::backend::{IndexRequest, WriteCondition};
use crate::errors::{ConnectorError, Result};
use crate::query::{Condition, build_query};
use crate::record::Record;
use crate::schema::FieldType;
use serde_json::{Map, Value};

impl Connector {
    /// Stores a new record with create-only semantics. A missing identifier
    /// is generated as a UUID v4 string.
    ///
    /// # Errors
    /// `ConnectorError::Conflict` when the identifier is already taken.
    pub async fn create(&self, data: Map<String, Value>) -> Result<Record> {
        let mut source = self.schema.normalize_source(data)?;
        let id_field = self.schema.id_field().to_string();
        let doc_id = match source.get(&id_field).filter(|v| !v.is_null()) {
            Some(id) => self.schema.id_to_backend(id)?,
            None if self.schema.id_type() == FieldType::Number => {
                return Err(ConnectorError::validation(format!(
                    "numeric identifier `{id_field}` must be supplied on create"
                )));
            }
            None => {
                let generated = uuid::Uuid::new_v4().to_string();
                source.insert(id_field.clone(), Value::String(generated.clone()));
                generated
            }
        };
        self.write(&doc_id, source.clone(), WriteCondition::CreateOnly).await?;
        log::debug!("create: index={} id={doc_id}", self.index);
        Ok(Record::new(&id_field, source))
    }

    /// Sequential `create`; stops at the first failure.
    pub async fn create_many(&self, items: Vec<Map<String, Value>>) -> Result<Vec<Record>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.create(item).await?);
        }
        Ok(out)
    }

    /// Merges `data` onto the stored record with the same identifier, or
    /// creates it. Without an identifier this is `create`.
    pub async fn update_or_create(&self, data: Map<String, Value>) -> Result<Record> {
        let partial = self.schema.normalize_source(data)?;
        let Some(id) = partial.get(self.schema.id_field()).filter(|v| !v.is_null()) else {
            return self.create(partial).await;
        };
        let doc_id = self.schema.id_to_backend(id)?;
        self.merge_into(&doc_id, &partial, true).await
    }

    /// Merges `data` onto an existing record.
    ///
    /// # Errors
    /// `ConnectorError::NoSuchDocument` when absent; `ConnectorError::Validation`
    /// when `data` tries to change the identifier.
    pub async fn update_attributes(&self, id: &Value, data: Map<String, Value>) -> Result<Record> {
        let doc_id = self.schema.id_to_backend(id)?;
        let partial = self.schema.normalize_source(data)?;
        if let Some(new_id) = partial.get(self.schema.id_field()).filter(|v| !v.is_null()) {
            if self.schema.id_to_backend(new_id)? != doc_id {
                return Err(ConnectorError::validation(format!(
                    "identifier `{}` cannot be changed from {doc_id} to {new_id}",
                    self.schema.id_field()
                )));
            }
        }
        self.merge_into(&doc_id, &partial, false).await
    }

    /// Deletes every record matching `condition`.
    pub async fn destroy_all(&self, condition: &Condition) -> Result<DeleteReport> {
        let query = build_query(condition);
        self.log_request("delete_by_query", &query);
        let deleted = self.backend.delete_by_query(&self.index, &query, self.config.refresh).await?;
        log::debug!("destroy_all: index={} deleted={deleted}", self.index);
        Ok(DeleteReport { deleted })
    }

    pub async fn destroy_by_id(&self, id: &Value) -> Result<DeleteReport> {
        let doc_id = self.schema.id_to_backend(id)?;
        self.destroy_all(&Condition::Ids(vec![doc_id])).await
    }

    async fn write(&self, doc_id: &str, source: Map<String, Value>, condition: WriteCondition) -> Result<()> {
        let req = IndexRequest {
            index: self.index.clone(),
            id: doc_id.to_string(),
            source,
            condition,
            refresh: self.config.refresh,
        };
        crate::devlog!("index {} {doc_id} {:?}", self.index, condition);
        self.backend.index(req).await.map(|_| ())
    }

    /// Optimistic read-merge-write. Lost races re-read and re-merge up to
    /// `upsert_attempts` times.
    async fn merge_into(&self, doc_id: &str, partial: &Map<String, Value>, create: bool) -> Result<Record> {
        let id_field = self.schema.id_field();
        let attempts = self.config.upsert_attempts;
        for attempt in 1..=attempts {
            let (source, condition) = match self.backend.get(&self.index, doc_id).await? {
                Some(hit) => {
                    let mut record = Record::from_source(&self.schema, &hit.id, hit.source);
                    record.merge(partial);
                    let cond = hit.version.map_or(WriteCondition::Any, WriteCondition::IfVersion);
                    (record.into_fields(), cond)
                }
                None if create => {
                    let mut source = partial.clone();
                    if !source.contains_key(id_field) {
                        source.insert(id_field.to_string(), self.schema.id_from_backend(doc_id));
                    }
                    (source, WriteCondition::CreateOnly)
                }
                None => return Err(ConnectorError::NoSuchDocument(doc_id.to_string())),
            };
            match self.write(doc_id, source.clone(), condition).await {
                Ok(()) => return Ok(Record::new(id_field, source)),
                Err(ConnectorError::Conflict(msg)) => {
                    log::debug!("merge conflict on {doc_id} (attempt {attempt}/{attempts}): {msg}");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ConnectorError::Conflict(format!(
            "document `{doc_id}` kept changing, gave up after {attempts} attempts"
        )))
    }
}
