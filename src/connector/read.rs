use super::{Connector, SuggestResponse};
use crate::errors::{ConnectorError, Result};
use crate::query::{Condition, QueryFilter, build_query};
use crate::record::Record;
use serde_json::{Map, Value};

impl Connector {
    /// Backend health check.
    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }

    /// Runs a filter. `suggests` filters return one record per suggestion
    /// option; `native` filters send their body untouched.
    pub async fn find(&self, filter: &QueryFilter) -> Result<Vec<Record>> {
        if let Some(spec) = &filter.suggests {
            return self.find_suggestions(spec).await;
        }
        let request = match &filter.native {
            Some(native) => self.builder().build_native(native),
            None if filter.limit.is_none() && self.config.default_limit.is_some() => {
                let mut f = filter.clone();
                f.limit = self.config.default_limit;
                self.builder().build(&f)?
            }
            None => self.builder().build(filter)?,
        };
        self.log_request("search", &request.body);
        let response = self.backend.search(&request.index, &request.body).await?;
        log::debug!("find: index={} total={} returned={}", self.index, response.total, response.hits.len());
        Ok(response
            .hits
            .into_iter()
            .map(|h| Record::from_source(&self.schema, &h.id, h.source).project(filter.fields.as_ref()))
            .collect())
    }

    pub async fn find_one(&self, filter: &QueryFilter) -> Result<Option<Record>> {
        let mut f = filter.clone();
        f.limit = Some(1);
        Ok(self.find(&f).await?.into_iter().next())
    }

    /// Realtime lookup by identifier; `None` when absent.
    pub async fn find_by_id(&self, id: &Value) -> Result<Option<Record>> {
        let doc_id = self.schema.id_to_backend(id)?;
        let hit = self.backend.get(&self.index, &doc_id).await?;
        Ok(hit.map(|h| Record::from_source(&self.schema, &h.id, h.source)))
    }

    /// Records with the given identifiers that also satisfy `filter`. Results
    /// follow the filter's ordering, not the order of `ids`.
    pub async fn find_by_ids(&self, ids: &[Value], filter: Option<&QueryFilter>) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let doc_ids = ids.iter().map(|id| self.schema.id_to_backend(id)).collect::<Result<Vec<_>>>()?;
        let mut f = filter.cloned().unwrap_or_default();
        if f.native.is_some() || f.suggests.is_some() {
            return Err(ConnectorError::validation("find_by_ids does not accept `native` or `suggests`"));
        }
        f.condition = Condition::Ids(doc_ids).and(f.condition);
        self.find(&f).await
    }

    pub async fn count(&self, condition: &Condition) -> Result<u64> {
        let query = build_query(condition);
        self.log_request("count", &query);
        self.backend.count(&self.index, &query).await
    }

    pub async fn exists(&self, id: &Value) -> Result<bool> {
        let doc_id = self.schema.id_to_backend(id)?;
        self.backend.exists(&self.index, &doc_id).await
    }

    /// Runs a raw suggester specification.
    ///
    /// # Errors
    /// `ConnectorError::Validation` unless `spec` is an object.
    pub async fn suggest(&self, spec: &Value) -> Result<SuggestResponse> {
        if !spec.is_object() {
            return Err(ConnectorError::validation("suggest spec must be an object"));
        }
        let request = self.builder().build_suggest(spec);
        self.log_request("suggest", &request.body);
        let raw = self.backend.suggest(&self.index, spec).await?;
        if raw.is_null() {
            return Ok(SuggestResponse::new());
        }
        Ok(serde_json::from_value(raw)?)
    }

    async fn find_suggestions(&self, spec: &Value) -> Result<Vec<Record>> {
        let id_field = self.schema.id_field();
        let mut out = Vec::new();
        for (name, entries) in self.suggest(spec).await? {
            for entry in entries {
                for opt in entry.options {
                    let mut fields = Map::new();
                    fields.insert("suggester".into(), Value::String(name.clone()));
                    fields.insert("text".into(), Value::String(opt.text));
                    fields.insert("score".into(), serde_json::Number::from_f64(opt.score).map_or(Value::Null, Value::Number));
                    fields.insert("freq".into(), Value::from(opt.freq));
                    out.push(Record::new(id_field, fields));
                }
            }
        }
        Ok(out)
    }
}
