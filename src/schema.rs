//! Model schema: the field type map, identifier field and sortable flags a
//! connector is built with. Immutable once built.

use crate::errors::{ConnectorError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::Path;

/// Alias accepted in filters for the identifier field when the model does not
/// declare a field literally named `id`.
pub const ID_ALIAS: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Number,
    String,
    Date,
    Boolean,
    Any,
}

impl FieldType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::String => "string",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Any => "any",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub ty: FieldType,
    /// Searchable in the backend. Unindexed fields are stored only.
    pub index: bool,
    pub sortable: bool,
}

/// Accepted formats of mapped date fields; matches [`normalize_date`] output
/// and raw epoch milliseconds.
pub const DATE_FORMAT: &str = "strict_date_optional_time||epoch_millis";

#[derive(Debug, Clone)]
pub struct ModelSchema {
    name: String,
    index: Option<String>,
    id_field: String,
    fields: BTreeMap<String, FieldDef>,
}

impl ModelSchema {
    #[must_use]
    pub fn builder(name: &str) -> ModelSchemaBuilder {
        ModelSchemaBuilder { name: name.to_string(), index: None, fields: Vec::new() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicit backend index, if the model pins one.
    #[must_use]
    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    #[must_use]
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    #[must_use]
    pub fn id_type(&self) -> FieldType {
        self.field_type(&self.id_field)
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Declared type of `name`; undeclared fields are `Any`.
    #[must_use]
    pub fn field_type(&self, name: &str) -> FieldType {
        self.fields.get(name).map_or(FieldType::Any, |f| f.ty)
    }

    /// Maps the `id` alias onto the identifier field.
    #[must_use]
    pub fn resolve_field<'a>(&'a self, name: &'a str) -> &'a str {
        if name == ID_ALIAS && !self.fields.contains_key(ID_ALIAS) { &self.id_field } else { name }
    }

    /// String fields need an explicit `sortable` flag; other types sort natively.
    /// Unindexed fields never sort.
    #[must_use]
    pub fn is_sortable(&self, name: &str) -> bool {
        if name == self.id_field {
            return true;
        }
        match self.fields.get(name) {
            Some(f) => f.index && (f.sortable || f.ty != FieldType::String),
            None => true,
        }
    }

    /// Undeclared fields are indexed dynamically.
    #[must_use]
    pub fn is_indexed(&self, name: &str) -> bool {
        name == self.id_field || self.fields.get(name).is_none_or(|f| f.index)
    }

    /// Index creation body for this model.
    ///
    /// Strings map to `keyword` so `term`, `wildcard` and `sort` see the exact
    /// value; strings that are not sortable drop their doc values. Numbers map
    /// to `double`, dates to `date`, booleans to `boolean`. `Any` fields are
    /// left to the dynamic template, which also maps strings to `keyword`.
    #[must_use]
    pub fn index_mapping(&self) -> Value {
        let mut props = Map::new();
        for (name, def) in self.fields() {
            let ty = match def.ty {
                FieldType::String => "keyword",
                FieldType::Number => "double",
                FieldType::Date => "date",
                FieldType::Boolean => "boolean",
                FieldType::Any => continue,
            };
            let mut m = Map::new();
            m.insert("type".into(), Value::from(ty));
            if def.ty == FieldType::Date {
                m.insert("format".into(), Value::from(DATE_FORMAT));
            }
            if !self.is_indexed(name) {
                m.insert("index".into(), Value::Bool(false));
            }
            if !self.is_sortable(name) {
                m.insert("doc_values".into(), Value::Bool(false));
            }
            props.insert(name.to_string(), Value::Object(m));
        }
        json!({
            "mappings": {
                "dynamic_templates": [
                    { "strings_as_keywords": { "match_mapping_type": "string", "mapping": { "type": "keyword" } } }
                ],
                "properties": props,
            }
        })
    }

    /// Checks `value` against the declared type of `field` and returns the
    /// backend representation (dates become RFC 3339 UTC strings).
    pub fn normalize_value(&self, field: &str, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let ty = self.field_type(field);
        match (ty, value) {
            (FieldType::Any, v) => Ok(v.clone()),
            (FieldType::Number, Value::Number(_))
            | (FieldType::String, Value::String(_))
            | (FieldType::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (FieldType::Date, v) => normalize_date(v)
                .map(Value::String)
                .ok_or_else(|| type_mismatch(field, ty, value)),
            _ => Err(type_mismatch(field, ty, value)),
        }
    }

    /// Validates and normalizes every declared field of a record source.
    pub fn normalize_source(&self, source: Map<String, Value>) -> Result<Map<String, Value>> {
        let mut out = Map::with_capacity(source.len());
        for (k, v) in source {
            let key = self.resolve_field(&k).to_string();
            let v = match &v {
                Value::Array(items) if self.field_type(&key) != FieldType::Any => Value::Array(
                    items.iter().map(|i| self.normalize_value(&key, i)).collect::<Result<_>>()?,
                ),
                _ => self.normalize_value(&key, &v)?,
            };
            out.insert(key, v);
        }
        Ok(out)
    }

    /// Backend document id for an identifier value.
    pub fn id_to_backend(&self, id: &Value) -> Result<String> {
        match id {
            Value::String(s) if !s.is_empty() => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(ConnectorError::validation(format!(
                "identifier `{}` must be a non-empty string or a number, got {id}",
                self.id_field
            ))),
        }
    }

    /// Identifier value for a backend document id, typed per the id field.
    #[must_use]
    pub fn id_from_backend(&self, id: &str) -> Value {
        if self.id_type() == FieldType::Number {
            if let Ok(i) = id.parse::<i64>() {
                return Value::from(i);
            }
            if let Some(n) = id.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                return Value::Number(n);
            }
        }
        Value::String(id.to_string())
    }

    /// Loads a schema from the `[model]` table of a TOML file.
    pub fn from_toml_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Root {
            model: SchemaSerde,
        }
        let root: Root =
            toml::from_str(text).map_err(|e| ConnectorError::Config(e.to_string()))?;
        Self::try_from(root.model)
    }
}

fn type_mismatch(field: &str, ty: FieldType, value: &Value) -> ConnectorError {
    ConnectorError::validation(format!("field `{field}` is declared {}, got {value}", ty.as_str()))
}

/// Normalizes a date given as RFC 3339, `YYYY-MM-DD`, a naive timestamp or
/// epoch milliseconds. `None` when the value is not a date.
#[must_use]
pub fn normalize_date(value: &Value) -> Option<String> {
    let dt: DateTime<Utc> = match value {
        Value::String(s) => parse_date_str(s)?,
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?)?,
        _ => return None,
    };
    Some(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ndt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0).map(|d| d.and_utc())
}

pub struct ModelSchemaBuilder {
    name: String,
    index: Option<String>,
    fields: Vec<(String, FieldDef, bool)>,
}

impl ModelSchemaBuilder {
    #[must_use]
    pub fn index(mut self, index: &str) -> Self {
        self.index = Some(index.to_string());
        self
    }

    /// Declares the identifier field.
    #[must_use]
    pub fn id(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.push((name.to_string(), FieldDef { ty, index: true, sortable: true }, true));
        self
    }

    #[must_use]
    pub fn field(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.push((name.to_string(), FieldDef { ty, index: true, sortable: false }, false));
        self
    }

    #[must_use]
    pub fn sortable(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.push((name.to_string(), FieldDef { ty, index: true, sortable: true }, false));
        self
    }

    /// Declares a field that is stored but not searchable.
    #[must_use]
    pub fn stored(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.push((name.to_string(), FieldDef { ty, index: false, sortable: false }, false));
        self
    }

    /// # Errors
    /// Fails unless exactly one identifier is declared and field names are unique.
    pub fn build(self) -> Result<ModelSchema> {
        let mut fields = BTreeMap::new();
        let mut ids = Vec::new();
        for (name, def, is_id) in self.fields {
            if name.is_empty() {
                return Err(ConnectorError::validation("empty field name"));
            }
            if is_id {
                ids.push(name.clone());
            }
            if fields.insert(name.clone(), def).is_some() {
                return Err(ConnectorError::validation(format!(
                    "field `{name}` declared twice on model `{}`",
                    self.name
                )));
            }
        }
        let id_field = match ids.as_slice() {
            [one] => one.clone(),
            [] => {
                return Err(ConnectorError::validation(format!(
                    "model `{}` declares no identifier field",
                    self.name
                )));
            }
            many => {
                return Err(ConnectorError::validation(format!(
                    "model `{}` declares {} identifier fields: {}",
                    self.name,
                    many.len(),
                    many.join(", ")
                )));
            }
        };
        Ok(ModelSchema { name: self.name, index: self.index, id_field, fields })
    }
}

// Serde-facing shape of a schema file
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaSerde {
    pub name: String,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSerde>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSerde {
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default)]
    pub id: bool,
    #[serde(default = "indexed_by_default")]
    pub index: bool,
    #[serde(default, alias = "sort")]
    pub sortable: bool,
}

const fn indexed_by_default() -> bool {
    true
}

impl TryFrom<SchemaSerde> for ModelSchema {
    type Error = ConnectorError;
    fn try_from(s: SchemaSerde) -> Result<Self> {
        let mut b = Self::builder(&s.name);
        if let Some(ix) = &s.index {
            b = b.index(ix);
        }
        for (name, f) in s.fields {
            let def = FieldDef { ty: f.ty, index: f.index || f.id, sortable: f.sortable || f.id };
            b.fields.push((name, def, f.id));
        }
        b.build()
    }
}
