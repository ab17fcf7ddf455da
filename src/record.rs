use crate::query::Projection;
use crate::schema::ModelSchema;
use serde::Serialize;
use serde_json::{Map, Value};

/// A model-shaped record: field values plus the name of the identifier field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    #[serde(skip)]
    id_field: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Record {
    #[must_use]
    pub fn new(id_field: &str, fields: Map<String, Value>) -> Self {
        Self { id_field: id_field.to_string(), fields }
    }

    /// Rebuilds a record from a backend document. The backend id fills the
    /// identifier field, typed per the schema, unless the source carries it.
    #[must_use]
    pub fn from_source(schema: &ModelSchema, id: &str, mut source: Map<String, Value>) -> Self {
        let id_field = schema.id_field();
        if source.get(id_field).is_none_or(Value::is_null) {
            source.insert(id_field.to_string(), schema.id_from_backend(id));
        }
        Self::new(id_field, source)
    }

    #[must_use]
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        self.fields.get(&self.id_field).filter(|v| !v.is_null())
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_string(), value);
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// Shallow merge: supplied fields overwrite, others are preserved.
    pub fn merge(&mut self, partial: &Map<String, Value>) {
        for (k, v) in partial {
            self.fields.insert(k.clone(), v.clone());
        }
    }

    /// Applies a projection. Absent source fields stay absent.
    #[must_use]
    pub fn project(self, projection: Option<&Projection>) -> Self {
        let fields = match projection {
            None => self.fields,
            Some(Projection::Include(keep)) => {
                let mut out = Map::new();
                for f in keep {
                    if let Some(v) = self.fields.get(f) {
                        out.insert(f.clone(), v.clone());
                    }
                }
                out
            }
            Some(Projection::Exclude(drop)) => {
                let mut out = self.fields;
                for f in drop {
                    out.remove(f);
                }
                out
            }
        };
        Self { id_field: self.id_field, fields }
    }
}
