//! Query DSL builder.
//!
//! Translates a parsed [`QueryFilter`] into an Elasticsearch-style search
//! body: a `query` tree mirroring the condition tree, a `sort` array and
//! `from`/`size` pagination.

use crate::errors::{ConnectorError, Result};
use crate::schema::ModelSchema;
use serde_json::{Map, Value, json};

use super::types::{Condition, QueryFilter, SortSpec};

/// A complete backend search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub index: String,
    pub body: Value,
}

/// Builds backend requests for one model.
pub struct QueryBuilder<'a> {
    schema: &'a ModelSchema,
    index: &'a str,
    max_window: usize,
}

impl<'a> QueryBuilder<'a> {
    #[must_use]
    pub const fn new(schema: &'a ModelSchema, index: &'a str, max_window: usize) -> Self {
        Self { schema, index, max_window }
    }

    /// Builds the search body for a filter.
    ///
    /// # Errors
    /// Fails when `skip` lies beyond the maximum result window.
    pub fn build(&self, filter: &QueryFilter) -> Result<SearchRequest> {
        if filter.skip >= self.max_window {
            return Err(ConnectorError::validation(format!(
                "skip {} is outside the result window of {}",
                filter.skip, self.max_window
            )));
        }
        let room = self.max_window - filter.skip;
        let size = filter.limit.unwrap_or(room).min(room);
        let body = json!({
            "query": build_query(&filter.condition),
            "sort": build_sort(&self.sort_specs(&filter.order)),
            "from": filter.skip,
            "size": size,
            "track_total_hits": true,
        });
        Ok(SearchRequest { index: self.index.to_string(), body })
    }

    /// The effective ordering: the requested one, or ascending by identifier.
    #[must_use]
    pub fn sort_specs(&self, order: &[SortSpec]) -> Vec<SortSpec> {
        if order.is_empty() { vec![SortSpec::asc(self.schema.id_field())] } else { order.to_vec() }
    }

    /// Wraps a raw suggester specification into a search body.
    #[must_use]
    pub fn build_suggest(&self, spec: &Value) -> SearchRequest {
        SearchRequest { index: self.index.to_string(), body: json!({ "size": 0, "suggest": spec }) }
    }

    /// Passes a native body through untouched.
    #[must_use]
    pub fn build_native(&self, native: &Value) -> SearchRequest {
        SearchRequest { index: self.index.to_string(), body: native.clone() }
    }
}

/// Translates a condition tree into a query clause.
#[must_use]
pub fn build_query(c: &Condition) -> Value {
    match c {
        Condition::True => json!({ "match_all": {} }),
        Condition::And(cs) if cs.is_empty() => json!({ "match_all": {} }),
        Condition::And(cs) => {
            json!({ "bool": { "must": cs.iter().map(build_query).collect::<Vec<_>>() } })
        }
        Condition::Or(cs) if cs.is_empty() => json!({ "match_none": {} }),
        Condition::Or(cs) => json!({
            "bool": {
                "should": cs.iter().map(build_query).collect::<Vec<_>>(),
                "minimum_should_match": 1
            }
        }),
        Condition::Eq { field, value } => term(field, value),
        Condition::Neq { field, value } => must_not(term(field, value)),
        Condition::In { values, .. } | Condition::Nin { values, .. } if values.is_empty() => {
            if matches!(c, Condition::In { .. }) {
                json!({ "match_none": {} })
            } else {
                json!({ "match_all": {} })
            }
        }
        Condition::In { field, values } => json!({ "terms": { field.as_str(): values } }),
        Condition::Nin { field, values } => must_not(json!({ "terms": { field.as_str(): values } })),
        Condition::Range { bound: None, .. } => json!({ "match_none": {} }),
        Condition::Range { field, op, bound: Some(v) } => {
            let mut r = Map::new();
            r.insert(op.as_str().to_string(), v.clone());
            json!({ "range": { field.as_str(): Value::Object(r) } })
        }
        Condition::Between { field, low, high } => {
            json!({ "range": { field.as_str(): { "gte": low, "lte": high } } })
        }
        Condition::Exists { field, exists: true } => json!({ "exists": { "field": field } }),
        Condition::Exists { field, exists: false } => {
            must_not(json!({ "exists": { "field": field } }))
        }
        Condition::Like { field, pattern, negated } => {
            let q = json!({ "wildcard": { field.as_str(): { "value": like_to_wildcard(pattern) } } });
            if *negated { must_not(q) } else { q }
        }
        #[cfg(feature = "regex")]
        Condition::Regexp { field, pattern } => {
            json!({ "regexp": { field.as_str(): { "value": pattern } } })
        }
        Condition::Ids(ids) => json!({ "ids": { "values": ids } }),
    }
}

/// Translates sort specs, keeping left-to-right priority.
#[must_use]
pub fn build_sort(specs: &[SortSpec]) -> Value {
    Value::Array(
        specs
            .iter()
            .map(|s| json!({ s.field.as_str(): { "order": s.order.as_str(), "missing": "_last" } }))
            .collect(),
    )
}

fn term(field: &str, value: &Value) -> Value {
    json!({ "term": { field: value } })
}

fn must_not(q: Value) -> Value {
    json!({ "bool": { "must_not": [q] } })
}

/// `%` and `_` become `*` and `?`; literal wildcard characters are escaped.
#[must_use]
pub fn like_to_wildcard(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    if matches!(next, '*' | '?') {
                        out.push('\\');
                    }
                    out.push(next);
                }
            }
            '%' => out.push('*'),
            '_' => out.push('?'),
            '*' | '?' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}
