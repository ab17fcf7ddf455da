use crate::errors::{ConnectorError, Result};
use crate::schema::{FieldType, ModelSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::types::{
    CmpOp, Condition, MAX_DEPTH, MAX_IN_SET, MAX_PROJECTION_FIELDS, MAX_SORT_FIELDS, Order,
    Projection, QueryFilter, SortSpec,
};

// Serde-facing structures for safe JSON parsing of filters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSerde {
    #[serde(default, rename = "where")]
    pub where_: Option<Value>,
    #[serde(default)]
    pub order: Option<OrderSerde>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub fields: Option<FieldsSerde>,
    #[serde(default)]
    pub native: Option<Value>,
    #[serde(default)]
    pub suggests: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderSerde {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldsSerde {
    Flags(BTreeMap<String, bool>),
    List(Vec<String>),
    One(String),
}

const RANGE_OPS: [(&str, CmpOp); 4] =
    [("gt", CmpOp::Gt), ("gte", CmpOp::Gte), ("lt", CmpOp::Lt), ("lte", CmpOp::Lte)];

fn is_operator(key: &str) -> bool {
    matches!(
        key,
        "eq" | "neq" | "gt" | "gte" | "lt" | "lte" | "inq" | "nin" | "between" | "exists"
            | "like" | "nlike"
    ) || (cfg!(feature = "regex") && key == "regexp")
}

/// Parses a full filter object (`where`, `order`, `limit`, `skip`/`offset`,
/// `fields`, `native`, `suggests`) against a model schema.
///
/// # Errors
/// Returns `ConnectorError::Validation` for any unknown key, operator or
/// value whose type does not match the field's declared type.
pub fn parse_filter(value: &Value, schema: &ModelSchema) -> Result<QueryFilter> {
    if value.is_null() {
        return Ok(QueryFilter::default());
    }
    let fs: FilterSerde = serde_json::from_value(value.clone())
        .map_err(|e| ConnectorError::validation(format!("malformed filter: {e}")))?;
    QueryFilter::try_from_serde(fs, schema)
}

/// # Errors
/// Returns an error if the JSON string cannot be parsed into a filter structure.
pub fn parse_filter_json(json: &str, schema: &ModelSchema) -> Result<QueryFilter> {
    let v: Value = serde_json::from_str(json)?;
    parse_filter(&v, schema)
}

/// Parses just a `where` object into a condition tree.
///
/// # Errors
/// Same failure modes as [`parse_filter`].
pub fn parse_where(value: &Value, schema: &ModelSchema) -> Result<Condition> {
    where_at_depth(value, schema, 0)
}

impl QueryFilter {
    fn try_from_serde(fs: FilterSerde, schema: &ModelSchema) -> Result<Self> {
        let condition = match &fs.where_ {
            Some(w) => parse_where(w, schema)?,
            None => Condition::True,
        };
        let order = match &fs.order {
            Some(o) => parse_order(o, schema)?,
            None => Vec::new(),
        };
        let skip = match (fs.skip, fs.offset) {
            (Some(s), Some(o)) if s != o => {
                return Err(ConnectorError::validation(format!(
                    "skip ({s}) and offset ({o}) disagree"
                )));
            }
            (Some(s), _) | (None, Some(s)) => s,
            (None, None) => 0,
        };
        let fields = fs.fields.as_ref().map(|f| parse_fields(f, schema)).transpose()?;
        for (name, raw) in [("native", &fs.native), ("suggests", &fs.suggests)] {
            if raw.as_ref().is_some_and(|v| !v.is_object()) {
                return Err(ConnectorError::validation(format!("`{name}` must be an object")));
            }
        }
        if fs.native.is_some() && fs.suggests.is_some() {
            return Err(ConnectorError::validation("`native` and `suggests` are mutually exclusive"));
        }
        Ok(Self {
            condition,
            order,
            limit: fs.limit,
            skip,
            fields,
            native: fs.native,
            suggests: fs.suggests,
        })
    }
}

fn where_at_depth(value: &Value, schema: &ModelSchema, depth: usize) -> Result<Condition> {
    if depth > MAX_DEPTH {
        return Err(ConnectorError::validation("where clause nested too deeply"));
    }
    let obj = match value {
        Value::Object(o) => o,
        Value::Null => return Ok(Condition::True),
        other => {
            return Err(ConnectorError::validation(format!(
                "where clause must be an object, got {other}"
            )));
        }
    };
    let mut parts = Vec::with_capacity(obj.len());
    for (key, val) in obj {
        match key.as_str() {
            "and" | "or" => {
                let items = val.as_array().ok_or_else(|| {
                    ConnectorError::validation(format!("`{key}` expects an array of conditions"))
                })?;
                let subs = items
                    .iter()
                    .map(|i| where_at_depth(i, schema, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                parts.push(if key == "and" { Condition::And(subs) } else { Condition::Or(subs) });
            }
            _ => parse_field(schema.resolve_field(key), val, schema, &mut parts)?,
        }
    }
    Ok(match parts.len() {
        0 => Condition::True,
        1 => parts.remove(0),
        _ => Condition::And(parts),
    })
}

fn parse_field(
    field: &str,
    val: &Value,
    schema: &ModelSchema,
    out: &mut Vec<Condition>,
) -> Result<()> {
    if !schema.is_indexed(field) {
        return Err(ConnectorError::validation(format!("field `{field}` is not indexed")));
    }
    match val {
        Value::Object(ops) => {
            if ops.is_empty() {
                return Err(ConnectorError::validation(format!(
                    "empty operator object on `{field}`"
                )));
            }
            if let Some(bad) = ops.keys().find(|k| !is_operator(k)) {
                return Err(ConnectorError::validation(format!(
                    "unknown operator `{bad}` on `{field}`"
                )));
            }
            for (op, arg) in ops {
                out.push(parse_op(field, op, arg, schema)?);
            }
        }
        Value::Null => out.push(Condition::Exists { field: field.to_string(), exists: false }),
        Value::Array(items) => {
            out.push(Condition::In { field: field.to_string(), values: scalar_list(field, items, schema)? });
        }
        v => out.push(Condition::Eq { field: field.to_string(), value: scalar(field, v, schema)? }),
    }
    Ok(())
}

fn parse_op(field: &str, op: &str, arg: &Value, schema: &ModelSchema) -> Result<Condition> {
    let f = field.to_string();
    if let Some((_, cmp)) = RANGE_OPS.iter().find(|(name, _)| *name == op) {
        let bound = if arg.is_null() { None } else { Some(scalar(field, arg, schema)?) };
        return Ok(Condition::Range { field: f, op: *cmp, bound });
    }
    Ok(match op {
        "eq" if arg.is_null() => Condition::Exists { field: f, exists: false },
        "eq" => Condition::Eq { field: f, value: scalar(field, arg, schema)? },
        "neq" if arg.is_null() => Condition::Exists { field: f, exists: true },
        "neq" => Condition::Neq { field: f, value: scalar(field, arg, schema)? },
        "inq" | "nin" => {
            let items = arg.as_array().ok_or_else(|| {
                ConnectorError::validation(format!("`{op}` on `{field}` expects an array"))
            })?;
            let values = scalar_list(field, items, schema)?;
            if op == "inq" { Condition::In { field: f, values } } else { Condition::Nin { field: f, values } }
        }
        "between" => match arg.as_array().map(Vec::as_slice) {
            Some([lo, hi]) if !lo.is_null() && !hi.is_null() => Condition::Between {
                field: f,
                low: scalar(field, lo, schema)?,
                high: scalar(field, hi, schema)?,
            },
            _ => {
                return Err(ConnectorError::validation(format!(
                    "`between` on `{field}` expects [low, high]"
                )));
            }
        },
        "exists" => match arg {
            Value::Bool(b) => Condition::Exists { field: f, exists: *b },
            _ => return Err(ConnectorError::validation(format!("`exists` on `{field}` expects a boolean"))),
        },
        "like" | "nlike" => {
            let ty = schema.field_type(field);
            if !matches!(ty, FieldType::String | FieldType::Any) {
                return Err(ConnectorError::validation(format!(
                    "`{op}` needs a string field, `{field}` is {}",
                    ty.as_str()
                )));
            }
            let pattern = arg.as_str().ok_or_else(|| {
                ConnectorError::validation(format!("`{op}` on `{field}` expects a string pattern"))
            })?;
            Condition::Like { field: f, pattern: pattern.to_string(), negated: op == "nlike" }
        }
        #[cfg(feature = "regex")]
        "regexp" => {
            let pattern = arg.as_str().ok_or_else(|| {
                ConnectorError::validation(format!("`regexp` on `{field}` expects a string"))
            })?;
            regex::Regex::new(pattern)
                .map_err(|e| ConnectorError::validation(format!("bad regexp on `{field}`: {e}")))?;
            Condition::Regexp { field: f, pattern: pattern.to_string() }
        }
        other => return Err(ConnectorError::validation(format!("unknown operator `{other}`"))),
    })
}

fn scalar(field: &str, v: &Value, schema: &ModelSchema) -> Result<Value> {
    if v.is_array() || v.is_object() {
        return Err(ConnectorError::validation(format!(
            "comparison value for `{field}` must be a scalar, got {v}"
        )));
    }
    schema.normalize_value(field, v)
}

fn scalar_list(field: &str, items: &[Value], schema: &ModelSchema) -> Result<Vec<Value>> {
    if items.len() > MAX_IN_SET {
        return Err(ConnectorError::validation(format!(
            "set on `{field}` has {} values, limit is {MAX_IN_SET}",
            items.len()
        )));
    }
    items.iter().map(|i| scalar(field, i, schema)).collect()
}

fn parse_order(o: &OrderSerde, schema: &ModelSchema) -> Result<Vec<SortSpec>> {
    let clauses: Vec<&str> = match o {
        OrderSerde::One(s) => s.split(',').collect(),
        OrderSerde::Many(v) => v.iter().map(String::as_str).collect(),
    };
    let mut out = Vec::new();
    for clause in clauses.into_iter().map(str::trim).filter(|c| !c.is_empty()) {
        let mut words = clause.split_whitespace();
        let name = words.next().unwrap_or_default();
        let order = match words.next().map(str::to_ascii_uppercase).as_deref() {
            None | Some("ASC") => Order::Asc,
            Some("DESC") => Order::Desc,
            Some(other) => {
                return Err(ConnectorError::validation(format!(
                    "unknown sort direction `{other}` in `{clause}`"
                )));
            }
        };
        if words.next().is_some() {
            return Err(ConnectorError::validation(format!("malformed order clause `{clause}`")));
        }
        let field = schema.resolve_field(name);
        if !schema.is_sortable(field) {
            return Err(ConnectorError::validation(format!("field `{field}` is not sortable")));
        }
        out.push(SortSpec { field: field.to_string(), order });
    }
    if out.len() > MAX_SORT_FIELDS {
        return Err(ConnectorError::validation(format!(
            "{} sort fields given, limit is {MAX_SORT_FIELDS}",
            out.len()
        )));
    }
    Ok(out)
}

fn parse_fields(f: &FieldsSerde, schema: &ModelSchema) -> Result<Projection> {
    let resolve = |s: &String| schema.resolve_field(s).to_string();
    let proj = match f {
        FieldsSerde::Flags(flags) => {
            if flags.values().any(|b| *b) {
                Projection::Include(flags.iter().filter(|(_, b)| **b).map(|(k, _)| resolve(k)).collect())
            } else {
                Projection::Exclude(flags.keys().map(resolve).collect())
            }
        }
        FieldsSerde::List(list) => Projection::Include(list.iter().map(resolve).collect()),
        FieldsSerde::One(one) => Projection::Include(vec![resolve(one)]),
    };
    let n = match &proj {
        Projection::Include(v) | Projection::Exclude(v) => v.len(),
    };
    if n > MAX_PROJECTION_FIELDS {
        return Err(ConnectorError::validation(format!(
            "{n} projected fields, limit is {MAX_PROJECTION_FIELDS}"
        )));
    }
    Ok(proj)
}
