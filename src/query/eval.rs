//! Evaluates query DSL documents against JSON sources. Backs the in-memory
//! backend and covers the clause subset the translator emits plus `match`.

use crate::errors::{ConnectorError, Result};
use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::types::{MAX_DEPTH, MAX_SORT_FIELDS, Order};

/// One parsed entry of a `sort` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub order: Order,
    pub missing_last: bool,
}

/// True when the document `(id, source)` satisfies query clause `q`.
///
/// # Errors
/// Returns `ConnectorError::Backend` for clauses outside the supported subset.
pub fn eval_query(id: &str, doc: &Map<String, Value>, q: &Value) -> Result<bool> {
    eval_at(id, doc, q, 0)
}

fn eval_at(id: &str, doc: &Map<String, Value>, q: &Value, depth: usize) -> Result<bool> {
    if depth > MAX_DEPTH {
        return Err(unsupported("query nested too deeply"));
    }
    let (kind, body) = single_entry(q)?;
    Ok(match kind {
        "match_all" => true,
        "match_none" => false,
        "bool" => {
            let b = body.as_object().ok_or_else(|| unsupported("bool expects an object"))?;
            let must = clauses(b.get("must"));
            let filter = clauses(b.get("filter"));
            let should = clauses(b.get("should"));
            let must_not = clauses(b.get("must_not"));
            for c in must.iter().chain(filter.iter()) {
                if !eval_at(id, doc, c, depth + 1)? {
                    return Ok(false);
                }
            }
            for c in &must_not {
                if eval_at(id, doc, c, depth + 1)? {
                    return Ok(false);
                }
            }
            let default_min = usize::from(must.is_empty() && filter.is_empty() && !should.is_empty());
            let min = b
                .get("minimum_should_match")
                .and_then(Value::as_u64)
                .map_or(default_min, |m| usize::try_from(m).unwrap_or(usize::MAX));
            let mut hits = 0usize;
            for c in &should {
                if hits >= min {
                    break;
                }
                if eval_at(id, doc, c, depth + 1)? {
                    hits += 1;
                }
            }
            hits >= min
        }
        "term" => {
            let (field, arg) = single_entry(body)?;
            let expected = arg.get("value").filter(|_| arg.is_object()).unwrap_or(arg);
            field_values(id, doc, field).iter().any(|v| values_equal(v, expected))
        }
        "terms" => {
            let (field, arg) = single_entry(body)?;
            let set = arg.as_array().ok_or_else(|| unsupported("terms expects an array"))?;
            field_values(id, doc, field).iter().any(|v| set.iter().any(|s| values_equal(v, s)))
        }
        "ids" => {
            let set = body
                .get("values")
                .and_then(Value::as_array)
                .ok_or_else(|| unsupported("ids expects values"))?;
            set.iter().any(|s| s.as_str() == Some(id))
        }
        "range" => {
            let (field, bounds) = single_entry(body)?;
            let bounds = bounds.as_object().ok_or_else(|| unsupported("range expects bounds"))?;
            let values = field_values(id, doc, field);
            values.iter().any(|v| bounds.iter().all(|(op, b)| within(v, op, b)))
        }
        "exists" => {
            let field = body
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| unsupported("exists expects a field"))?;
            !field_values(id, doc, field).is_empty()
        }
        "wildcard" => {
            let (field, arg) = single_entry(body)?;
            let pattern = arg
                .get("value")
                .unwrap_or(arg)
                .as_str()
                .ok_or_else(|| unsupported("wildcard expects a string"))?;
            field_values(id, doc, field)
                .iter()
                .any(|v| v.as_str().is_some_and(|s| wildcard_match(pattern, s)))
        }
        #[cfg(feature = "regex")]
        "regexp" => {
            let (field, arg) = single_entry(body)?;
            let pattern = arg
                .get("value")
                .unwrap_or(arg)
                .as_str()
                .ok_or_else(|| unsupported("regexp expects a string"))?;
            // Backend regexps are anchored on the whole term
            let re = regex::Regex::new(&format!("^(?:{pattern})$"))
                .map_err(|e| ConnectorError::Backend(e.to_string()))?;
            field_values(id, doc, field).iter().any(|v| v.as_str().is_some_and(|s| re.is_match(s)))
        }
        "match" => {
            let (field, arg) = single_entry(body)?;
            let text = arg.get("query").unwrap_or(arg);
            let wanted = tokens(&scalar_text(text));
            field_values(id, doc, field)
                .iter()
                .any(|v| tokens(&scalar_text(v)).iter().any(|t| wanted.contains(t)))
        }
        other => return Err(unsupported(&format!("unsupported query clause `{other}`"))),
    })
}

fn unsupported(msg: &str) -> ConnectorError {
    ConnectorError::Backend(msg.to_string())
}

fn single_entry(v: &Value) -> Result<(&str, &Value)> {
    match v.as_object() {
        Some(o) if o.len() == 1 => o
            .iter()
            .next()
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| unsupported("empty clause")),
        _ => Err(unsupported(&format!("expected a single-key clause, got {v}"))),
    }
}

fn clauses(v: Option<&Value>) -> Vec<Value> {
    match v {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(_)) => v.into_iter().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Non-null values stored under `path`, arrays flattened.
fn field_values(id: &str, doc: &Map<String, Value>, path: &str) -> Vec<Value> {
    if path == "_id" {
        return vec![Value::String(id.to_string())];
    }
    match get_path(doc, path) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter(|v| !v.is_null()).cloned().collect(),
        Some(v) => vec![v.clone()],
    }
}

pub(crate) fn get_path<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    if let Some(v) = doc.get(path) {
        return Some(v);
    }
    let mut parts = path.split('.');
    let mut cur = doc.get(parts.next()?)?;
    for (depth, part) in parts.enumerate() {
        if depth >= MAX_DEPTH {
            return None;
        }
        cur = cur.as_object()?.get(part)?;
    }
    Some(cur)
}

fn within(v: &Value, op: &str, bound: &Value) -> bool {
    let Some(ord) = compare_values(v, bound) else {
        return false;
    };
    match op {
        "gt" => ord == Ordering::Greater,
        "gte" => ord != Ordering::Less,
        "lt" => ord == Ordering::Less,
        "lte" => ord != Ordering::Greater,
        _ => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b).map_or(a == b, |o| o == Ordering::Equal)
}

/// Orders two scalars of the same kind; `None` when the kinds differ.
/// Strings compare byte-wise; dates reach the store in one canonical UTC
/// form, so byte order is instant order for them.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Some(x.as_f64()?.total_cmp(&y.as_f64()?)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Parses a `sort` array (`"field"`, `{field: "desc"}` or
/// `{field: {"order": .., "missing": ..}}` entries).
///
/// # Errors
/// Returns `ConnectorError::Backend` on malformed entries.
pub fn parse_sort(sort: Option<&Value>) -> Result<Vec<SortKey>> {
    let entries = match sort {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    };
    let mut out = Vec::with_capacity(entries.len());
    for e in entries.iter().take(MAX_SORT_FIELDS) {
        let key = match e {
            Value::String(f) => SortKey { field: f.clone(), order: Order::Asc, missing_last: true },
            Value::Object(_) => {
                let (field, spec) = single_entry(e)?;
                let (order, missing) = match spec {
                    Value::String(o) => (o.as_str(), None),
                    Value::Object(o) => (
                        o.get("order").and_then(Value::as_str).unwrap_or("asc"),
                        o.get("missing").and_then(Value::as_str),
                    ),
                    _ => return Err(unsupported("malformed sort entry")),
                };
                let order = match order {
                    "asc" => Order::Asc,
                    "desc" => Order::Desc,
                    o => return Err(unsupported(&format!("unknown sort order `{o}`"))),
                };
                SortKey { field: field.to_string(), order, missing_last: missing != Some("_first") }
            }
            _ => return Err(unsupported("malformed sort entry")),
        };
        out.push(key);
    }
    Ok(out)
}

/// Compares two documents by a parsed sort; ties keep their incoming order.
#[must_use]
pub fn compare_docs(
    a: (&str, &Map<String, Value>),
    b: (&str, &Map<String, Value>),
    sort: &[SortKey],
) -> Ordering {
    for s in sort {
        let va = sort_value(a, &s.field);
        let vb = sort_value(b, &s.field);
        let ord = match (va, vb) {
            (Some(x), Some(y)) => {
                let o = compare_values(&x, &y).unwrap_or_else(|| type_rank(&x).cmp(&type_rank(&y)));
                if s.order == Order::Asc { o } else { o.reverse() }
            }
            // Missing values ignore the direction
            (Some(_), None) => if s.missing_last { Ordering::Less } else { Ordering::Greater },
            (None, Some(_)) => if s.missing_last { Ordering::Greater } else { Ordering::Less },
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn sort_value(doc: (&str, &Map<String, Value>), field: &str) -> Option<Value> {
    if field == "_id" {
        return Some(Value::String(doc.0.to_string()));
    }
    match get_path(doc.1, field) {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => items.iter().find(|v| !v.is_null()).cloned(),
        Some(v) => Some(v.clone()),
    }
}

/// Glob match supporting `*`, `?` and backslash escapes.
#[must_use]
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Tok {
        Lit(char),
        One,
        Many,
    }
    let mut toks = Vec::new();
    let mut it = pattern.chars();
    while let Some(c) = it.next() {
        toks.push(match c {
            '\\' => Tok::Lit(it.next().unwrap_or('\\')),
            '*' => Tok::Many,
            '?' => Tok::One,
            c => Tok::Lit(c),
        });
    }
    let text: Vec<char> = text.chars().collect();
    // dp[j]: pattern prefix matched against text prefix of length j
    let mut dp = vec![false; text.len() + 1];
    dp[0] = true;
    for t in &toks {
        let mut next = vec![false; text.len() + 1];
        if *t == Tok::Many {
            next[0] = dp[0];
        }
        for j in 1..=text.len() {
            next[j] = match t {
                Tok::Many => next[j - 1] || dp[j],
                Tok::One => dp[j - 1],
                Tok::Lit(c) => dp[j - 1] && text[j - 1] == *c,
            };
        }
        dp = next;
    }
    dp[text.len()]
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase).collect()
}
