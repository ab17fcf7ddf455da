use serde::{Deserialize, Serialize};
use serde_json::Value;

// Safety limits to prevent resource abuse
pub(crate) const MAX_DEPTH: usize = 32;
pub(crate) const MAX_IN_SET: usize = 1000;
pub(crate) const MAX_SORT_FIELDS: usize = 8;
pub(crate) const MAX_PROJECTION_FIELDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    #[must_use]
    pub fn asc(field: &str) -> Self {
        Self { field: field.to_string(), order: Order::Asc }
    }

    #[must_use]
    pub fn desc(field: &str) -> Self {
        Self { field: field.to_string(), order: Order::Desc }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }
}

/// Strict condition tree parsed out of a `where` object. Values are already
/// normalized to the backend representation of their field's type.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    True,
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Eq { field: String, value: Value },
    Neq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Nin { field: String, values: Vec<Value> },
    /// `bound: None` is a `null` bound and matches nothing.
    Range { field: String, op: CmpOp, bound: Option<Value> },
    Between { field: String, low: Value, high: Value },
    Exists { field: String, exists: bool },
    Like { field: String, pattern: String, negated: bool },
    #[cfg(feature = "regex")]
    Regexp { field: String, pattern: String },
    /// Match on backend document ids.
    Ids(Vec<String>),
}

impl Condition {
    /// ANDs two conditions, flattening `True`.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::True, c) | (c, Self::True) => c,
            (Self::And(mut a), Self::And(b)) => {
                a.extend(b);
                Self::And(a)
            }
            (Self::And(mut a), c) => {
                a.push(c);
                Self::And(a)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }
}

/// Field projection applied to reconstructed records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

/// A parsed, validated query filter. Built per call and discarded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub condition: Condition,
    pub order: Vec<SortSpec>,
    pub limit: Option<usize>,
    pub skip: usize,
    pub fields: Option<Projection>,
    /// Raw backend query body, passed through untouched.
    pub native: Option<Value>,
    /// Raw suggester specification, routed to the suggestion path.
    pub suggests: Option<Value>,
}

impl Default for Condition {
    fn default() -> Self {
        Self::True
    }
}

impl QueryFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    #[must_use]
    pub fn with_order(mut self, order: Vec<SortSpec>) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }
}
