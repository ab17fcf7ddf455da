//! Model-facing operations over a [`SearchBackend`](crate::backend::SearchBackend).

mod core;
mod read;
mod write;

pub use self::core::Connector;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub deleted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestOption {
    pub text: String,
    #[serde(default, alias = "_score")]
    pub score: f64,
    #[serde(default)]
    pub freq: u64,
}

/// Suggestions for one token (term suggester) or prefix (completion suggester).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestEntry {
    pub text: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub length: usize,
    #[serde(default)]
    pub options: Vec<SuggestOption>,
}

/// Suggester name to its entries.
pub type SuggestResponse = BTreeMap<String, Vec<SuggestEntry>>;
