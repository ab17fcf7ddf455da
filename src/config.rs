//! Connector configuration.
//!
//! Files are TOML with an optional `[connector]` table (a `[model]` table may
//! sit in the same file). Lookup order: explicit path, `NEXUS_SEARCH_CONFIG`,
//! `./nexus_search.toml`, then `nexus_search.toml` in the user config dir.
//! `NEXUS_SEARCH_*` variables override whatever was loaded.

use crate::errors::{ConnectorError, Result};
use crate::schema::ModelSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONFIG_FILE_NAME: &str = "nexus_search.toml";
pub const CONFIG_ENV: &str = "NEXUS_SEARCH_CONFIG";

/// When a write becomes visible to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RefreshSerde", into = "String")]
pub enum RefreshPolicy {
    /// Visible after the next periodic refresh.
    #[default]
    False,
    /// Forces a refresh of the affected index.
    True,
    /// Waits for the next refresh before returning.
    WaitFor,
}

impl RefreshPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::False => "false",
            Self::True => "true",
            Self::WaitFor => "wait_for",
        }
    }

    /// True when the write must be searchable once the call returns.
    #[must_use]
    pub const fn is_immediate(self) -> bool {
        !matches!(self, Self::False)
    }
}

impl fmt::Display for RefreshPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshPolicy {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "false" => Ok(Self::False),
            "true" => Ok(Self::True),
            "wait_for" | "waitfor" => Ok(Self::WaitFor),
            other => Err(ConnectorError::Config(format!("unknown refresh policy `{other}`"))),
        }
    }
}

impl From<RefreshPolicy> for String {
    fn from(p: RefreshPolicy) -> Self {
        p.as_str().to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RefreshSerde {
    Flag(bool),
    Name(String),
}

impl TryFrom<RefreshSerde> for RefreshPolicy {
    type Error = ConnectorError;

    fn try_from(v: RefreshSerde) -> Result<Self> {
        match v {
            RefreshSerde::Flag(true) => Ok(Self::True),
            RefreshSerde::Flag(false) => Ok(Self::False),
            RefreshSerde::Name(s) => s.parse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectorConfig {
    /// Prepended to every index name as `{prefix}_{index}` when non-empty.
    pub index_prefix: String,
    /// Backend node URLs. The first one is used.
    pub nodes: Vec<String>,
    /// Upper bound for `skip + limit`.
    pub max_result_window: usize,
    /// Limit applied when a filter carries none.
    pub default_limit: Option<usize>,
    pub refresh: RefreshPolicy,
    pub request_timeout_ms: u64,
    /// Attempts for an optimistic upsert before giving up with a conflict.
    pub upsert_attempts: u32,
    /// Refresh interval of the in-memory backend.
    pub visibility_lag_ms: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            index_prefix: String::new(),
            nodes: vec!["http://localhost:9200".to_string()],
            max_result_window: 10_000,
            default_limit: None,
            refresh: RefreshPolicy::False,
            request_timeout_ms: 30_000,
            upsert_attempts: 3,
            visibility_lag_ms: 0,
        }
    }
}

impl ConnectorConfig {
    /// Parses the `[connector]` table of a TOML document; absent table means defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Root {
            #[serde(default)]
            connector: ConnectorConfig,
        }
        let root: Root = toml::from_str(text).map_err(|e| ConnectorError::Config(e.to_string()))?;
        root.connector.validate()?;
        Ok(root.connector)
    }

    pub fn from_toml_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConnectorError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Loads the first config file found, then applies environment overrides.
    ///
    /// # Errors
    /// An explicit path that cannot be read, malformed TOML, or invalid values.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = match explicit {
            Some(p) => Self::from_toml_path(p)?,
            None => match Self::candidate_paths().into_iter().find(|p| p.is_file()) {
                Some(p) => {
                    log::debug!("loading connector config from {}", p.display());
                    Self::from_toml_path(&p)?
                }
                None => Self::default(),
            },
        };
        cfg.apply_overrides(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    /// Implicit lookup locations, highest precedence first.
    #[must_use]
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(p) = std::env::var(CONFIG_ENV) {
            paths.push(PathBuf::from(p));
        }
        if let Ok(cur) = std::env::current_dir() {
            paths.push(cur.join(CONFIG_FILE_NAME));
        }
        if let Some(dir) = dirs_next::config_dir() {
            paths.push(dir.join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// Applies `NEXUS_SEARCH_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NEXUS_SEARCH_INDEX_PREFIX") {
            self.index_prefix = v;
        }
        if let Some(v) = lookup("NEXUS_SEARCH_NODES") {
            self.nodes = v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
        }
        if let Some(v) = lookup("NEXUS_SEARCH_MAX_RESULT_WINDOW") {
            self.max_result_window = parse_num("NEXUS_SEARCH_MAX_RESULT_WINDOW", &v)?;
        }
        if let Some(v) = lookup("NEXUS_SEARCH_DEFAULT_LIMIT") {
            self.default_limit = Some(parse_num("NEXUS_SEARCH_DEFAULT_LIMIT", &v)?);
        }
        if let Some(v) = lookup("NEXUS_SEARCH_REFRESH") {
            self.refresh = v.parse()?;
        }
        if let Some(v) = lookup("NEXUS_SEARCH_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_num("NEXUS_SEARCH_REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("NEXUS_SEARCH_UPSERT_ATTEMPTS") {
            self.upsert_attempts = parse_num("NEXUS_SEARCH_UPSERT_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("NEXUS_SEARCH_VISIBILITY_LAG_MS") {
            self.visibility_lag_ms = parse_num("NEXUS_SEARCH_VISIBILITY_LAG_MS", &v)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_result_window == 0 {
            return Err(ConnectorError::Config("max_result_window must be positive".into()));
        }
        if self.upsert_attempts == 0 {
            return Err(ConnectorError::Config("upsert_attempts must be at least 1".into()));
        }
        if self.default_limit == Some(0) {
            return Err(ConnectorError::Config("default_limit must be positive".into()));
        }
        Ok(())
    }

    /// Backend index for a model: the schema's index (or lowercased model
    /// name) behind the configured prefix.
    #[must_use]
    pub fn index_for(&self, schema: &ModelSchema) -> String {
        let base = schema.index().map_or_else(|| schema.name().to_lowercase(), str::to_string);
        if self.index_prefix.is_empty() { base } else { format!("{}_{base}", self.index_prefix) }
    }

    #[must_use]
    pub fn with_refresh(mut self, refresh: RefreshPolicy) -> Self {
        self.refresh = refresh;
        self
    }

    #[must_use]
    pub const fn with_visibility_lag_ms(mut self, ms: u64) -> Self {
        self.visibility_lag_ms = ms;
        self
    }
}

fn parse_num<T: FromStr>(key: &str, v: &str) -> Result<T> {
    v.trim().parse().map_err(|_| ConnectorError::Config(format!("{key}: `{v}` is not a valid number")))
}
