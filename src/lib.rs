pub mod backend;
pub mod config;
pub mod connector;
pub mod devlog;
pub mod errors;
pub mod logger;
pub mod query;
pub mod record;
pub mod schema;
pub mod test_support;

pub use backend::{InMemoryBackend, SearchBackend};
pub use config::{ConnectorConfig, RefreshPolicy};
pub use connector::{Connector, DeleteReport, SuggestResponse};
pub use errors::{ConnectorError, Result};
pub use query::{Condition, QueryFilter};
pub use record::Record;
pub use schema::{FieldType, ModelSchema};

use std::sync::Arc;

mod built {
    include!(concat!(env!("OUT_DIR"), "/compiled_features.rs"));
}

/// Cargo features this library was compiled with, sorted.
#[must_use]
pub fn compiled_features() -> &'static [&'static str] {
    built::COMPILED_FEATURES
}

/// Builds a connector over a fresh in-memory backend whose refresh interval
/// is `config.visibility_lag_ms`.
///
/// # Errors
/// Returns a config error when `config` fails validation.
pub fn in_memory(schema: ModelSchema, config: ConnectorConfig) -> Result<Connector> {
    let backend = InMemoryBackend::with_visibility_lag(std::time::Duration::from_millis(config.visibility_lag_ms));
    Connector::new(schema, Arc::new(backend), config)
}

/// Initializes logging from `log4rs.yaml`.
pub fn init() -> std::result::Result<(), Box<dyn std::error::Error>> {
    logger::init()
}
