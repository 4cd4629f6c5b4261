//! Session factory configuration.

use lazyrel_store::{ConnectionConfig, SchemaAction};
use serde::{Deserialize, Serialize};

/// What a session does with a fetch graph from another mapping instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Log a warning and fall back to the declared fetch modes
    #[default]
    Ignore,
    /// Fail the query with `MappingMismatch`
    Reject,
}

/// Settings for one session factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactoryConfig {
    /// Store URL and credentials
    pub connection: ConnectionConfig,
    /// Run against the mapped tables when the factory is built
    pub schema_action: SchemaAction,
    /// Echo statements at info level
    #[serde(default)]
    pub show_sql: bool,
    /// Echo one clause per line
    #[serde(default)]
    pub format_sql: bool,
    #[serde(default)]
    pub mismatch_policy: MismatchPolicy,
    /// Flush pending changes before each query
    #[serde(default = "default_auto_flush")]
    pub auto_flush: bool,
}

fn default_auto_flush() -> bool {
    true
}

impl FactoryConfig {
    pub fn new(connection: ConnectionConfig, schema_action: SchemaAction) -> Self {
        Self {
            connection,
            schema_action,
            show_sql: false,
            format_sql: false,
            mismatch_policy: MismatchPolicy::default(),
            auto_flush: default_auto_flush(),
        }
    }

    pub fn show_sql(mut self, show_sql: bool) -> Self {
        self.show_sql = show_sql;
        self
    }

    pub fn format_sql(mut self, format_sql: bool) -> Self {
        self.format_sql = format_sql;
        self
    }

    pub fn mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.mismatch_policy = policy;
        self
    }

    /// Parses a JSON config.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
