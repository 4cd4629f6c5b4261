//! Store and connection configuration.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// URL scheme accepted by [`ConnectionConfig::target`].
pub const URL_SCHEME: &str = "lazyrel://";

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Initial row capacity reserved for new tables
    pub initial_table_capacity: usize,
    /// Maximum number of rows per table (default: unlimited)
    pub max_rows_per_table: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_table_capacity: 64,
            max_rows_per_table: usize::MAX,
        }
    }
}

/// Connection string and credentials for one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// `lazyrel://host:port/database`
    pub url: String,
    /// User name
    pub user: String,
    /// Password
    pub password: String,
}

/// Parsed form of a connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl ConnectionConfig {
    /// Creates a connection config from its three parts.
    pub fn new(url: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Parses the connection URL.
    ///
    /// # Returns
    /// `Result<ConnectionTarget, StoreError>` with host, port and database name.
    pub fn target(&self) -> Result<ConnectionTarget, StoreError> {
        let invalid = || StoreError::InvalidConnectionString(self.url.clone());

        let rest = self.url.strip_prefix(URL_SCHEME).ok_or_else(invalid)?;
        let (authority, database) = rest.split_once('/').ok_or_else(invalid)?;
        let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;

        if host.is_empty() || database.is_empty() || database.contains('/') {
            return Err(invalid());
        }

        Ok(ConnectionTarget {
            host: host.to_string(),
            port,
            database: database.to_string(),
        })
    }
}

impl std::fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}:{}/{}", URL_SCHEME, self.host, self.port, self.database)
    }
}
