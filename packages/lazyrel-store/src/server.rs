//! Store server hosting named databases.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::config::{ConnectionConfig, StoreConfig, URL_SCHEME};
use crate::connection::Connection;
use crate::database::Database;
use crate::error::StoreError;

#[derive(Debug)]
struct HostedDatabase {
    database: Arc<Database>,
    user: String,
    password: String,
}

/// A store server reachable at `host:port`.
///
/// Connections are opened with a [`ConnectionConfig`]; the server counts
/// open connections so callers can check that every one was released.
#[derive(Debug)]
pub struct StoreServer {
    host: String,
    port: u16,
    config: StoreConfig,
    databases: RwLock<HashMap<String, HostedDatabase>>,
    open_connections: Arc<AtomicUsize>,
    next_connection_id: AtomicU64,
}

impl StoreServer {
    /// Creates a server with no databases.
    pub fn new(host: impl Into<String>, port: u16, config: StoreConfig) -> Self {
        Self {
            host: host.into(),
            port,
            config,
            databases: RwLock::new(HashMap::new()),
            open_connections: Arc::new(AtomicUsize::new(0)),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Creates an empty database owned by `user`.
    pub fn create_database(
        &self,
        name: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Arc<Database>, StoreError> {
        let name = name.into();
        let mut databases = self.databases.write().map_err(|_| StoreError::LockPoisoned)?;
        if databases.contains_key(&name) {
            return Err(StoreError::DatabaseAlreadyExists(name));
        }
        let database = Arc::new(Database::new(name.clone(), self.config.clone()));
        databases.insert(
            name.clone(),
            HostedDatabase {
                database: Arc::clone(&database),
                user: user.into(),
                password: password.into(),
            },
        );
        tracing::debug!(database = %name, "created database");
        Ok(database)
    }

    /// Returns a hosted database.
    pub fn database(&self, name: &str) -> Result<Arc<Database>, StoreError> {
        let databases = self.databases.read().map_err(|_| StoreError::LockPoisoned)?;
        databases
            .get(name)
            .map(|hosted| Arc::clone(&hosted.database))
            .ok_or_else(|| StoreError::ConnectionRefused {
                target: self.url(name),
            })
    }

    /// Connection URL of a database on this server.
    pub fn url(&self, database: &str) -> String {
        format!("{}{}:{}/{}", URL_SCHEME, self.host, self.port, database)
    }

    /// Opens a connection.
    ///
    /// # Returns
    /// `Result<Connection, StoreError>`: `ConnectionRefused` when the URL
    /// names another host/port or an unknown database, `AuthenticationFailed`
    /// on wrong credentials.
    pub fn connect(&self, config: &ConnectionConfig) -> Result<Connection, StoreError> {
        let target = config.target()?;
        if target.host != self.host || target.port != self.port {
            return Err(StoreError::ConnectionRefused {
                target: target.to_string(),
            });
        }

        let database = {
            let databases = self.databases.read().map_err(|_| StoreError::LockPoisoned)?;
            let hosted = databases
                .get(&target.database)
                .ok_or_else(|| StoreError::ConnectionRefused {
                    target: target.to_string(),
                })?;
            if hosted.user != config.user || hosted.password != config.password {
                return Err(StoreError::AuthenticationFailed {
                    user: config.user.clone(),
                    database: target.database.clone(),
                });
            }
            Arc::clone(&hosted.database)
        };

        let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        self.open_connections.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(connection = id, target = %target, "connection opened");
        Ok(Connection::new(id, database, Arc::clone(&self.open_connections)))
    }

    /// Number of connections not yet closed.
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }
}
