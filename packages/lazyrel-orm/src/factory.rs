//! Session factories.

use std::sync::Arc;

use lazyrel_store::StoreServer;

use crate::config::FactoryConfig;
use crate::entity::Entity;
use crate::error::Result;
use crate::fetch_graph::FetchGraph;
use crate::mapping::Mapping;
use crate::session::Session;

/// Opens sessions against one database with one mapping instance.
#[derive(Debug)]
pub struct SessionFactory {
    server: Arc<StoreServer>,
    mapping: Mapping,
    config: FactoryConfig,
}

impl SessionFactory {
    /// Connects once, runs the configured schema action for the mapped
    /// tables, and releases the connection.
    ///
    /// # Returns
    /// `Result<SessionFactory>`: store errors for unreachable databases,
    /// bad credentials, or a schema that fails validation.
    pub fn build(server: Arc<StoreServer>, mapping: Mapping, config: FactoryConfig) -> Result<Self> {
        {
            let connection = server.connect(&config.connection)?;
            connection
                .database()
                .apply_schema(&mapping.schema(), config.schema_action)?;
        }
        tracing::info!(
            mapping = %mapping.id(),
            url = %config.connection.url,
            schema_action = %config.schema_action,
            "session factory built"
        );
        Ok(Self {
            server,
            mapping,
            config,
        })
    }

    /// Opens a session on a new connection.
    pub fn open_session(&self) -> Result<Session> {
        let mut connection = self.server.connect(&self.config.connection)?;
        connection.set_sql_echo(self.config.show_sql, self.config.format_sql);
        Ok(Session::open(connection, self.mapping.clone(), &self.config))
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Empty fetch graph rooted at `E`, bound to this factory's mapping.
    pub fn create_fetch_graph<E: Entity>(&self) -> Result<FetchGraph> {
        self.mapping.fetch_graph::<E>()
    }
}
