//! Shared fixtures.

use std::collections::BTreeMap;

use lazyrel_store::schema::{ColumnSchema, RelationSchema, TableSchema, SCHEMA_VERSION};
use lazyrel_store::{ColumnType, ConnectionConfig, SchemaAction, SchemaFile, StoreConfig, StoreServer};

pub const HOST: &str = "localhost";
pub const PORT: u16 = 5432;
pub const DATABASE: &str = "example";
pub const USER: &str = "user";
pub const PASSWORD: &str = "1";

/// parent(name text not null), child(name text not null, parent_id int8 -> parent.id)
pub fn parent_child_schema() -> SchemaFile {
    let mut tables = BTreeMap::new();
    tables.insert(
        "parent".to_string(),
        TableSchema {
            columns: vec![ColumnSchema {
                name: "name".into(),
                r#type: ColumnType::Text,
                nullable: false,
            }],
            relations: vec![],
        },
    );
    tables.insert(
        "child".to_string(),
        TableSchema {
            columns: vec![
                ColumnSchema {
                    name: "name".into(),
                    r#type: ColumnType::Text,
                    nullable: false,
                },
                ColumnSchema {
                    name: "parent_id".into(),
                    r#type: ColumnType::Int8,
                    nullable: true,
                },
            ],
            relations: vec![RelationSchema {
                from_column: "parent_id".into(),
                to_table: "parent".into(),
                to_column: "id".into(),
            }],
        },
    );
    SchemaFile {
        version: SCHEMA_VERSION,
        tables,
    }
}

/// A server with one empty database.
pub fn server() -> StoreServer {
    let server = StoreServer::new(HOST, PORT, StoreConfig::default());
    server.create_database(DATABASE, USER, PASSWORD).unwrap();
    server
}

/// A server whose database already holds the parent/child tables.
pub fn server_with_schema() -> StoreServer {
    let server = server();
    server
        .database(DATABASE)
        .unwrap()
        .apply_schema(&parent_child_schema(), SchemaAction::Create)
        .unwrap();
    server
}

pub fn connection_config(server: &StoreServer) -> ConnectionConfig {
    ConnectionConfig::new(server.url(DATABASE), USER, PASSWORD)
}
