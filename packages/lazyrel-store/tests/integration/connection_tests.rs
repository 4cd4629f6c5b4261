//! Connection opening, credentials, and release.

use lazyrel_store::{ConnectionConfig, StoreError};
use ntest::timeout;

use super::helpers::*;

#[test]
#[timeout(1000)]
fn test_connect_with_valid_credentials() {
    let server = server();
    let connection = server.connect(&connection_config(&server)).unwrap();
    assert_eq!(connection.database().name(), DATABASE);
    assert_eq!(connection.statement_count(), 0);
    assert!(!connection.in_transaction());
    assert_eq!(server.open_connections(), 1);
}

#[test]
#[timeout(1000)]
fn test_wrong_password_is_rejected() {
    let server = server();
    let config = ConnectionConfig::new(server.url(DATABASE), USER, "wrong");
    match server.connect(&config) {
        Err(StoreError::AuthenticationFailed { user, database }) => {
            assert_eq!(user, USER);
            assert_eq!(database, DATABASE);
        }
        other => panic!("expected authentication failure, got {:?}", other),
    }
    assert_eq!(server.open_connections(), 0);
}

#[test]
#[timeout(1000)]
fn test_unknown_target_is_refused() {
    let server = server();
    for url in [
        "lazyrel://localhost:5433/example",
        "lazyrel://elsewhere:5432/example",
        "lazyrel://localhost:5432/missing",
    ] {
        let config = ConnectionConfig::new(url, USER, PASSWORD);
        assert!(
            matches!(server.connect(&config), Err(StoreError::ConnectionRefused { .. })),
            "{url} should be refused"
        );
    }
    assert_eq!(server.open_connections(), 0);
}

#[test]
#[timeout(1000)]
fn test_dropping_connection_releases_slot() {
    let server = server();
    {
        let _first = server.connect(&connection_config(&server)).unwrap();
        let _second = server.connect(&connection_config(&server)).unwrap();
        assert_eq!(server.open_connections(), 2);
    }
    assert_eq!(server.open_connections(), 0);
}

#[test]
#[timeout(1000)]
fn test_duplicate_database_is_rejected() {
    let server = server();
    assert!(matches!(
        server.create_database(DATABASE, USER, PASSWORD),
        Err(StoreError::DatabaseAlreadyExists(_))
    ));
}
