//! Statements, constraints, and transaction visibility.

use lazyrel_store::{Filter, Statement, StatementResult, StoreError, Value};
use ntest::timeout;

use super::helpers::*;

fn cols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
#[timeout(1000)]
fn test_autocommit_insert_generates_keys() -> anyhow::Result<()> {
    let server = server_with_schema();
    let mut conn = server.connect(&connection_config(&server))?;

    let first = conn.insert("parent", cols(&["name"]), vec![Value::from("parent")])?;
    let second = conn.insert("parent", cols(&["name"]), vec![Value::from("other")])?;
    assert_eq!((first, second), (1, 2));
    assert_eq!(conn.statement_count(), 2);

    let rows = conn.select("parent", Filter::eq("name", "other"))?;
    assert_eq!(rows, vec![vec![Value::Int(2), Value::from("other")]]);
    assert_eq!(conn.statement_count(), 3);
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_not_null_violation_is_reported() -> anyhow::Result<()> {
    let server = server_with_schema();
    let mut conn = server.connect(&connection_config(&server))?;

    let err = conn
        .insert("parent", cols(&["name"]), vec![Value::Null])
        .unwrap_err();
    assert!(err.is_constraint_violation(), "{err}");
    assert!(conn.select("parent", Filter::All)?.is_empty());
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_foreign_key_violation_is_reported() -> anyhow::Result<()> {
    let server = server_with_schema();
    let mut conn = server.connect(&connection_config(&server))?;

    match conn.insert("child", cols(&["name", "parent_id"]), vec![Value::from("c"), Value::Int(42)]) {
        Err(StoreError::ConstraintViolation { constraint, detail, .. }) => {
            assert_eq!(constraint, "child_parent_id_fkey");
            assert!(detail.contains("(parent_id)=(42)"), "{detail}");
        }
        other => panic!("expected foreign key violation, got {:?}", other),
    }
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_explicit_key_is_rejected() -> anyhow::Result<()> {
    let server = server_with_schema();
    let mut conn = server.connect(&connection_config(&server))?;
    let err = conn
        .insert("parent", cols(&["id", "name"]), vec![Value::Int(7), Value::from("p")])
        .unwrap_err();
    assert!(err.is_constraint_violation());
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_transaction_reads_its_own_writes_and_isolates_others() -> anyhow::Result<()> {
    let server = server_with_schema();
    let mut writer = server.connect(&connection_config(&server))?;
    let mut reader = server.connect(&connection_config(&server))?;

    writer.begin()?;
    let parent_id = writer.insert("parent", cols(&["name"]), vec![Value::from("parent")])?;
    // the staged parent satisfies the child's foreign key
    writer.insert(
        "child",
        cols(&["name", "parent_id"]),
        vec![Value::from("child1"), Value::Int(parent_id)],
    )?;

    assert_eq!(writer.select("child", Filter::All)?.len(), 1);
    assert!(reader.select("child", Filter::All)?.is_empty());

    writer.commit()?;
    assert!(!writer.in_transaction());
    assert_eq!(reader.select("child", Filter::All)?.len(), 1);
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_rollback_discards_writes_but_not_sequence() -> anyhow::Result<()> {
    let server = server_with_schema();
    let mut conn = server.connect(&connection_config(&server))?;

    conn.begin()?;
    conn.insert("parent", cols(&["name"]), vec![Value::from("gone")])?;
    conn.rollback();
    assert!(conn.select("parent", Filter::All)?.is_empty());

    let id = conn.insert("parent", cols(&["name"]), vec![Value::from("kept")])?;
    assert_eq!(id, 2);
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_update_sets_foreign_key() -> anyhow::Result<()> {
    let server = server_with_schema();
    let mut conn = server.connect(&connection_config(&server))?;
    let parent = conn.insert("parent", cols(&["name"]), vec![Value::from("parent")])?;
    let child = conn.insert("child", cols(&["name"]), vec![Value::from("child1")])?;

    let result = conn.execute(&Statement::Update {
        table: "child".into(),
        id: child,
        assignments: vec![("parent_id".into(), Value::Int(parent))],
    })?;
    assert_eq!(result, StatementResult::Updated(1));

    let rows = conn.select(
        "parent",
        Filter::exists("child", "parent_id", Filter::eq("name", "child1")),
    )?;
    assert_eq!(rows.len(), 1);

    let missing = conn.execute(&Statement::Update {
        table: "child".into(),
        id: 99,
        assignments: vec![],
    });
    assert!(matches!(missing, Err(StoreError::RowNotFound { id: 99, .. })));
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_dropping_connection_rolls_back_open_transaction() -> anyhow::Result<()> {
    let server = server_with_schema();
    {
        let mut conn = server.connect(&connection_config(&server))?;
        conn.begin()?;
        conn.insert("parent", cols(&["name"]), vec![Value::from("never")])?;
    }
    let mut conn = server.connect(&connection_config(&server))?;
    assert!(conn.select("parent", Filter::All)?.is_empty());
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_transaction_misuse() -> anyhow::Result<()> {
    let server = server_with_schema();
    let mut conn = server.connect(&connection_config(&server))?;
    assert!(matches!(conn.commit(), Err(StoreError::TransactionConflict(_))));
    conn.begin()?;
    assert!(matches!(conn.begin(), Err(StoreError::TransactionConflict(_))));
    Ok(())
}
