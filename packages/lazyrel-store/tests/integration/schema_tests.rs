//! Schema creation and validation.

use lazyrel_store::schema::ColumnSchema;
use lazyrel_store::{ColumnType, SchemaAction, StoreError};
use ntest::timeout;

use super::helpers::*;

#[test]
#[timeout(1000)]
fn test_create_then_validate() -> anyhow::Result<()> {
    let server = server();
    let database = server.database(DATABASE)?;
    let schema = parent_child_schema();

    assert!(matches!(
        database.apply_schema(&schema, SchemaAction::Validate),
        Err(StoreError::SchemaValidation(_))
    ));

    database.apply_schema(&schema, SchemaAction::Create)?;
    assert_eq!(database.table_names()?, vec!["child", "parent"]);
    database.apply_schema(&schema, SchemaAction::Validate)?;
    assert_eq!(database.describe()?, schema);
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_validate_detects_type_and_nullability_drift() -> anyhow::Result<()> {
    let server = server_with_schema();
    let database = server.database(DATABASE)?;

    let mut retyped = parent_child_schema();
    retyped.tables.get_mut("child").unwrap().columns[1].r#type = ColumnType::Text;
    match database.apply_schema(&retyped, SchemaAction::Validate) {
        Err(StoreError::SchemaValidation(msg)) => assert!(msg.contains("parent_id"), "{msg}"),
        other => panic!("expected validation failure, got {:?}", other),
    }

    let mut extra = parent_child_schema();
    extra.tables.get_mut("parent").unwrap().columns.push(ColumnSchema {
        name: "nickname".into(),
        r#type: ColumnType::Text,
        nullable: true,
    });
    assert!(matches!(
        database.apply_schema(&extra, SchemaAction::Validate),
        Err(StoreError::SchemaValidation(_))
    ));
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_create_drops_existing_rows() -> anyhow::Result<()> {
    let server = server_with_schema();
    let mut conn = server.connect(&connection_config(&server))?;
    conn.insert("parent", vec!["name".into()], vec!["p".into()])?;

    let database = server.database(DATABASE)?;
    database.apply_schema(&parent_child_schema(), SchemaAction::Create)?;
    assert_eq!(database.with_table("parent", |t| t.row_count())?, 0);
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_commit_after_recreate_conflicts() -> anyhow::Result<()> {
    let server = server_with_schema();
    let mut conn = server.connect(&connection_config(&server))?;
    conn.begin()?;
    conn.insert("parent", vec!["name".into()], vec!["p".into()])?;

    server
        .database(DATABASE)?
        .apply_schema(&parent_child_schema(), SchemaAction::Create)?;
    assert!(matches!(conn.commit(), Err(StoreError::TransactionConflict(_))));
    Ok(())
}
