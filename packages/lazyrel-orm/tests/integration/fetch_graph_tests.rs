//! Fetch graphs used with the factory that built them, and with another one.

use std::rc::Rc;

use lazyrel_orm::{Child, Criteria, MismatchPolicy, OrmError, Parent};
use lazyrel_store::{SchemaAction, StoreError};
use ntest::timeout;

use super::helpers::*;

#[test]
#[timeout(1000)]
fn test_graph_from_same_factory_materializes_children() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;
    create_data(&session)?;

    let mut graph = session.create_fetch_graph::<Parent>()?;
    graph.add_subgraph("children")?;

    let before = statements(&session);
    let parents = session.query(&parents_with_child("child1"), Some(&graph))?;
    // parent select plus one batched children select
    assert_eq!(statements(&session), before + 2);

    assert_eq!(parents.len(), 1);
    let mut parent = parents[0].borrow_mut();
    assert!(parent.is_children_materialized());
    let after_query = statements(&session);
    assert_eq!(parent.children()?.len(), 2);
    assert_eq!(statements(&session), after_query);
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_graph_from_other_factory_is_ignored() -> anyhow::Result<()> {
    let server = server();
    let factory1 = factory(&server, SchemaAction::Create);
    let factory2 = factory(&server, SchemaAction::Validate);
    let session = factory1.open_session()?;
    create_data(&session)?;

    let mut graph = factory2.create_fetch_graph::<Parent>()?;
    graph.add_subgraph("children")?;

    let before = statements(&session);
    let parents = session.query(&parents_with_child("child1"), Some(&graph))?;
    assert_eq!(statements(&session), before + 1);

    assert_eq!(parents.len(), 1);
    let mut parent = parents[0].borrow_mut();
    assert!(!parent.is_children_materialized());

    let children = parent.children()?;
    assert_eq!(children.len(), 2);
    assert_eq!(statements(&session), before + 2);

    // The children point back at the already managed parent.
    let back = children[0].borrow_mut().parent()?.expect("parent set");
    assert!(Rc::ptr_eq(&back, &parents[0]));
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_deferred_children_fail_after_close() -> anyhow::Result<()> {
    let server = server();
    let factory1 = factory(&server, SchemaAction::Create);
    let factory2 = factory(&server, SchemaAction::Validate);
    let session = factory1.open_session()?;
    create_data(&session)?;

    let mut graph = factory2.create_fetch_graph::<Parent>()?;
    graph.add_subgraph("children")?;
    let parents = session.query(&parents_with_child("child1"), Some(&graph))?;
    session.close()?;

    let mut parent = parents[0].borrow_mut();
    let err = parent.children().unwrap_err();
    assert!(err.is_session_closed(), "{err}");
    assert!(!parent.is_children_materialized());
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_deferred_children_fail_after_session_dropped() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let parents = {
        let session = factory.open_session()?;
        create_data(&session)?;
        session.query(&parents_with_child("child1"), None)?
    };
    assert_eq!(server.open_connections(), 0);

    let err = parents[0].borrow_mut().children().unwrap_err();
    assert!(err.is_session_closed());
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_no_graph_keeps_children_deferred() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;
    create_data(&session)?;

    let parents = session.query(&parents_with_child("child1"), None)?;
    assert_eq!(parents.len(), 1);
    assert!(!parents[0].borrow().is_children_materialized());
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_reject_policy_reports_mismatch() -> anyhow::Result<()> {
    let server = server();
    let strict = config(&server, SchemaAction::Create).mismatch_policy(MismatchPolicy::Reject);
    let factory1 = factory_with(&server, strict);
    let factory2 = factory(&server, SchemaAction::Validate);
    let session = factory1.open_session()?;
    create_data(&session)?;

    let mut graph = factory2.create_fetch_graph::<Parent>()?;
    graph.add_subgraph("children")?;

    let before = statements(&session);
    match session.query(&parents_with_child("child1"), Some(&graph)) {
        Err(OrmError::MappingMismatch {
            entity,
            expected,
            found,
        }) => {
            assert_eq!(entity, "Parent");
            assert_eq!(expected, factory1.mapping().id());
            assert_eq!(found, factory2.mapping().id());
        }
        other => panic!("expected mapping mismatch, got {:?}", other.map(|p| p.len())),
    }
    assert_eq!(statements(&session), before);
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_validate_without_tables_fails() {
    let server = server();
    let config = config(&server, SchemaAction::Validate);
    let err = lazyrel_orm::SessionFactory::build(
        server.clone(),
        lazyrel_orm::parent_child_mapping().unwrap(),
        config,
    )
    .unwrap_err();
    assert!(matches!(err, OrmError::Store(StoreError::SchemaValidation(_))), "{err}");
    assert_eq!(server.open_connections(), 0);
}

#[test]
#[timeout(1000)]
fn test_child_graph_loads_parents_in_one_statement() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;
    create_data(&session)?;

    let mut graph = session.create_fetch_graph::<Child>()?;
    graph.add_subgraph("parent")?;

    let before = statements(&session);
    let children = session.query(&Criteria::<Child>::new().where_eq("name", "child1"), Some(&graph))?;
    assert_eq!(statements(&session), before + 2);
    assert_eq!(children.len(), 2);

    let first = children[0].borrow_mut().parent()?.expect("parent set");
    let second = children[1].borrow_mut().parent()?.expect("parent set");
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(statements(&session), before + 2);
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_unknown_subgraph_is_rejected() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let mut graph = factory.create_fetch_graph::<Parent>()?;
    assert!(matches!(
        graph.add_subgraph("parent"),
        Err(OrmError::UnknownAssociation { .. })
    ));
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_fetched_parent_outlives_session_close() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;
    create_data(&session)?;

    let mut graph = session.create_fetch_graph::<Child>()?;
    graph.add_subgraph("parent")?;
    let children = session.query(&Criteria::<Child>::new().where_eq("name", "child1"), Some(&graph))?;
    session.close()?;

    let mut child = children[0].borrow_mut();
    assert!(child.is_parent_materialized());
    let parent = child.parent()?.expect("parent set");
    assert_eq!(parent.borrow().name(), Some("parent"));
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_fetched_parent_survives_clear() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;
    create_data(&session)?;

    let mut graph = session.create_fetch_graph::<Child>()?;
    graph.add_subgraph("parent")?;
    let children = session.query(&Criteria::<Child>::new().where_eq("name", "child1"), Some(&graph))?;
    session.clear()?;

    let first = children[0].borrow_mut().parent()?.expect("parent set");
    let second = children[1].borrow_mut().parent()?.expect("parent set");
    assert!(Rc::ptr_eq(&first, &second));
    assert!(!session.contains(&first));
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_lazily_loaded_parent_outlives_session_close() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;
    create_data(&session)?;

    let children = session.query(&Criteria::<Child>::new().where_eq("name", "child1"), None)?;
    assert!(!children[0].borrow().is_parent_materialized());
    children[0].borrow_mut().parent()?;
    session.close()?;

    let mut child = children[0].borrow_mut();
    assert!(child.is_parent_materialized());
    assert_eq!(child.parent()?.expect("parent set").borrow().name(), Some("parent"));
    // Never loaded before close.
    assert!(children[1].borrow_mut().parent().unwrap_err().is_session_closed());
    Ok(())
}
