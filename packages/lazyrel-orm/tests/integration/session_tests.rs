//! Unit of work, identity map, cascades and connection release.

use std::rc::Rc;

use lazyrel_orm::{Child, Criteria, OrmError, Parent};
use lazyrel_store::{SchemaAction, StoreError};
use ntest::timeout;

use super::helpers::*;

#[test]
#[timeout(1000)]
fn test_persisted_instance_is_returned_by_find() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;

    let parent = Parent::new_ref("parent");
    session.persist(&parent)?;
    session.flush()?;
    let id = parent.borrow().id().expect("id assigned on flush");

    let before = statements(&session);
    let found = session.find::<Parent>(id)?.expect("parent exists");
    assert!(Rc::ptr_eq(&found, &parent));
    assert_eq!(statements(&session), before);
    assert!(session.contains(&parent));

    let queried = session.query(&Criteria::<Parent>::new().where_eq("name", "parent"), None)?;
    assert_eq!(queried.len(), 1);
    assert!(Rc::ptr_eq(&queried[0], &parent));
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_clear_detaches_instances() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;

    let parent = Parent::new_ref("parent");
    session.persist(&parent)?;
    session.flush()?;
    let id = parent.borrow().id().expect("id assigned on flush");

    session.clear()?;
    assert!(!session.contains(&parent));
    let found = session.find::<Parent>(id)?.expect("parent exists");
    assert!(!Rc::ptr_eq(&found, &parent));
    assert_eq!(found.borrow().name(), Some("parent"));

    let again = session.find::<Parent>(id)?.expect("parent exists");
    assert!(Rc::ptr_eq(&found, &again));
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_persist_requires_parent_name() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;

    let parent = Parent::new_ref("parent");
    parent.borrow_mut().set_name(None);
    Parent::add_child(&parent, &Child::new_ref("child1"))?;

    match session.persist(&parent) {
        Err(OrmError::ConstraintViolation { entity, constraint, .. }) => {
            assert_eq!(entity, "Parent");
            assert_eq!(constraint, "parent_name_not_null");
        }
        other => panic!("expected constraint violation, got {:?}", other),
    }
    // Nothing was scheduled, the cascade included.
    assert_eq!(session.statistics()?.pending_inserts, 0);
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_cascade_assigns_identities_to_children() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;

    let parent = Parent::new_ref("parent");
    let children: Vec<_> = ["child1", "child2", "child3"]
        .into_iter()
        .map(Child::new_ref)
        .collect();
    for child in &children {
        Parent::add_child(&parent, child)?;
    }

    session.persist(&parent)?;
    assert_eq!(session.statistics()?.pending_inserts, 4);
    session.flush()?;

    let parent_id = parent.borrow().id();
    assert!(parent_id.is_some());
    for child in &children {
        let child = child.borrow();
        assert!(child.id().is_some());
        assert_eq!(child.parent_id(), parent_id);
    }

    session.clear()?;
    let reloaded = session.find::<Parent>(parent_id.expect("checked above"))?.expect("parent exists");
    assert_eq!(reloaded.borrow_mut().children()?.len(), 3);
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_children_added_after_persist_are_cascaded_on_flush() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;

    let parent = Parent::new_ref("parent");
    session.persist(&parent)?;
    session.flush()?;

    let late = Child::new_ref("late");
    Parent::add_child(&parent, &late)?;
    session.flush()?;
    assert!(late.borrow().id().is_some());
    assert!(session.contains(&late));
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_child_of_unsaved_parent_fails_flush() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;

    let parent = Parent::new_ref("never persisted");
    let child = Child::new_ref("child1");
    child.borrow_mut().set_parent(Some(&parent));
    session.persist(&child)?;

    let err = session.flush().unwrap_err();
    assert!(err.is_constraint_violation(), "{err}");
    // The child stays scheduled.
    assert_eq!(session.statistics()?.pending_inserts, 1);
    assert!(child.borrow().id().is_none());
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_persisting_detached_instance_is_rejected() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;
    let parent_id = create_data(&session)?;

    let detached = session.find::<Parent>(parent_id)?.expect("parent exists");
    session.clear()?;
    assert!(matches!(
        session.persist(&detached),
        Err(OrmError::DetachedEntity { id, .. }) if id == parent_id
    ));
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_parent_matched_by_two_children_is_returned_once() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;
    create_data(&session)?;

    assert_eq!(session.query(&parents_with_child("child1"), None)?.len(), 1);
    assert!(session.query(&parents_with_child("child2"), None)?.is_empty());
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_children_by_parent_name() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;
    create_data(&session)?;

    let criteria = Criteria::<Child>::new().where_association_eq("parent", "name", "parent");
    let children = session.query(&criteria, None)?;
    assert_eq!(children.len(), 2);

    // Child.parent is lazy: one statement on first access, then shared.
    let before = statements(&session);
    let first = children[0].borrow_mut().parent()?.expect("parent set");
    assert_eq!(statements(&session), before + 1);
    let second = children[1].borrow_mut().parent()?.expect("parent set");
    assert!(Rc::ptr_eq(&first, &second));
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_changed_name_is_written_on_flush() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;
    let parent_id = create_data(&session)?;

    let parent = session.find::<Parent>(parent_id)?.expect("parent exists");
    parent.borrow_mut().set_name(Some("renamed".to_string()));
    let before = statements(&session);
    session.flush()?;
    assert_eq!(statements(&session), before + 1);

    // A clean flush sends nothing.
    session.flush()?;
    assert_eq!(statements(&session), before + 1);

    let other = factory.open_session()?;
    let seen = other.find::<Parent>(parent_id)?.expect("parent exists");
    assert_eq!(seen.borrow().name(), Some("renamed"));
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_borrowed_instance_blocks_flush() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;
    let parent_id = create_data(&session)?;

    let parent = session.find::<Parent>(parent_id)?.expect("parent exists");
    let guard = parent.borrow_mut();
    assert_eq!(
        session.flush().unwrap_err(),
        OrmError::EntityInUse {
            entity: "Parent".into()
        }
    );
    drop(guard);
    session.flush()?;
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_rollback_discards_flushed_rows() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;

    session.begin_transaction()?;
    assert!(session.in_transaction()?);
    session.persist(&Parent::new_ref("temporary"))?;
    session.flush()?;
    session.rollback()?;
    assert!(!session.in_transaction()?);
    assert_eq!(session.statistics()?.managed_entities, 0);

    let all = session.query(&Criteria::<Parent>::new(), None)?;
    assert!(all.is_empty());
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_commit_without_transaction_fails() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;
    assert!(matches!(
        session.commit(),
        Err(OrmError::Store(StoreError::TransactionConflict(_)))
    ));
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_operations_after_close_fail() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let session = factory.open_session()?;
    session.close()?;
    assert!(!session.is_open()?);

    assert!(session.persist(&Parent::new_ref("late")).unwrap_err().is_session_closed());
    assert!(session.flush().unwrap_err().is_session_closed());
    assert!(session
        .query(&Criteria::<Parent>::new(), None)
        .unwrap_err()
        .is_session_closed());
    // Closing twice is harmless.
    session.close()?;
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_sessions_release_their_connections() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    assert_eq!(server.open_connections(), 0);

    let closed = factory.open_session()?;
    let dropped = factory.open_session()?;
    assert_eq!(server.open_connections(), 2);

    closed.close()?;
    assert_eq!(server.open_connections(), 1);
    drop(dropped);
    assert_eq!(server.open_connections(), 0);

    // Failed work still releases the connection.
    {
        let session = factory.open_session()?;
        session.begin_transaction()?;
        let unnamed = Parent::new_ref("x");
        unnamed.borrow_mut().set_name(None);
        assert!(session.persist(&unnamed).is_err());
        assert!(session
            .query(&Criteria::<Parent>::new().where_eq("age", 1_i64), None)
            .is_err());
    }
    assert_eq!(server.open_connections(), 0);
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_sessions_do_not_share_instances() -> anyhow::Result<()> {
    let server = server();
    let factory = factory(&server, SchemaAction::Create);
    let first = factory.open_session()?;
    let parent_id = create_data(&first)?;
    let second = factory.open_session()?;

    let a = first.find::<Parent>(parent_id)?.expect("parent exists");
    let b = second.find::<Parent>(parent_id)?.expect("parent exists");
    assert!(!Rc::ptr_eq(&a, &b));
    Ok(())
}
