//! Shared fixtures.

use std::sync::Arc;

use lazyrel_orm::{
    parent_child_mapping, Child, Criteria, FactoryConfig, Parent, Session, SessionFactory,
};
use lazyrel_store::{ConnectionConfig, SchemaAction, StoreConfig, StoreServer};

pub const HOST: &str = "localhost";
pub const PORT: u16 = 5432;
pub const DATABASE: &str = "example";
pub const USER: &str = "user";
pub const PASSWORD: &str = "1";

/// A server with one empty database.
pub fn server() -> Arc<StoreServer> {
    let server = StoreServer::new(HOST, PORT, StoreConfig::default());
    server.create_database(DATABASE, USER, PASSWORD).unwrap();
    Arc::new(server)
}

pub fn config(server: &StoreServer, action: SchemaAction) -> FactoryConfig {
    FactoryConfig::new(ConnectionConfig::new(server.url(DATABASE), USER, PASSWORD), action)
        .show_sql(true)
        .format_sql(true)
}

/// A factory with its own, freshly built mapping instance.
pub fn factory(server: &Arc<StoreServer>, action: SchemaAction) -> SessionFactory {
    factory_with(server, config(server, action))
}

pub fn factory_with(server: &Arc<StoreServer>, config: FactoryConfig) -> SessionFactory {
    SessionFactory::build(Arc::clone(server), parent_child_mapping().unwrap(), config).unwrap()
}

/// One parent "parent" with two children, both named "child1".
///
/// The children are persisted before the parent and linked afterwards, so
/// their foreign keys are written by the flush-time dirty check. Leaves the
/// session cleared and committed. Returns the parent id.
pub fn create_data(session: &Session) -> anyhow::Result<i64> {
    session.begin_transaction()?;
    let child1 = Child::new_ref("child1");
    session.persist(&child1)?;
    let child2 = Child::new_ref("child1");
    session.persist(&child2)?;

    let parent = Parent::new_ref("parent");
    parent
        .borrow_mut()
        .set_children(vec![child1.clone(), child2.clone()]);
    session.persist(&parent)?;
    child1.borrow_mut().set_parent(Some(&parent));
    child2.borrow_mut().set_parent(Some(&parent));

    session.flush()?;
    session.clear()?;
    session.commit()?;

    let id = parent.borrow().id();
    id.ok_or_else(|| anyhow::anyhow!("parent has no id after flush"))
}

/// Parents having at least one child with this name.
pub fn parents_with_child(name: &str) -> Criteria<Parent> {
    Criteria::new().where_association_eq("children", "name", name)
}

pub fn statements(session: &Session) -> u64 {
    session.statistics().unwrap().statements
}
