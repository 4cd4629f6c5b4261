//! Entity traits and handles to managed instances.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use lazyrel_store::Value;

use crate::error::{OrmError, Result};
use crate::mapping::EntityDescriptor;
use crate::model::{Child, Parent};
use crate::session::HydrationContext;

/// Identity-map key: entity name plus generated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub entity: &'static str,
    pub id: i64,
}

impl EntityKey {
    pub fn new(entity: &'static str, id: i64) -> Self {
        Self { entity, id }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.id)
    }
}

/// Per-instance state the session reads and writes during flush and
/// association loading.
///
/// Column values are always in the attribute order of the entity's
/// [`EntityDescriptor`], without the key.
pub trait EntityState {
    fn entity_name(&self) -> &'static str;

    fn id(&self) -> Option<i64>;

    /// Sets the generated key. Fails if the instance already has one.
    fn assign_id(&mut self, id: i64) -> Result<()>;

    /// First required attribute that is unset.
    fn missing_required(&self) -> Option<&'static str>;

    /// Current column values, resolving loaded references to their keys.
    fn column_values(&self) -> Result<Vec<Value>>;

    /// Called after the instance's row was written.
    fn on_flushed(&mut self, _values: &[Value]) {}

    /// Key used to batch-load an association: the own id for collections,
    /// the foreign key for single-valued references.
    fn association_key(&self, association: &str) -> Option<i64>;

    fn is_association_materialized(&self, association: &str) -> bool;

    /// Installs loaded instances as the association's value.
    fn attach(&mut self, association: &str, loaded: Vec<ManagedEntity>) -> Result<()>;

    /// Loaded instances reachable through a cascading association.
    fn cascade_targets(&self, association: &str) -> Vec<ManagedEntity>;
}

/// A mapped entity type.
pub trait Entity: EntityState + Sized + 'static {
    /// Entity name used in the mapping and identity map.
    const NAME: &'static str;

    /// Mapping metadata for this type.
    fn descriptor() -> EntityDescriptor;

    /// Builds an instance from a row laid out as `[id, attributes...]`.
    fn hydrate(row: &[Value], ctx: &HydrationContext<'_>) -> Result<Self>;

    fn into_managed(entity: Rc<RefCell<Self>>) -> ManagedEntity;

    fn from_managed(managed: &ManagedEntity) -> Option<Rc<RefCell<Self>>>;
}

/// Shared handle to a managed instance of any mapped type.
#[derive(Debug, Clone)]
pub enum ManagedEntity {
    Parent(Rc<RefCell<Parent>>),
    Child(Rc<RefCell<Child>>),
}

impl ManagedEntity {
    pub fn entity_name(&self) -> &'static str {
        match self {
            ManagedEntity::Parent(_) => Parent::NAME,
            ManagedEntity::Child(_) => Child::NAME,
        }
    }

    /// Same instance, not just same identity.
    pub fn ptr_eq(&self, other: &ManagedEntity) -> bool {
        match (self, other) {
            (ManagedEntity::Parent(a), ManagedEntity::Parent(b)) => Rc::ptr_eq(a, b),
            (ManagedEntity::Child(a), ManagedEntity::Child(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Runs `f` with a shared borrow of the instance.
    pub fn with<R>(&self, f: impl FnOnce(&dyn EntityState) -> R) -> Result<R> {
        match self {
            ManagedEntity::Parent(p) => {
                let p = p.try_borrow().map_err(|_| OrmError::in_use(Parent::NAME))?;
                Ok(f(&*p))
            }
            ManagedEntity::Child(c) => {
                let c = c.try_borrow().map_err(|_| OrmError::in_use(Child::NAME))?;
                Ok(f(&*c))
            }
        }
    }

    /// Runs `f` with an exclusive borrow of the instance.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut dyn EntityState) -> R) -> Result<R> {
        match self {
            ManagedEntity::Parent(p) => {
                let mut p = p.try_borrow_mut().map_err(|_| OrmError::in_use(Parent::NAME))?;
                Ok(f(&mut *p))
            }
            ManagedEntity::Child(c) => {
                let mut c = c.try_borrow_mut().map_err(|_| OrmError::in_use(Child::NAME))?;
                Ok(f(&mut *c))
            }
        }
    }

    pub fn id(&self) -> Result<Option<i64>> {
        self.with(|e| e.id())
    }

    pub fn key(&self) -> Result<Option<EntityKey>> {
        let name = self.entity_name();
        Ok(self.id()?.map(|id| EntityKey::new(name, id)))
    }
}
