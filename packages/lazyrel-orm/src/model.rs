//! The mapped `Parent` / `Child` entities.
//!
//! A parent owns a collection of children; each child refers back to its
//! parent. The back-reference is strong, except for children held by their
//! parent's own loaded collection: those point back weakly so that parent and
//! children never keep each other alive.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use lazyrel_store::{ColumnType, Value};

use crate::entity::{Entity, EntityKey, EntityState, ManagedEntity};
use crate::error::{OrmError, Result};
use crate::lazy::Lazy;
use crate::mapping::{AssociationDescriptor, AttributeDescriptor, EntityDescriptor, FetchMode, Mapping};
use crate::session::HydrationContext;

pub type ParentRef = Rc<RefCell<Parent>>;
pub type ChildRef = Rc<RefCell<Child>>;

/// Builds a new mapping instance for `Parent` and `Child`.
pub fn parent_child_mapping() -> Result<Mapping> {
    Mapping::builder().entity::<Parent>().entity::<Child>().build()
}

#[derive(Debug, Default)]
pub struct Parent {
    id: Option<i64>,
    name: Option<String>,
    children: Lazy<Vec<ChildRef>>,
}

impl Parent {
    pub const CHILDREN: &'static str = "children";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn new_ref(name: impl Into<String>) -> ParentRef {
        Rc::new(RefCell::new(Self::new(name)))
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    /// The children, loading them first if they are deferred.
    pub fn children(&mut self) -> Result<&Vec<ChildRef>> {
        self.children.get()
    }

    pub fn children_mut(&mut self) -> Result<&mut Vec<ChildRef>> {
        self.children.get_mut()
    }

    pub fn set_children(&mut self, children: Vec<ChildRef>) {
        held_by_collection(&children);
        self.children.set(children);
    }

    /// Diagnostic: whether the children are in memory. Never loads.
    pub fn is_children_materialized(&self) -> bool {
        self.children.is_materialized()
    }

    /// Links both sides: appends `child` to the collection and points its
    /// parent reference at `parent`.
    pub fn add_child(parent: &ParentRef, child: &ChildRef) -> Result<()> {
        parent
            .try_borrow_mut()
            .map_err(|_| OrmError::in_use(Parent::NAME))?
            .children_mut()?
            .push(Rc::clone(child));
        child
            .try_borrow_mut()
            .map_err(|_| OrmError::in_use(Child::NAME))?
            .set_parent(Some(parent));
        Ok(())
    }

    /// Whether the loaded collection holds this very instance.
    fn holds(&self, child: &Child) -> bool {
        self.children
            .peek()
            .map_or(false, |children| children.iter().any(|c| std::ptr::eq(c.as_ptr(), child)))
    }
}

/// Children now held by a parent's collection stop owning that parent.
fn held_by_collection(children: &[ChildRef]) {
    for child in children {
        if let Ok(mut child) = child.try_borrow_mut() {
            if let Some(Some(link)) = child.parent.peek_mut() {
                link.demote();
            }
        }
    }
}

impl EntityState for Parent {
    fn entity_name(&self) -> &'static str {
        Self::NAME
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn assign_id(&mut self, id: i64) -> Result<()> {
        assign_once(&mut self.id, Self::NAME, id)
    }

    fn missing_required(&self) -> Option<&'static str> {
        self.name.is_none().then_some("name")
    }

    fn column_values(&self) -> Result<Vec<Value>> {
        Ok(vec![Value::from(self.name.clone())])
    }

    fn association_key(&self, association: &str) -> Option<i64> {
        (association == Self::CHILDREN).then_some(self.id).flatten()
    }

    fn is_association_materialized(&self, association: &str) -> bool {
        association == Self::CHILDREN && self.children.is_materialized()
    }

    fn attach(&mut self, association: &str, loaded: Vec<ManagedEntity>) -> Result<()> {
        if association != Self::CHILDREN {
            return Err(unknown_association(Self::NAME, association));
        }
        let children: Vec<ChildRef> = loaded.iter().filter_map(Child::from_managed).collect();
        held_by_collection(&children);
        self.children.set(children);
        Ok(())
    }

    fn cascade_targets(&self, association: &str) -> Vec<ManagedEntity> {
        match (association, self.children.peek()) {
            (Self::CHILDREN, Some(children)) => children
                .iter()
                .map(|c| Child::into_managed(Rc::clone(c)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl Entity for Parent {
    const NAME: &'static str = "Parent";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::of::<Self>("parent")
            .attribute(AttributeDescriptor::new("name", ColumnType::Text).not_null())
            .association(
                AssociationDescriptor::one_to_many(Self::CHILDREN, Child::NAME, "parent_id")
                    .fetch(FetchMode::Lazy)
                    .cascade_all(),
            )
    }

    fn hydrate(row: &[Value], ctx: &HydrationContext<'_>) -> Result<Self> {
        let (id, cells) = split_row(Self::NAME, row, 1)?;
        let owner = EntityKey::new(Self::NAME, id);
        Ok(Self {
            id: Some(id),
            name: cells[0].as_text().map(str::to_string),
            children: Lazy::Deferred(ctx.deferred(owner, Self::CHILDREN, id, |loaded| {
                let children = loaded.iter().filter_map(Child::from_managed).collect::<Vec<_>>();
                held_by_collection(&children);
                children
            })),
        })
    }

    fn into_managed(entity: Rc<RefCell<Self>>) -> ManagedEntity {
        ManagedEntity::Parent(entity)
    }

    fn from_managed(managed: &ManagedEntity) -> Option<Rc<RefCell<Self>>> {
        match managed {
            ManagedEntity::Parent(p) => Some(Rc::clone(p)),
            ManagedEntity::Child(_) => None,
        }
    }
}

/// A child's reference to its parent.
#[derive(Debug, Clone)]
enum ParentLink {
    Strong(ParentRef),
    /// The parent's collection holds the child.
    Weak(Weak<RefCell<Parent>>),
}

impl ParentLink {
    /// Weak if `parent`'s loaded collection already holds `child`.
    fn to(parent: &ParentRef, child: &Child) -> Self {
        match parent.try_borrow() {
            Ok(p) if p.holds(child) => ParentLink::Weak(Rc::downgrade(parent)),
            _ => ParentLink::Strong(Rc::clone(parent)),
        }
    }

    fn upgrade(&self) -> Option<ParentRef> {
        match self {
            ParentLink::Strong(parent) => Some(Rc::clone(parent)),
            ParentLink::Weak(parent) => parent.upgrade(),
        }
    }

    fn demote(&mut self) {
        if let ParentLink::Strong(parent) = self {
            *self = ParentLink::Weak(Rc::downgrade(parent));
        }
    }
}

#[derive(Debug, Default)]
pub struct Child {
    id: Option<i64>,
    name: Option<String>,
    /// Foreign key as last read or written
    parent_id: Option<i64>,
    parent: Lazy<Option<ParentLink>>,
}

impl Child {
    pub const PARENT: &'static str = "parent";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn new_ref(name: impl Into<String>) -> ChildRef {
        Rc::new(RefCell::new(Self::new(name)))
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    /// The parent, loading it first if the reference is deferred.
    pub fn parent(&mut self) -> Result<Option<ParentRef>> {
        match self.parent.get()? {
            None => Ok(None),
            Some(link) => link.upgrade().map(Some).ok_or_else(|| OrmError::DanglingReference {
                entity: Self::NAME.to_string(),
                association: Self::PARENT.to_string(),
            }),
        }
    }

    /// Points the parent reference at `parent` without touching the
    /// parent's collection.
    pub fn set_parent(&mut self, parent: Option<&ParentRef>) {
        self.parent_id = parent.and_then(live_id);
        let link = parent.map(|p| ParentLink::to(p, &*self));
        self.parent.set(link);
    }

    /// Foreign key currently in effect, without loading.
    pub fn parent_id(&self) -> Option<i64> {
        match self.parent.peek() {
            Some(Some(link)) => link.upgrade().as_ref().and_then(live_id).or(self.parent_id),
            Some(None) => None,
            None => self.parent_id,
        }
    }

    /// Diagnostic: whether `parent()` answers without a store round-trip.
    /// A weak link whose parent was dropped does not count.
    pub fn is_parent_materialized(&self) -> bool {
        match self.parent.peek() {
            Some(Some(link)) => link.upgrade().is_some(),
            Some(None) => true,
            None => false,
        }
    }
}

impl EntityState for Child {
    fn entity_name(&self) -> &'static str {
        Self::NAME
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn assign_id(&mut self, id: i64) -> Result<()> {
        assign_once(&mut self.id, Self::NAME, id)
    }

    fn missing_required(&self) -> Option<&'static str> {
        None
    }

    fn column_values(&self) -> Result<Vec<Value>> {
        let parent_id = match self.parent.peek() {
            Some(Some(link)) => match link.upgrade() {
                Some(parent) => {
                    let parent = parent.try_borrow().map_err(|_| OrmError::in_use(Parent::NAME))?;
                    Some(parent.id.ok_or_else(|| OrmError::ConstraintViolation {
                        entity: Self::NAME.to_string(),
                        constraint: "child_parent_id_fkey".to_string(),
                        detail: "references an unsaved transient instance of Parent".to_string(),
                    })?)
                }
                None => self.parent_id,
            },
            Some(None) => None,
            None => self.parent_id,
        };
        Ok(vec![Value::from(self.name.clone()), Value::from(parent_id)])
    }

    fn on_flushed(&mut self, values: &[Value]) {
        self.parent_id = values.get(1).and_then(Value::as_int);
    }

    fn association_key(&self, association: &str) -> Option<i64> {
        (association == Self::PARENT).then(|| self.parent_id()).flatten()
    }

    fn is_association_materialized(&self, association: &str) -> bool {
        association == Self::PARENT && self.is_parent_materialized()
    }

    fn attach(&mut self, association: &str, loaded: Vec<ManagedEntity>) -> Result<()> {
        if association != Self::PARENT {
            return Err(unknown_association(Self::NAME, association));
        }
        let link = loaded
            .iter()
            .find_map(Parent::from_managed)
            .map(|parent| ParentLink::to(&parent, &*self));
        self.parent.set(link);
        Ok(())
    }

    fn cascade_targets(&self, _association: &str) -> Vec<ManagedEntity> {
        Vec::new()
    }
}

impl Entity for Child {
    const NAME: &'static str = "Child";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::of::<Self>("child")
            .attribute(AttributeDescriptor::new("name", ColumnType::Text))
            .attribute(AttributeDescriptor::new("parent_id", ColumnType::Int8))
            .association(
                AssociationDescriptor::many_to_one(Self::PARENT, Parent::NAME, "parent_id")
                    .fetch(FetchMode::Lazy),
            )
    }

    fn hydrate(row: &[Value], ctx: &HydrationContext<'_>) -> Result<Self> {
        let (id, cells) = split_row(Self::NAME, row, 2)?;
        let parent_id = cells[1].as_int();
        let parent = match parent_id {
            None => Lazy::Loaded(None),
            Some(pid) => match ctx.managed::<Parent>(pid) {
                Some(parent) => Lazy::Loaded(Some(ParentLink::Strong(parent))),
                None => Lazy::Deferred(ctx.deferred(
                    EntityKey::new(Self::NAME, id),
                    Self::PARENT,
                    pid,
                    |loaded| {
                        loaded
                            .iter()
                            .find_map(Parent::from_managed)
                            .map(ParentLink::Strong)
                    },
                )),
            },
        };
        Ok(Self {
            id: Some(id),
            name: cells[0].as_text().map(str::to_string),
            parent_id,
            parent,
        })
    }

    fn into_managed(entity: Rc<RefCell<Self>>) -> ManagedEntity {
        ManagedEntity::Child(entity)
    }

    fn from_managed(managed: &ManagedEntity) -> Option<Rc<RefCell<Self>>> {
        match managed {
            ManagedEntity::Child(c) => Some(Rc::clone(c)),
            ManagedEntity::Parent(_) => None,
        }
    }
}

/// Id of a parent that is not mutably borrowed right now.
fn live_id(parent: &ParentRef) -> Option<i64> {
    let parent = parent.try_borrow().ok()?;
    parent.id
}

fn assign_once(slot: &mut Option<i64>, entity: &str, id: i64) -> Result<()> {
    if let Some(existing) = *slot {
        return Err(OrmError::IdentityAlreadyAssigned {
            entity: entity.to_string(),
            id: existing,
        });
    }
    *slot = Some(id);
    Ok(())
}

fn unknown_association(entity: &str, association: &str) -> OrmError {
    OrmError::UnknownAssociation {
        entity: entity.to_string(),
        association: association.to_string(),
    }
}

/// Splits `[id, cells...]`, checking the key and the cell count.
fn split_row<'r>(entity: &str, row: &'r [Value], cells: usize) -> Result<(i64, &'r [Value])> {
    let hydration = |detail: String| OrmError::Hydration {
        entity: entity.to_string(),
        detail,
    };
    if row.len() != cells + 1 {
        return Err(hydration(format!("expected {} columns, got {}", cells + 1, row.len())));
    }
    let id = row[0]
        .as_int()
        .ok_or_else(|| hydration(format!("key is {}", row[0].kind())))?;
    Ok((id, &row[1..]))
}
