//! Mapping metadata: entity descriptors, associations and fetch modes.
//!
//! A [`Mapping`] is built once per session factory. Every built mapping gets
//! a fresh [`MappingId`], so two factories built from the same declarations
//! still hold distinct mapping instances. Fetch graphs remember the id of the
//! mapping they were created from.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lazyrel_store::schema::{ColumnSchema, RelationSchema, TableSchema};
use lazyrel_store::{ColumnType, SchemaFile, Value};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, ManagedEntity};
use crate::error::{OrmError, Result};
use crate::fetch_graph::FetchGraph;
use crate::session::HydrationContext;

static NEXT_MAPPING_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one built mapping instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingId(u64);

impl fmt::Display for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mapping#{}", self.0)
    }
}

/// Declared fetch mode of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Loaded on first access
    #[default]
    Lazy,
    /// Loaded together with the owner
    Eager,
}

/// Shape of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// Collection owned by the other side; `mapped_by` is the target's join column
    OneToMany { mapped_by: &'static str },
    /// Single reference stored in this entity's `join_column`
    ManyToOne { join_column: &'static str },
}

/// One association of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDescriptor {
    pub name: &'static str,
    pub target: &'static str,
    pub kind: AssociationKind,
    pub fetch: FetchMode,
    /// Persist cascades to loaded members
    pub cascade: bool,
}

impl AssociationDescriptor {
    pub fn one_to_many(name: &'static str, target: &'static str, mapped_by: &'static str) -> Self {
        Self {
            name,
            target,
            kind: AssociationKind::OneToMany { mapped_by },
            fetch: FetchMode::Lazy,
            cascade: false,
        }
    }

    pub fn many_to_one(name: &'static str, target: &'static str, join_column: &'static str) -> Self {
        Self {
            name,
            target,
            kind: AssociationKind::ManyToOne { join_column },
            fetch: FetchMode::Lazy,
            cascade: false,
        }
    }

    pub fn fetch(mut self, fetch: FetchMode) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn cascade_all(mut self) -> Self {
        self.cascade = true;
        self
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.kind, AssociationKind::OneToMany { .. })
    }
}

/// A persistent attribute stored in one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub name: &'static str,
    pub column: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl AttributeDescriptor {
    pub fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column: name,
            column_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Builds a managed instance from a `[id, attributes...]` row.
pub type HydrateFn = fn(&[Value], &HydrationContext<'_>) -> Result<ManagedEntity>;

fn hydrate_managed<E: Entity>(row: &[Value], ctx: &HydrationContext<'_>) -> Result<ManagedEntity> {
    let entity = E::hydrate(row, ctx)?;
    Ok(E::into_managed(Rc::new(RefCell::new(entity))))
}

/// Mapping metadata of one entity type.
#[derive(Clone)]
pub struct EntityDescriptor {
    pub name: &'static str,
    pub table: &'static str,
    /// Columns in row order, key excluded
    pub attributes: Vec<AttributeDescriptor>,
    pub associations: Vec<AssociationDescriptor>,
    pub hydrate: HydrateFn,
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("attributes", &self.attributes)
            .field("associations", &self.associations)
            .finish_non_exhaustive()
    }
}

impl EntityDescriptor {
    /// Empty descriptor for `E` stored in `table`.
    pub fn of<E: Entity>(table: &'static str) -> Self {
        Self {
            name: E::NAME,
            table,
            attributes: Vec::new(),
            associations: Vec::new(),
            hydrate: hydrate_managed::<E>,
        }
    }

    pub fn attribute(mut self, attribute: AttributeDescriptor) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn association(mut self, association: AssociationDescriptor) -> Self {
        self.associations.push(association);
        self
    }

    pub fn attribute_named(&self, name: &str) -> Result<&AttributeDescriptor> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| OrmError::UnknownAttribute {
                entity: self.name.to_string(),
                attribute: name.to_string(),
            })
    }

    pub fn association_named(&self, name: &str) -> Result<&AssociationDescriptor> {
        self.associations
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| OrmError::UnknownAssociation {
                entity: self.name.to_string(),
                association: name.to_string(),
            })
    }

    /// `id` followed by the attribute columns.
    pub fn select_columns(&self) -> Vec<String> {
        std::iter::once("id")
            .chain(self.attributes.iter().map(|a| a.column))
            .map(str::to_string)
            .collect()
    }

    pub fn insert_columns(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.column.to_string()).collect()
    }

    fn table_schema(&self, entities: &BTreeMap<&'static str, EntityDescriptor>) -> TableSchema {
        let columns = self
            .attributes
            .iter()
            .map(|a| ColumnSchema {
                name: a.column.to_string(),
                r#type: a.column_type,
                nullable: a.nullable,
            })
            .collect();
        let relations = self
            .associations
            .iter()
            .filter_map(|assoc| match assoc.kind {
                AssociationKind::ManyToOne { join_column } => {
                    entities.get(assoc.target).map(|target| RelationSchema {
                        from_column: join_column.to_string(),
                        to_table: target.table.to_string(),
                        to_column: "id".to_string(),
                    })
                }
                AssociationKind::OneToMany { .. } => None,
            })
            .collect();
        TableSchema { columns, relations }
    }
}

#[derive(Debug)]
struct MappingInner {
    id: MappingId,
    entities: BTreeMap<&'static str, EntityDescriptor>,
    insert_order: Vec<&'static str>,
}

/// A built, immutable mapping. Cloning shares the same instance.
#[derive(Debug, Clone)]
pub struct Mapping {
    inner: Arc<MappingInner>,
}

impl Mapping {
    pub fn builder() -> MappingBuilder {
        MappingBuilder::default()
    }

    pub fn id(&self) -> MappingId {
        self.inner.id
    }

    pub fn entity(&self, name: &str) -> Result<&EntityDescriptor> {
        self.inner
            .entities
            .get(name)
            .ok_or_else(|| OrmError::UnknownEntity(name.to_string()))
    }

    pub fn descriptor_of<E: Entity>(&self) -> Result<&EntityDescriptor> {
        self.entity(E::NAME)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.inner.entities.values()
    }

    /// Position of the entity in insert order: referenced entities come first.
    pub fn insert_rank(&self, entity: &str) -> usize {
        self.inner
            .insert_order
            .iter()
            .position(|name| *name == entity)
            .unwrap_or(usize::MAX)
    }

    /// DDL for every mapped table.
    pub fn schema(&self) -> SchemaFile {
        schema_of(&self.inner.entities)
    }

    /// Empty fetch graph rooted at `E`, bound to this mapping.
    pub fn fetch_graph<E: Entity>(&self) -> Result<FetchGraph> {
        let root = self.descriptor_of::<E>()?;
        Ok(FetchGraph::new(self.clone(), root.name))
    }

    pub fn same_instance(&self, other: &Mapping) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn schema_of(entities: &BTreeMap<&'static str, EntityDescriptor>) -> SchemaFile {
    let mut schema = SchemaFile::new();
    for descriptor in entities.values() {
        schema
            .tables
            .insert(descriptor.table.to_string(), descriptor.table_schema(entities));
    }
    schema
}

/// Collects entity descriptors and checks them against each other.
#[derive(Debug, Default)]
pub struct MappingBuilder {
    entities: Vec<EntityDescriptor>,
}

impl MappingBuilder {
    pub fn entity<E: Entity>(self) -> Self {
        self.descriptor(E::descriptor())
    }

    pub fn descriptor(mut self, descriptor: EntityDescriptor) -> Self {
        self.entities.push(descriptor);
        self
    }

    /// Validates the declarations and assigns a new [`MappingId`].
    pub fn build(self) -> Result<Mapping> {
        let mut entities = BTreeMap::new();
        let mut tables = HashSet::new();
        for descriptor in self.entities {
            if !tables.insert(descriptor.table) {
                return Err(OrmError::InvalidMapping(format!(
                    "table '{}' mapped twice",
                    descriptor.table
                )));
            }
            let name = descriptor.name;
            if entities.insert(name, descriptor).is_some() {
                return Err(OrmError::InvalidMapping(format!("entity '{}' mapped twice", name)));
            }
        }

        for descriptor in entities.values() {
            for assoc in &descriptor.associations {
                let target = entities.get(assoc.target).ok_or_else(|| {
                    OrmError::InvalidMapping(format!(
                        "{}.{} targets unmapped entity '{}'",
                        descriptor.name, assoc.name, assoc.target
                    ))
                })?;
                let (owner, column) = match assoc.kind {
                    AssociationKind::OneToMany { mapped_by } => (target, mapped_by),
                    AssociationKind::ManyToOne { join_column } => (descriptor, join_column),
                };
                let join_is_key = owner
                    .attributes
                    .iter()
                    .any(|a| a.column == column && a.column_type == ColumnType::Int8);
                if !join_is_key {
                    return Err(OrmError::InvalidMapping(format!(
                        "{}.{} joins on '{}.{}', which is not an int8 attribute",
                        descriptor.name, assoc.name, owner.table, column
                    )));
                }
            }
        }

        let schema = schema_of(&entities);
        let insert_order = schema
            .creation_order()
            .map_err(|e| OrmError::InvalidMapping(e.to_string()))?
            .into_iter()
            .filter_map(|table| entities.values().find(|d| d.table == table).map(|d| d.name))
            .collect();

        let id = MappingId(NEXT_MAPPING_ID.fetch_add(1, Ordering::SeqCst));
        tracing::debug!(mapping = %id, entities = entities.len(), "mapping built");
        Ok(Mapping {
            inner: Arc::new(MappingInner {
                id,
                entities,
                insert_order,
            }),
        })
    }
}
