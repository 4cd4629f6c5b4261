//! Typed query criteria.

use std::marker::PhantomData;

use lazyrel_store::{Filter, Value};

use crate::entity::Entity;
use crate::error::Result;
use crate::mapping::{AssociationKind, Mapping};

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Attribute {
        attribute: String,
        value: Value,
    },
    Association {
        association: String,
        attribute: String,
        value: Value,
    },
}

/// Conditions on instances of `E`, all of which must hold.
///
/// `where_association_eq("children", "name", "child1")` selects parents
/// having at least one child named `child1`; each parent appears once.
pub struct Criteria<E> {
    conditions: Vec<Condition>,
    limit: Option<usize>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Criteria<E> {
    fn clone(&self) -> Self {
        Self {
            conditions: self.conditions.clone(),
            limit: self.limit,
            _entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for Criteria<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Criteria")
            .field("conditions", &self.conditions)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<E: Entity> Default for Criteria<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Criteria<E> {
    /// Every instance.
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
            limit: None,
            _entity: PhantomData,
        }
    }

    pub fn where_eq(mut self, attribute: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Attribute {
            attribute: attribute.to_string(),
            value: value.into(),
        });
        self
    }

    /// Condition on an attribute of an associated entity.
    pub fn where_association_eq(mut self, association: &str, attribute: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Association {
            association: association.to_string(),
            attribute: attribute.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    /// Store filter over the table of `E`.
    pub(crate) fn to_filter(&self, mapping: &Mapping) -> Result<Filter> {
        let entity = mapping.descriptor_of::<E>()?;
        let mut filter = Filter::All;
        for condition in &self.conditions {
            let next = match condition {
                Condition::Attribute { attribute, value } => {
                    Filter::eq(entity.attribute_named(attribute)?.column, value.clone())
                }
                Condition::Association {
                    association,
                    attribute,
                    value,
                } => {
                    let assoc = entity.association_named(association)?;
                    let target = mapping.entity(assoc.target)?;
                    let inner = Filter::eq(target.attribute_named(attribute)?.column, value.clone());
                    match assoc.kind {
                        AssociationKind::OneToMany { mapped_by } => Filter::exists(target.table, mapped_by, inner),
                        AssociationKind::ManyToOne { join_column } => {
                            Filter::in_select(join_column, target.table, inner)
                        }
                    }
                }
            };
            filter = filter.and(next);
        }
        Ok(filter)
    }
}
