//! Per-query fetch overrides.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mapping::{Mapping, MappingId};

/// How a graph combines with the declared fetch modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphSemantics {
    /// Listed associations eager, every other association lazy
    #[default]
    Fetch,
    /// Listed associations eager, the rest keep their declared mode
    Load,
}

/// Names the associations of a root entity to load together with it.
///
/// A graph is bound to the mapping instance it was created from. Use it
/// with sessions of that mapping; other sessions treat it as a mismatch.
#[derive(Debug, Clone)]
pub struct FetchGraph {
    mapping: Mapping,
    root: &'static str,
    attributes: BTreeSet<&'static str>,
    semantics: GraphSemantics,
}

impl FetchGraph {
    pub(crate) fn new(mapping: Mapping, root: &'static str) -> Self {
        Self {
            mapping,
            root,
            attributes: BTreeSet::new(),
            semantics: GraphSemantics::default(),
        }
    }

    /// Marks an association of the root entity for fetching.
    pub fn add_subgraph(&mut self, association: &str) -> Result<&mut Self> {
        let name = self
            .mapping
            .entity(self.root)?
            .association_named(association)?
            .name;
        self.attributes.insert(name);
        Ok(self)
    }

    pub fn with_semantics(mut self, semantics: GraphSemantics) -> Self {
        self.semantics = semantics;
        self
    }

    pub fn mapping_id(&self) -> MappingId {
        self.mapping.id()
    }

    pub fn root(&self) -> &'static str {
        self.root
    }

    pub fn semantics(&self) -> GraphSemantics {
        self.semantics
    }

    pub fn attributes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.attributes.iter().copied()
    }

    pub fn contains(&self, association: &str) -> bool {
        self.attributes.contains(association)
    }

    /// Whether this graph was created from `mapping`.
    pub fn belongs_to(&self, mapping: &Mapping) -> bool {
        self.mapping.same_instance(mapping)
    }
}
