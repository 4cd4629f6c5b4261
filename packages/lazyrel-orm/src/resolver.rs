//! Turns declared fetch modes plus an optional fetch graph into a plan.

use crate::config::MismatchPolicy;
use crate::error::{OrmError, Result};
use crate::fetch_graph::{FetchGraph, GraphSemantics};
use crate::mapping::{EntityDescriptor, FetchMode, Mapping};

/// Where a plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    /// Declared fetch modes only
    Declared,
    /// A fetch graph of the same mapping
    Graph,
}

/// Associations of one root entity to load with the root rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    pub entity: &'static str,
    pub eager: Vec<&'static str>,
    pub source: PlanSource,
}

impl FetchPlan {
    pub fn is_eager(&self, association: &str) -> bool {
        self.eager.iter().any(|a| *a == association)
    }
}

/// Resolves fetch plans against one mapping.
#[derive(Debug)]
pub struct FetchPlanResolver<'m> {
    mapping: &'m Mapping,
    policy: MismatchPolicy,
}

impl<'m> FetchPlanResolver<'m> {
    pub fn new(mapping: &'m Mapping, policy: MismatchPolicy) -> Self {
        Self { mapping, policy }
    }

    /// Plan for querying `entity`.
    ///
    /// A graph created from a different mapping instance, or rooted at a
    /// different entity, does not apply. Under [`MismatchPolicy::Ignore`]
    /// the declared plan is used and a warning is logged; under
    /// [`MismatchPolicy::Reject`] resolution fails.
    pub fn resolve(&self, entity: &EntityDescriptor, graph: Option<&FetchGraph>) -> Result<FetchPlan> {
        let Some(graph) = graph else {
            return Ok(self.declared(entity));
        };

        if !graph.belongs_to(self.mapping) || graph.root() != entity.name {
            return match self.policy {
                MismatchPolicy::Reject => Err(OrmError::MappingMismatch {
                    entity: entity.name.to_string(),
                    expected: self.mapping.id(),
                    found: graph.mapping_id(),
                }),
                MismatchPolicy::Ignore => {
                    tracing::warn!(
                        entity = entity.name,
                        graph_root = graph.root(),
                        graph_mapping = %graph.mapping_id(),
                        session_mapping = %self.mapping.id(),
                        "fetch graph does not apply to this session, using declared fetch modes"
                    );
                    Ok(self.declared(entity))
                }
            };
        }

        let eager = entity
            .associations
            .iter()
            .filter(|assoc| {
                graph.contains(assoc.name)
                    || (graph.semantics() == GraphSemantics::Load && assoc.fetch == FetchMode::Eager)
            })
            .map(|assoc| assoc.name)
            .collect();
        Ok(FetchPlan {
            entity: entity.name,
            eager,
            source: PlanSource::Graph,
        })
    }

    fn declared(&self, entity: &EntityDescriptor) -> FetchPlan {
        FetchPlan {
            entity: entity.name,
            eager: entity
                .associations
                .iter()
                .filter(|assoc| assoc.fetch == FetchMode::Eager)
                .map(|assoc| assoc.name)
                .collect(),
            source: PlanSource::Declared,
        }
    }
}
