//! Persistence core for parent/child entities over the lazyrel store.
//!
//! Sessions track instances in an identity map, write changes as a unit of
//! work, and load associations either eagerly (per the declared fetch modes
//! or a fetch graph) or on first access.
//!
//! A fetch graph only applies to sessions of the mapping instance it was
//! created from. Handed to a session of another factory it is ignored with a
//! warning, or rejected under [`MismatchPolicy::Reject`].

pub mod config;
pub mod entity;
pub mod error;
pub mod factory;
pub mod fetch_graph;
pub mod lazy;
pub mod mapping;
pub mod model;
pub mod query;
pub mod resolver;
pub mod session;

pub use config::{FactoryConfig, MismatchPolicy};
pub use entity::{Entity, EntityKey, EntityState, ManagedEntity};
pub use error::{OrmError, Result};
pub use factory::SessionFactory;
pub use fetch_graph::{FetchGraph, GraphSemantics};
pub use lazy::{DeferredLoad, Lazy};
pub use mapping::{FetchMode, Mapping, MappingId};
pub use model::{parent_child_mapping, Child, ChildRef, Parent, ParentRef};
pub use query::Criteria;
pub use resolver::{FetchPlan, FetchPlanResolver, PlanSource};
pub use session::{HydrationContext, Session, SessionStatistics};
