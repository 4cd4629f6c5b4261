//! Persistence error types.

use lazyrel_store::StoreError;
use thiserror::Error;

use crate::mapping::MappingId;

/// Errors raised by sessions, mappings and fetch plans.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrmError {
    /// Store failure that is not a constraint violation
    #[error(transparent)]
    Store(StoreError),

    /// Required attribute missing, or a foreign key that does not resolve
    #[error("Constraint '{constraint}' violated on {entity}: {detail}")]
    ConstraintViolation {
        entity: String,
        constraint: String,
        detail: String,
    },

    /// Operation on a closed session, or a deferred load whose session is gone
    #[error("Session is closed: {context}")]
    SessionClosed { context: String },

    /// Fetch graph built against another mapping instance (strict policy only)
    #[error("Fetch graph for {entity} belongs to {found}, session uses {expected}")]
    MappingMismatch {
        entity: String,
        expected: MappingId,
        found: MappingId,
    },

    /// Entity name not present in the mapping
    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    /// Association name not declared on the entity
    #[error("Unknown association '{association}' on {entity}")]
    UnknownAssociation { entity: String, association: String },

    /// Attribute name not declared on the entity
    #[error("Unknown attribute '{attribute}' on {entity}")]
    UnknownAttribute { entity: String, attribute: String },

    /// Mapping declarations are inconsistent
    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),

    /// The entity is mutably borrowed elsewhere
    #[error("{entity} instance is already borrowed")]
    EntityInUse { entity: String },

    /// A session operation was re-entered while another one is running
    #[error("Session is busy")]
    SessionBusy,

    /// Persist called with an instance that has an identity but is not managed
    #[error("Detached {entity} with id {id} passed to persist")]
    DetachedEntity { entity: String, id: i64 },

    /// The target of a loaded reference is no longer alive
    #[error("{entity}.{association} points at an instance that was dropped")]
    DanglingReference { entity: String, association: String },

    /// Identity assigned twice
    #[error("{entity} already has id {id}")]
    IdentityAlreadyAssigned { entity: String, id: i64 },

    /// Row shape does not match the mapping
    #[error("Cannot hydrate {entity}: {detail}")]
    Hydration { entity: String, detail: String },
}

impl From<StoreError> for OrmError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConstraintViolation {
                table,
                constraint,
                detail,
            } => OrmError::ConstraintViolation {
                entity: table,
                constraint,
                detail,
            },
            other => OrmError::Store(other),
        }
    }
}

impl OrmError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, OrmError::ConstraintViolation { .. })
    }

    pub fn is_session_closed(&self) -> bool {
        matches!(self, OrmError::SessionClosed { .. })
    }

    pub(crate) fn in_use(entity: &str) -> Self {
        OrmError::EntityInUse {
            entity: entity.to_string(),
        }
    }

    pub(crate) fn closed(context: impl Into<String>) -> Self {
        OrmError::SessionClosed {
            context: context.into(),
        }
    }
}

/// Result alias for persistence operations.
pub type Result<T> = std::result::Result<T, OrmError>;
