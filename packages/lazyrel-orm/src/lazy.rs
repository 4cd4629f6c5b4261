//! Association values that are either loaded or deferred.

use std::fmt;

use crate::entity::EntityKey;
use crate::error::{OrmError, Result};

type Loader<T> = Box<dyn Fn() -> Result<T>>;

/// Pending load of one association of one owner.
///
/// The loader is bound to the session that produced the owner; it fails with
/// `SessionClosed` once that session is gone.
pub struct DeferredLoad<T> {
    owner: EntityKey,
    association: &'static str,
    loader: Loader<T>,
}

impl<T> DeferredLoad<T> {
    pub fn new(owner: EntityKey, association: &'static str, loader: impl Fn() -> Result<T> + 'static) -> Self {
        Self {
            owner,
            association,
            loader: Box::new(loader),
        }
    }

    pub fn owner(&self) -> EntityKey {
        self.owner
    }

    pub fn association(&self) -> &'static str {
        self.association
    }

    fn load(&self) -> Result<T> {
        tracing::debug!(owner = %self.owner, association = self.association, "materializing deferred association");
        (self.loader)()
    }
}

/// An association value.
pub enum Lazy<T> {
    Loaded(T),
    Deferred(DeferredLoad<T>),
}

impl<T> Lazy<T> {
    /// Whether the value is present without a store round-trip.
    pub fn is_materialized(&self) -> bool {
        matches!(self, Lazy::Loaded(_))
    }

    /// The value if already loaded.
    pub fn peek(&self) -> Option<&T> {
        match self {
            Lazy::Loaded(value) => Some(value),
            Lazy::Deferred(_) => None,
        }
    }

    pub fn peek_mut(&mut self) -> Option<&mut T> {
        match self {
            Lazy::Loaded(value) => Some(value),
            Lazy::Deferred(_) => None,
        }
    }

    /// Loads the value if needed and returns it.
    ///
    /// A failed load leaves the value deferred, so a later call may retry.
    pub fn get_mut(&mut self) -> Result<&mut T> {
        if let Lazy::Deferred(deferred) = self {
            let value = deferred.load()?;
            *self = Lazy::Loaded(value);
        }
        match self {
            Lazy::Loaded(value) => Ok(value),
            Lazy::Deferred(deferred) => Err(OrmError::closed(format!(
                "{}.{}",
                deferred.owner, deferred.association
            ))),
        }
    }

    pub fn get(&mut self) -> Result<&T> {
        self.get_mut().map(|value| &*value)
    }

    /// Replaces the value, dropping any pending load.
    pub fn set(&mut self, value: T) {
        *self = Lazy::Loaded(value);
    }
}

impl<T: Default> Default for Lazy<T> {
    fn default() -> Self {
        Lazy::Loaded(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lazy::Loaded(value) => f.debug_tuple("Loaded").field(value).finish(),
            Lazy::Deferred(deferred) => f
                .debug_struct("Deferred")
                .field("owner", &deferred.owner)
                .field("association", &deferred.association)
                .finish(),
        }
    }
}
