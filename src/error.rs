//! Errors reported by query construction and iteration.
//!
//! Construction errors (`InvalidQuery`, `TooManyComponentTypes`, registry errors)
//! are returned to the builder's caller and never leave a partially built query behind.
//! Iteration errors (`StaleHandle`, `InvalidIteratorState`) signal a wrong call
//! sequence and are not meant to be recovered from.

use {crate::component::ComponentId, thiserror::Error};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Descriptor is malformed or contradictory.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Descriptor references more component types than storage format allows.
    #[error("Query references {count} component types, at most {max} are supported")]
    TooManyComponentTypes { count: usize, max: usize },

    /// Handle was not updated in the current step before resolving.
    #[error("Type handle is stale. Call `update` before resolving chunks")]
    StaleHandle,

    /// `current` was called before first successful `move_next` or after exhaustion.
    #[error("Enumerator is not positioned at an entity")]
    InvalidIteratorState,

    /// Component type was never registered.
    #[error("Component `{0}` is not registered")]
    UnregisteredComponent(&'static str),

    /// Global registry is used before `initialize` or after `shutdown`.
    #[error("Component registry is not initialized")]
    RegistryNotInitialized,

    /// `initialize` was called twice without `shutdown` in between.
    #[error("Component registry is already initialized")]
    RegistryAlreadyInitialized,

    /// Referenced entity is despawned or was never spawned.
    #[error("Entity does not exist")]
    NoSuchEntity,

    /// Archetype of the entity or chunk lacks the component.
    #[error("Component {0} is missing")]
    MissingComponent(ComponentId),

    /// Write access requested through a read-only reference
    /// or to a component the handle does not reference.
    #[error("Access to component {0} was not granted")]
    AccessDenied(ComponentId),

    /// Column is already borrowed in a conflicting way.
    #[error("Component {0} is already borrowed")]
    Borrowed(ComponentId),

    /// Entity index is past the end of the chunk.
    #[error("Index {index} is out of bounds for chunk of {len} entities")]
    IndexOutOfBounds { index: usize, len: usize },
}

impl QueryError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        QueryError::InvalidQuery(message.into())
    }
}
