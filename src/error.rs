//! Error module.
//!
//! `EcsError` collects every failure mode this crate can report. Each variant documents the
//! call that raises it. Nothing in this crate swallows an error silently; internal invariant
//! violations instead use `debug_assert!` and are compiled out of release builds.

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

use crate::entity::Entity;

/// A `Result` specialized to [`EcsError`].
pub type Result<T> = std::result::Result<T, EcsError>;

/// The error type for this crate.
#[derive(Debug)]
pub enum EcsError {
    /// A component type was used before `register_type::<T>` (implicit or explicit)
    /// ever ran.
    UnrecognizedComponentType,
    /// An `Entity` was passed to an operation that requires it to be currently alive.
    InvalidEntity(Entity),
    /// `get`/`remove` was called for a component type the entity does not currently own.
    ComponentAbsent,
    /// A query iterator was advanced past its snapshot bound.
    IteratorOverrun,
    /// A pool's iterate-lock (soft-remove mode) was toggled into a state it was already in.
    LockStateError,
    /// A [`crate::registry::Handle`] was dereferenced with no backing pool.
    NullHandleDeref,
    /// `register_type::<T>` was called for a type that already has a pool.
    DuplicateRegistration,
    /// A 65th distinct component type was registered; `MAX_COMPONENT_TYPES` is 64.
    TooManyComponentTypes,
    /// An internal invariant was violated; indicates a bug in this crate.
    AssertionFailure(&'static str),
}

impl Display for EcsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::UnrecognizedComponentType => {
                write!(f, "component type was never registered")
            }
            EcsError::InvalidEntity(e) => write!(f, "entity {:?} is not valid", e),
            EcsError::ComponentAbsent => write!(f, "entity does not own this component"),
            EcsError::IteratorOverrun => write!(f, "query iterator advanced past its snapshot"),
            EcsError::LockStateError => write!(f, "pool iterate-lock toggled while already in that state"),
            EcsError::NullHandleDeref => write!(f, "dereferenced a handle with no backing pool"),
            EcsError::DuplicateRegistration => write!(f, "component type was already registered"),
            EcsError::TooManyComponentTypes => {
                write!(f, "exceeded MAX_COMPONENT_TYPES (64) distinct component types")
            }
            EcsError::AssertionFailure(what) => write!(f, "internal invariant violated: {}", what),
        }
    }
}

impl StdError for EcsError {}
