#![deny(missing_docs)]

//! # packed-ecs
//!
//! A single-threaded, synchronous Entity-Component-System core: a generational entity
//! allocator, densely-packed per-type component storage, masked multi-component queries, and a
//! typed event bus with cancellable subscriptions.
//!
//! ```
//! use packed_ecs::EntityManager;
//!
//! struct Position { x: f32, y: f32 }
//!
//! let world = EntityManager::new();
//! let e = world.new_entity();
//! world.assign(e, Position { x: 0.0, y: 0.0 }).unwrap();
//! assert!(world.has::<Position>(e).unwrap());
//! ```
//!
//! Components are plain Rust values; there is no derive macro and no reflection beyond the
//! `std::any::TypeId` used to key each component's storage. Persistence, serialization,
//! multi-threaded dispatch, and archetype reorganization are out of scope — see each module's
//! documentation for what is and is not provided.

mod entity;
mod error;
mod event;
mod manager;
mod mask;
mod pool;
mod query;
mod registry;

pub use entity::{Entity, Index, INDEX_BITS};
pub use error::{EcsError, Result};
pub use event::{EntityDestroyed, Subscription};
pub use manager::{EntityManager, EntityRef, DEFAULT_RECYCLE_THRESHOLD};
pub use mask::{ComponentMask, MAX_COMPONENT_TYPES};
pub use query::EntityCollection;
pub use registry::Handle;
