//! Entity identifiers: a generational index packed into a single integer.
//!
//! An `Entity` carries no reference back to the manager that issued it — see
//! [`crate::manager::EntityRef`] for a borrowed convenience wrapper that pairs an `Entity`
//! with its owning [`crate::manager::EntityManager`].

use std::fmt;

#[cfg(not(feature = "compact-ids"))]
mod width {
    pub type Raw = u64;
    pub const INDEX_BITS: u32 = 48;
    pub const GEN_BITS: u32 = 16;
}

#[cfg(feature = "compact-ids")]
mod width {
    pub type Raw = u32;
    pub const INDEX_BITS: u32 = 22;
    pub const GEN_BITS: u32 = 10;
}

pub(crate) use self::width::Raw;

/// Number of bits dedicated to the index portion of an [`Entity`].
pub const INDEX_BITS: u32 = width::INDEX_BITS;
const INDEX_MASK: Raw = (1 << INDEX_BITS) - 1;
pub(crate) const GEN_MASK: Raw = (1 << width::GEN_BITS) - 1;

/// Index into entity-indexed arrays (`gen_by_index`, `masks_by_ent_index`, pool `ent_to_slot`s).
pub type Index = Raw;

/// An opaque, `Copy` handle to a row in an [`crate::manager::EntityManager`].
///
/// The all-zero value is reserved as [`Entity::NULL`]; index `0` is never issued to user code.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Entity(Raw);

impl Entity {
    /// The reserved null entity. `EntityManager::valid` always returns `false` for it.
    pub const NULL: Entity = Entity(0);

    #[inline]
    pub(crate) fn pack(index: Index, generation: Raw) -> Entity {
        debug_assert!(index <= INDEX_MASK, "entity index exceeds INDEX_BITS");
        Entity(((generation & GEN_MASK) << INDEX_BITS) | (index & INDEX_MASK))
    }

    /// The index portion of this id, suitable for indexing entity-parallel arrays.
    #[inline]
    pub fn index(&self) -> Index {
        self.0 & INDEX_MASK
    }

    /// The generation portion of this id.
    #[inline]
    pub(crate) fn generation(&self) -> Raw {
        (self.0 >> INDEX_BITS) & GEN_MASK
    }

    /// `true` iff this is the reserved null entity.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Entity {
    fn default() -> Self {
        Entity::NULL
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("index", &self.index())
            .field("generation", &self.generation())
            .finish()
    }
}
