//! Component type registration and per-entity component dispatch.
//!
//! The registry maps each distinct Rust component type to a dense type-index (and a
//! [`crate::pool::ComponentPool`] at that index, type-erased behind `Box<dyn AnyPool>`), and
//! keeps a [`ComponentMask`] per entity recording which types it currently owns.

use std::any::TypeId;
use std::cell::Ref;

use ahash::AHashMap;

use crate::entity::{Entity, Index};
use crate::error::{EcsError, Result};
use crate::mask::{ComponentMask, MAX_COMPONENT_TYPES};
use crate::pool::{AnyPool, ComponentPool};

pub(crate) struct ComponentRegistry {
    pools: Vec<Box<dyn AnyPool>>,
    type_to_index: AHashMap<TypeId, usize>,
    masks_by_ent_index: Vec<ComponentMask>,
}

impl ComponentRegistry {
    pub(crate) fn new() -> Self {
        ComponentRegistry {
            pools: Vec::new(),
            type_to_index: AHashMap::default(),
            masks_by_ent_index: Vec::new(),
        }
    }

    /// Grows per-entity bookkeeping to cover `index`, called whenever the manager mints a new
    /// entity index.
    pub(crate) fn ensure_entity(&mut self, index: Index) {
        if self.masks_by_ent_index.len() <= index as usize {
            self.masks_by_ent_index.resize(index as usize + 1, ComponentMask::EMPTY);
        }
    }

    pub(crate) fn mask_of(&self, index: Index) -> ComponentMask {
        self.masks_by_ent_index.get(index as usize).copied().unwrap_or(ComponentMask::EMPTY)
    }

    pub(crate) fn clear_mask(&mut self, index: Index) {
        if let Some(m) = self.masks_by_ent_index.get_mut(index as usize) {
            *m = ComponentMask::EMPTY;
        }
    }

    pub(crate) fn register_type<T: 'static>(&mut self) -> Result<usize> {
        if self.type_to_index.contains_key(&TypeId::of::<T>()) {
            return Err(EcsError::DuplicateRegistration);
        }
        self.register_type_if_absent::<T>()
    }

    fn register_type_if_absent<T: 'static>(&mut self) -> Result<usize> {
        if let Some(&idx) = self.type_to_index.get(&TypeId::of::<T>()) {
            return Ok(idx);
        }
        if self.pools.len() >= MAX_COMPONENT_TYPES {
            return Err(EcsError::TooManyComponentTypes);
        }
        let idx = self.pools.len();
        self.pools.push(Box::new(ComponentPool::<T>::new()));
        self.type_to_index.insert(TypeId::of::<T>(), idx);
        Ok(idx)
    }

    fn type_index<T: 'static>(&self) -> Result<usize> {
        self.type_to_index
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or(EcsError::UnrecognizedComponentType)
    }

    fn pool<T: 'static>(&self) -> Option<&ComponentPool<T>> {
        let idx = *self.type_to_index.get(&TypeId::of::<T>())?;
        self.pools[idx].as_any().downcast_ref()
    }

    fn pool_mut<T: 'static>(&mut self, idx: usize) -> &mut ComponentPool<T> {
        self.pools[idx]
            .as_any_mut()
            .downcast_mut()
            .expect("type index points at a pool of the wrong concrete type")
    }

    pub(crate) fn assign<T: 'static>(&mut self, e: Entity, value: T) -> Result<&mut T> {
        let idx = self.register_type_if_absent::<T>()?;
        self.masks_by_ent_index[e.index() as usize].set(idx);
        log::trace!("assigned {} to entity index={}", std::any::type_name::<T>(), e.index());
        Ok(self.pool_mut::<T>(idx).assign(e, value))
    }

    pub(crate) fn has<T: 'static>(&self, e: Entity) -> Result<bool> {
        let idx = self.type_index::<T>()?;
        Ok(self.masks_by_ent_index[e.index() as usize].get(idx))
    }

    /// Returns a live borrow projected down to the pool backing `T`, for
    /// [`crate::registry::Handle`] to dereference through.
    pub(crate) fn try_pool<T: 'static>(
        registry_ref: Ref<'_, ComponentRegistry>,
    ) -> std::result::Result<Ref<'_, ComponentPool<T>>, Ref<'_, ComponentRegistry>> {
        Ref::filter_map(registry_ref, |r| r.pool::<T>())
    }

    pub(crate) fn remove<T: 'static>(&mut self, e: Entity) -> Result<()> {
        let idx = self.type_index::<T>()?;
        self.pool_mut::<T>(idx).remove(e)?;
        self.masks_by_ent_index[e.index() as usize].clear(idx);
        log::trace!("removed {} from entity index={}", std::any::type_name::<T>(), e.index());
        Ok(())
    }

    pub(crate) fn get_mut<T: 'static>(&mut self, e: Entity) -> Result<&mut T> {
        let idx = self.type_index::<T>()?;
        self.pool_mut::<T>(idx).get_mut(e).ok_or(EcsError::ComponentAbsent)
    }

    pub(crate) fn remove_all(&mut self, e: Entity) {
        let mask = self.mask_of(e.index());
        for idx in mask.bits() {
            // Entity is guaranteed present in this pool because its mask bit is set; a missing
            // component here would mean the mask and pool had already diverged.
            self.pools[idx].remove(e).expect("mask/pool desync during remove_all");
        }
        self.clear_mask(e.index());
    }

    /// Builds the single-type mask for `T`. Fails with [`EcsError::UnrecognizedComponentType`]
    /// if `T` has never been registered (via `register_type` or a prior `assign`) — unlike
    /// `assign`, this never registers a type on the caller's behalf.
    pub(crate) fn create_mask<T: 'static>(&self) -> Result<ComponentMask> {
        let idx = self.type_index::<T>()?;
        Ok(ComponentMask::with_bit(idx))
    }

    /// Driving pool for a masked query: the smallest pool among those whose bit is set,
    /// ties broken by lowest type index. Returns `None` for an empty or unregistered mask.
    pub(crate) fn smallest_pool_for(&self, mask: ComponentMask) -> Option<usize> {
        mask.bits()
            .filter(|&idx| idx < self.pools.len())
            .min_by_key(|&idx| self.pools[idx].size())
    }

    pub(crate) fn pool_any(&self, idx: usize) -> &dyn AnyPool {
        self.pools[idx].as_ref()
    }

    pub(crate) fn pool_any_mut(&mut self, idx: usize) -> &mut dyn AnyPool {
        self.pools[idx].as_mut()
    }
}

/// A revalidating reference to a single entity's `T` component.
///
/// Holding a `Handle` keeps a live borrow of the whole manager's inner state; any attempt to
/// mutate the manager while a `Handle` is alive panics via `RefCell`'s own aliasing check,
/// rather than silently invalidating the reference the way a raw cached pointer would.
pub struct Handle<'a, T> {
    pub(crate) entity: Entity,
    pub(crate) pool: Ref<'a, ComponentPool<T>>,
}

impl<'a, T: 'static> Handle<'a, T> {
    /// Dereferences the handle, failing with [`EcsError::ComponentAbsent`] if the entity no
    /// longer owns this component.
    pub fn get(&self) -> Result<&T> {
        self.pool.get(self.entity).ok_or(EcsError::ComponentAbsent)
    }
}
