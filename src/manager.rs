//! The entity manager: lifecycle orchestration tying together the component registry, masked
//! queries, and the event bus.

use std::cell::{Ref, RefCell};
use std::collections::VecDeque;

use crate::entity::{Entity, Index, Raw, GEN_MASK};
use crate::error::{EcsError, Result};
use crate::event::{EntityDestroyed, EventBus, SignalTable};
use crate::mask::ComponentMask;
use crate::query::EntityCollection;
use crate::registry::{ComponentRegistry, Handle};

/// Below this many free indices, `new_entity` mints a fresh index rather than recycling one;
/// above it, recycling is preferred. Spreads generation churn across the index space rather
/// than concentrating it on a handful of slots. See [`EntityManager::with_recycle_threshold`].
pub const DEFAULT_RECYCLE_THRESHOLD: usize = 2048;

struct ManagerInner {
    gen_by_index: Vec<Raw>,
    alive_by_index: Vec<bool>,
    free_queue: VecDeque<Index>,
    next_index: Index,
    recycle_threshold: usize,
    registry: ComponentRegistry,
    events: EventBus,
}

impl ManagerInner {
    fn new(recycle_threshold: usize) -> Self {
        let mut registry = ComponentRegistry::new();
        // Index 0 is reserved for Entity::NULL and is never issued.
        registry.ensure_entity(0);
        ManagerInner {
            gen_by_index: vec![0],
            alive_by_index: vec![false],
            free_queue: VecDeque::new(),
            next_index: 1,
            recycle_threshold,
            registry,
            events: EventBus::new(),
        }
    }
}

/// Owns every entity, component, and subscription in one ECS world.
///
/// All public methods take `&self`: interior mutability is provided by a single `RefCell`
/// guarding the manager's state. Methods that dispatch user callbacks (`emit`, `emit_global`)
/// release that borrow before invoking any subscriber, so callbacks may freely call back into
/// the same manager — create or destroy entities, assign or remove components, subscribe or
/// unsubscribe — without triggering a reentrant-borrow panic. Every other method performs its
/// own bookkeeping in one short borrow and never holds it across a callback or across a loop
/// iteration driven by the caller (see [`crate::query::EntityCollection`]).
pub struct EntityManager {
    inner: RefCell<ManagerInner>,
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityManager {
    /// Creates a manager with the default recycle threshold
    /// ([`DEFAULT_RECYCLE_THRESHOLD`]).
    pub fn new() -> Self {
        Self::with_recycle_threshold(DEFAULT_RECYCLE_THRESHOLD)
    }

    /// Creates a manager that only recycles a destroyed entity's index once at least
    /// `threshold` indices are queued for reuse.
    pub fn with_recycle_threshold(threshold: usize) -> Self {
        EntityManager { inner: RefCell::new(ManagerInner::new(threshold)) }
    }

    // ---- entity lifecycle ----------------------------------------------------------------

    /// Allocates a new entity, recycling a previously-destroyed index once the free queue is
    /// at least `recycle_threshold` deep.
    pub fn new_entity(&self) -> Entity {
        let mut inner = self.inner.borrow_mut();
        let index = if inner.free_queue.len() >= inner.recycle_threshold {
            let i = inner.free_queue.pop_front().expect("free_queue checked non-empty above");
            debug_assert!(
                inner.registry.mask_of(i).is_empty(),
                "recycled entity index still has components assigned"
            );
            i
        } else {
            let i = inner.next_index;
            inner.next_index += 1;
            inner.gen_by_index.push(0);
            inner.alive_by_index.push(false);
            inner.registry.ensure_entity(i);
            i
        };
        inner.alive_by_index[index as usize] = true;
        let generation = inner.gen_by_index[index as usize];
        log::trace!("allocated entity index={index} generation={generation}");
        Entity::pack(index, generation)
    }

    /// `true` iff `e` refers to a currently-alive entity.
    pub fn valid(&self, e: Entity) -> bool {
        if e.is_null() {
            return false;
        }
        let inner = self.inner.borrow();
        match inner.alive_by_index.get(e.index() as usize) {
            Some(&alive) => alive && inner.gen_by_index[e.index() as usize] == e.generation(),
            None => false,
        }
    }

    /// Destroys `e`: emits [`EntityDestroyed`] for it, disconnects its per-entity
    /// subscriptions, removes every component it owns, and bumps its generation so existing
    /// copies of `e` become invalid.
    pub fn destroy(&self, e: Entity) -> Result<()> {
        if !self.valid(e) {
            return Err(EcsError::InvalidEntity(e));
        }

        self.emit(e, &EntityDestroyed);

        let mut inner = self.inner.borrow_mut();
        inner.events.drop_entity(e);
        inner.registry.remove_all(e);
        let idx = e.index() as usize;
        inner.gen_by_index[idx] = inner.gen_by_index[idx].wrapping_add(1) & GEN_MASK;
        inner.alive_by_index[idx] = false;
        inner.free_queue.push_back(e.index());
        log::debug!("destroyed entity {e:?}");
        Ok(())
    }

    /// Destroys every currently-alive entity, in increasing index order.
    pub fn destroy_all(&self) {
        let alive: Vec<Entity> = {
            let inner = self.inner.borrow();
            inner
                .alive_by_index
                .iter()
                .enumerate()
                .filter(|&(_, &alive)| alive)
                .map(|(idx, _)| Entity::pack(idx as Index, inner.gen_by_index[idx]))
                .collect()
        };
        for e in alive {
            self.destroy(e).expect("entity snapshotted as alive above");
        }
    }

    // ---- components -------------------------------------------------------------------------

    /// Registers `T` as a component type. Implicitly performed by the first `assign::<T>` if
    /// skipped; call this directly to get [`EcsError::DuplicateRegistration`] on a conflicting
    /// second registration instead of silently reusing the existing pool.
    pub fn register_type<T: 'static>(&self) -> Result<()> {
        self.inner.borrow_mut().registry.register_type::<T>()?;
        Ok(())
    }

    /// Assigns (or overwrites) entity `e`'s `T` component.
    pub fn assign<T: 'static>(&self, e: Entity, value: T) -> Result<()> {
        if !self.valid(e) {
            return Err(EcsError::InvalidEntity(e));
        }
        self.inner.borrow_mut().registry.assign(e, value)?;
        Ok(())
    }

    /// `true` iff `e` currently owns a `T` component.
    pub fn has<T: 'static>(&self, e: Entity) -> Result<bool> {
        self.inner.borrow().registry.has::<T>(e)
    }

    /// Borrows entity `e`'s `T` component through a revalidating [`Handle`]. Fails eagerly with
    /// [`EcsError::ComponentAbsent`] if `e` does not currently own a `T`, rather than deferring
    /// the check to [`Handle::get`].
    pub fn get<T: 'static>(&self, e: Entity) -> Result<Handle<'_, T>> {
        let inner = self.inner.borrow();
        if !inner.registry.has::<T>(e)? {
            return Err(EcsError::ComponentAbsent);
        }
        match ComponentRegistry::try_pool::<T>(Ref::map(inner, |i| &i.registry)) {
            Ok(pool) => Ok(Handle { entity: e, pool }),
            Err(_) => Err(EcsError::UnrecognizedComponentType),
        }
    }

    /// Mutates entity `e`'s `T` component in place, returning whatever `f` returns.
    pub fn mutate<T: 'static, R>(&self, e: Entity, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut inner = self.inner.borrow_mut();
        let component = inner.registry.get_mut::<T>(e)?;
        Ok(f(component))
    }

    /// Removes entity `e`'s `T` component.
    pub fn remove<T: 'static>(&self, e: Entity) -> Result<()> {
        self.inner.borrow_mut().registry.remove::<T>(e)
    }

    /// Removes every component `e` owns, leaving it alive with an empty mask.
    pub fn remove_all(&self, e: Entity) {
        self.inner.borrow_mut().registry.remove_all(e);
    }

    /// Builds the single-type mask for `T`. Fails with [`EcsError::UnrecognizedComponentType`] if
    /// `T` has never been registered — unlike `assign`, this never registers a type on the
    /// caller's behalf. Combine with `|` to build a multi-type mask for
    /// [`EntityManager::entities_with`].
    pub fn create_mask<T: 'static>(&self) -> Result<ComponentMask> {
        self.inner.borrow().registry.create_mask::<T>()
    }

    /// Queries every entity owning every component type named by `mask`.
    pub fn entities_with(&self, mask: ComponentMask) -> EntityCollection<'_> {
        EntityCollection::new(self, mask)
    }

    pub(crate) fn lock_driving_pool(&self, mask: ComponentMask) -> (Option<usize>, usize) {
        let mut inner = self.inner.borrow_mut();
        match inner.registry.smallest_pool_for(mask) {
            Some(idx) => {
                let pool = inner.registry.pool_any_mut(idx);
                pool.iterate_lock().expect("driving pool already under an iterate-lock");
                let end = pool.size();
                (Some(idx), end)
            }
            None => (None, 0),
        }
    }

    pub(crate) fn unlock_driving_pool(&self, idx: usize) {
        self.inner.borrow_mut().registry.pool_any_mut(idx).release_lock();
    }

    pub(crate) fn candidate_at(&self, pool_idx: usize, slot: usize, mask: ComponentMask) -> Option<Entity> {
        let inner = self.inner.borrow();
        let e = inner.registry.pool_any(pool_idx).entity_at(slot);
        if e.is_null() {
            return None;
        }
        if inner.registry.mask_of(e.index()).contains(mask) {
            Some(e)
        } else {
            None
        }
    }

    // ---- events -------------------------------------------------------------------------

    /// Subscribes to every `E` emitted for any entity.
    pub fn subscribe<E: 'static>(&self, cb: impl FnMut(Entity, &E) + 'static) -> crate::event::Subscription {
        self.inner.borrow_mut().events.subscribe(cb)
    }

    /// Subscribes to every entity-free `E`, emitted via [`EntityManager::emit_global`].
    pub fn subscribe_global<E: 'static>(&self, cb: impl FnMut(&E) + 'static) -> crate::event::Subscription {
        self.inner.borrow_mut().events.subscribe_global(cb)
    }

    /// Subscribes to `E` emitted specifically for `id`. Disconnected automatically when `id`
    /// is destroyed.
    pub fn subscribe_entity<E: 'static>(
        &self,
        id: Entity,
        cb: impl FnMut(Entity, &E) + 'static,
    ) -> crate::event::Subscription {
        self.inner.borrow_mut().events.subscribe_entity(id, cb)
    }

    /// Emits `event` for `id`: global subscribers first, then `id`'s own subscribers, in
    /// registration order. Releases its borrow of the manager before invoking any subscriber,
    /// so subscribers may freely call back into this manager.
    pub fn emit<E: 'static>(&self, id: Entity, event: &E) {
        log::trace!("emitting {} for entity index={}", std::any::type_name::<E>(), id.index());
        let (global, scoped) = {
            let inner = self.inner.borrow();
            inner.events.entity_event_tables::<E>(id)
        };
        if let Some(table) = global {
            SignalTable::dispatch(&table, |f| f(id, event));
        }
        if let Some(table) = scoped {
            SignalTable::dispatch(&table, |f| f(id, event));
        }
    }

    /// Emits `event` to every entity-free subscriber of `E`.
    pub fn emit_global<E: 'static>(&self, event: &E) {
        log::trace!("emitting global {}", std::any::type_name::<E>());
        let table = {
            let inner = self.inner.borrow();
            inner.events.plain_event_table::<E>()
        };
        if let Some(table) = table {
            SignalTable::dispatch(&table, |f| f(event));
        }
    }
}

/// A borrowed `(manager, entity)` pair giving ergonomic method-call syntax over
/// [`EntityManager`]'s entity-scoped operations, without `Entity` itself carrying a reference
/// back to its manager.
#[derive(Clone, Copy)]
pub struct EntityRef<'a> {
    manager: &'a EntityManager,
    entity: Entity,
}

impl<'a> EntityRef<'a> {
    /// Pairs `entity` with the manager that (presumably) owns it.
    pub fn new(manager: &'a EntityManager, entity: Entity) -> Self {
        EntityRef { manager, entity }
    }

    /// The wrapped entity.
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// See [`EntityManager::valid`].
    pub fn is_valid(&self) -> bool {
        self.manager.valid(self.entity)
    }

    /// See [`EntityManager::assign`].
    pub fn assign<T: 'static>(&self, value: T) -> Result<()> {
        self.manager.assign(self.entity, value)
    }

    /// See [`EntityManager::has`].
    pub fn has<T: 'static>(&self) -> Result<bool> {
        self.manager.has::<T>(self.entity)
    }

    /// See [`EntityManager::get`].
    pub fn get<T: 'static>(&self) -> Result<Handle<'a, T>> {
        self.manager.get::<T>(self.entity)
    }

    /// See [`EntityManager::mutate`].
    pub fn mutate<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        self.manager.mutate::<T, R>(self.entity, f)
    }

    /// See [`EntityManager::remove`].
    pub fn remove<T: 'static>(&self) -> Result<()> {
        self.manager.remove::<T>(self.entity)
    }

    /// See [`EntityManager::destroy`].
    pub fn destroy(&self) -> Result<()> {
        self.manager.destroy(self.entity)
    }

    /// See [`EntityManager::emit`].
    pub fn emit<E: 'static>(&self, event: &E) {
        self.manager.emit(self.entity, event)
    }

    /// See [`EntityManager::subscribe_entity`].
    pub fn subscribe<E: 'static>(&self, cb: impl FnMut(Entity, &E) + 'static) -> crate::event::Subscription {
        self.manager.subscribe_entity(self.entity, cb)
    }
}
