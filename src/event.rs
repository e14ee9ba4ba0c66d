//! The event bus: typed publish/subscribe with cancellable subscriptions.
//!
//! Dispatch uses a check-out/check-in discipline on each callback slot — the callback is taken
//! out of its `RefCell`-guarded table before being invoked, so a subscriber can freely
//! subscribe, unsubscribe, or emit further events from within its own callback without
//! triggering a reentrant-borrow panic. Subscription slots are generational, the same idiom
//! [`crate::entity`] uses for entity indices, so a `Subscription` can never refer to a slot that
//! has since been recycled for an unrelated subscriber.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::entity::Entity;

/// Emitted by [`crate::manager::EntityManager::destroy`] immediately before the entity's
/// components are torn down.
#[derive(Clone, Copy, Debug)]
pub struct EntityDestroyed;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct SlotId {
    index: usize,
    generation: u32,
}

struct Slot<F> {
    callback: Option<F>,
    active: bool,
    checked_out: bool,
    generation: u32,
}

pub(crate) struct SignalTable<F> {
    slots: Vec<Slot<F>>,
    free_list: Vec<usize>,
}

impl<F> SignalTable<F> {
    fn new() -> Self {
        SignalTable { slots: Vec::new(), free_list: Vec::new() }
    }

    fn insert(&mut self, f: F) -> SlotId {
        if let Some(i) = self.free_list.pop() {
            let slot = &mut self.slots[i];
            debug_assert!(!slot.active);
            slot.callback = Some(f);
            slot.active = true;
            SlotId { index: i, generation: slot.generation }
        } else {
            let i = self.slots.len();
            self.slots.push(Slot { callback: Some(f), active: true, checked_out: false, generation: 0 });
            SlotId { index: i, generation: 0 }
        }
    }

    fn deactivate(&mut self, slot: SlotId) {
        match self.slots.get_mut(slot.index) {
            Some(s) if s.generation == slot.generation && s.active => {
                s.active = false;
                if !s.checked_out {
                    s.callback = None;
                    s.generation = s.generation.wrapping_add(1);
                    self.free_list.push(slot.index);
                }
                // If checked out, the in-flight `dispatch` call finalizes the removal when it
                // checks the callback back in.
            }
            _ => {
                log::trace!("unsubscribe on an already-inactive or stale subscription slot");
            }
        }
    }

    fn is_active(&self, slot: SlotId) -> bool {
        self.slots
            .get(slot.index)
            .map_or(false, |s| s.generation == slot.generation && s.active)
    }
}

impl<F> SignalTable<F> {
    /// Invokes `invoke` once for every currently-active slot, in slot order, using the
    /// check-out/check-in discipline described at module level.
    pub(crate) fn dispatch(this: &Rc<RefCell<SignalTable<F>>>, mut invoke: impl FnMut(&mut F)) {
        let len = this.borrow().slots.len();
        for i in 0..len {
            let taken = {
                let mut table = this.borrow_mut();
                let slot = &mut table.slots[i];
                if !slot.active || slot.checked_out {
                    None
                } else {
                    slot.checked_out = true;
                    slot.callback.take()
                }
            };
            let mut callback = match taken {
                Some(f) => f,
                None => continue,
            };

            invoke(&mut callback);

            let mut table = this.borrow_mut();
            let still_active;
            {
                let slot = &mut table.slots[i];
                slot.checked_out = false;
                still_active = slot.active;
                if still_active {
                    slot.callback = Some(callback);
                } else {
                    slot.generation = slot.generation.wrapping_add(1);
                }
            }
            if !still_active {
                table.free_list.push(i);
            }
        }
    }
}

trait SignalTableHandle {
    fn unsubscribe(&self, slot: SlotId);
    fn is_active(&self, slot: SlotId) -> bool;
}

impl<F> SignalTableHandle for RefCell<SignalTable<F>> {
    fn unsubscribe(&self, slot: SlotId) {
        self.borrow_mut().deactivate(slot);
    }

    fn is_active(&self, slot: SlotId) -> bool {
        self.borrow().is_active(slot)
    }
}

/// A cancellable registration of a callback with the event bus.
///
/// A `Subscription` is self-sufficient: cancelling it does not require going back through the
/// `EntityManager` it came from, mirroring the independence of the original `boost::signals2`
/// connection handle it is grounded on.
#[derive(Clone)]
pub struct Subscription {
    table: Rc<dyn SignalTableHandle>,
    slot: SlotId,
}

impl Subscription {
    /// Cancels this subscription. A no-op if already inactive.
    pub fn unsubscribe(&self) {
        self.table.unsubscribe(self.slot);
    }

    /// `true` iff this subscription has not been cancelled.
    pub fn is_active(&self) -> bool {
        self.table.is_active(self.slot)
    }
}

pub(crate) type EntityCallback = Box<dyn FnMut(Entity, &dyn Any)>;
pub(crate) type PlainCallback = Box<dyn FnMut(&dyn Any)>;

/// Type-indexed tables of subscribers, global and per-entity.
pub(crate) struct EventBus {
    global_entity: AHashMap<TypeId, Rc<RefCell<SignalTable<EntityCallback>>>>,
    global_plain: AHashMap<TypeId, Rc<RefCell<SignalTable<PlainCallback>>>>,
    per_entity: AHashMap<Entity, AHashMap<TypeId, Rc<RefCell<SignalTable<EntityCallback>>>>>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        EventBus {
            global_entity: AHashMap::default(),
            global_plain: AHashMap::default(),
            per_entity: AHashMap::default(),
        }
    }

    pub(crate) fn subscribe<E: 'static>(
        &mut self,
        mut cb: impl FnMut(Entity, &E) + 'static,
    ) -> Subscription {
        let table = self
            .global_entity
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Rc::new(RefCell::new(SignalTable::new())))
            .clone();
        let boxed: EntityCallback = Box::new(move |e, any| {
            cb(e, any.downcast_ref::<E>().expect("event payload type mismatch"));
        });
        let slot = table.borrow_mut().insert(boxed);
        Subscription { table, slot }
    }

    pub(crate) fn subscribe_global<E: 'static>(
        &mut self,
        mut cb: impl FnMut(&E) + 'static,
    ) -> Subscription {
        let table = self
            .global_plain
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Rc::new(RefCell::new(SignalTable::new())))
            .clone();
        let boxed: PlainCallback = Box::new(move |any| {
            cb(any.downcast_ref::<E>().expect("event payload type mismatch"));
        });
        let slot = table.borrow_mut().insert(boxed);
        Subscription { table, slot }
    }

    pub(crate) fn subscribe_entity<E: 'static>(
        &mut self,
        id: Entity,
        mut cb: impl FnMut(Entity, &E) + 'static,
    ) -> Subscription {
        let table = self
            .per_entity
            .entry(id)
            .or_default()
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Rc::new(RefCell::new(SignalTable::new())))
            .clone();
        let boxed: EntityCallback = Box::new(move |e, any| {
            cb(e, any.downcast_ref::<E>().expect("event payload type mismatch"));
        });
        let slot = table.borrow_mut().insert(boxed);
        Subscription { table, slot }
    }

    /// Global entity-scoped subscribers fire first, then per-entity subscribers for `id`.
    pub(crate) fn emit<E: 'static>(&self, id: Entity, event: &E) {
        if let Some(table) = self.global_entity.get(&TypeId::of::<E>()) {
            SignalTable::dispatch(table, |f| f(id, event));
        }
        if let Some(by_type) = self.per_entity.get(&id) {
            if let Some(table) = by_type.get(&TypeId::of::<E>()) {
                SignalTable::dispatch(table, |f| f(id, event));
            }
        }
    }

    pub(crate) fn emit_global<E: 'static>(&self, event: &E) {
        if let Some(table) = self.global_plain.get(&TypeId::of::<E>()) {
            SignalTable::dispatch(table, |f| f(event));
        }
    }

    /// Drops every per-entity subscription table for `id`. Called when the entity is destroyed.
    pub(crate) fn drop_entity(&mut self, id: Entity) {
        self.per_entity.remove(&id);
    }

    /// Clones out the (global, per-entity) signal tables for `E`/`id`, if they exist.
    ///
    /// Used by [`crate::manager::EntityManager::emit`], which must release its borrow of the
    /// manager's inner state *before* invoking any subscriber — cloning the `Rc` here (cheap,
    /// no dispatch) lets the caller drop that borrow first and dispatch against the owned
    /// clones afterwards.
    pub(crate) fn entity_event_tables<E: 'static>(
        &self,
        id: Entity,
    ) -> (
        Option<Rc<RefCell<SignalTable<EntityCallback>>>>,
        Option<Rc<RefCell<SignalTable<EntityCallback>>>>,
    ) {
        let global = self.global_entity.get(&TypeId::of::<E>()).cloned();
        let scoped = self
            .per_entity
            .get(&id)
            .and_then(|by_type| by_type.get(&TypeId::of::<E>()))
            .cloned();
        (global, scoped)
    }

    /// Same idea as [`EventBus::entity_event_tables`], for the entity-free topic.
    pub(crate) fn plain_event_table<E: 'static>(&self) -> Option<Rc<RefCell<SignalTable<PlainCallback>>>> {
        self.global_plain.get(&TypeId::of::<E>()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc as StdRc;

    fn ent(i: crate::entity::Index) -> Entity {
        Entity::pack(i, 0)
    }

    #[test]
    fn global_subscribers_fire_in_order() {
        let mut bus = EventBus::new();
        let order = StdRc::new(RefCell::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        let _s1 = bus.subscribe::<u32>(move |_e, _v| o1.borrow_mut().push(1));
        let _s2 = bus.subscribe::<u32>(move |_e, _v| o2.borrow_mut().push(2));
        bus.emit(ent(1), &7u32);
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn unsubscribe_during_dispatch_still_calls_remaining() {
        let mut bus = EventBus::new();
        let calls = StdRc::new(Cell::new(0));
        let c1 = calls.clone();
        let c2 = calls.clone();
        let sub_holder: StdRc<RefCell<Option<Subscription>>> = StdRc::new(RefCell::new(None));
        let holder_for_cb = sub_holder.clone();
        let s1 = bus.subscribe::<bool>(move |_e, _v| {
            c1.set(c1.get() + 1);
            if let Some(s) = holder_for_cb.borrow().as_ref() {
                s.unsubscribe();
            }
        });
        *sub_holder.borrow_mut() = Some(s1.clone());
        let _s2 = bus.subscribe::<bool>(move |_e, _v| c2.set(c2.get() + 1));

        bus.emit(ent(1), &true);
        assert_eq!(calls.get(), 2, "both subscribers should fire exactly once");
        assert!(!s1.is_active());
    }

    #[test]
    fn entity_scoped_subscription_only_fires_for_its_entity() {
        let mut bus = EventBus::new();
        let calls = StdRc::new(Cell::new(0));
        let c = calls.clone();
        let target = ent(5);
        let _s = bus.subscribe_entity::<u8>(target, move |_e, _v| c.set(c.get() + 1));
        bus.emit(ent(6), &1u8);
        assert_eq!(calls.get(), 0);
        bus.emit(target, &1u8);
        assert_eq!(calls.get(), 1);
    }
}
