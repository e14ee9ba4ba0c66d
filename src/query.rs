//! Masked multi-component queries.
//!
//! [`EntityManager::entities_with`] picks the smallest registered pool among those named by the
//! mask and drives iteration from it, filtering by the full mask as it goes — grounded directly
//! on the original `EntitiesWith` smallest-pool scan. The iterate-lock is released via `Drop` so
//! it is freed on every exit path, including an early `break` or a panic unwinding through the
//! loop body.

use crate::entity::Entity;
use crate::manager::EntityManager;
use crate::mask::ComponentMask;

/// A snapshot-stable, single-pass iterator over the entities owning every component type
/// named by a mask at the moment [`EntityManager::entities_with`] was called.
///
/// Each step takes only a brief borrow of the manager's inner state — it is safe to create,
/// destroy, or mutate entities and components from within the loop body driving this iterator.
pub struct EntityCollection<'a> {
    manager: &'a EntityManager,
    pool_idx: Option<usize>,
    mask: ComponentMask,
    next: usize,
    end: usize,
}

impl<'a> EntityCollection<'a> {
    pub(crate) fn new(manager: &'a EntityManager, mask: ComponentMask) -> Self {
        let (pool_idx, end) = manager.lock_driving_pool(mask);
        EntityCollection { manager, pool_idx, mask, next: 0, end }
    }
}

impl<'a> Iterator for EntityCollection<'a> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        let pool_idx = self.pool_idx?;
        while self.next < self.end {
            let slot = self.next;
            self.next += 1;
            if let Some(e) = self.manager.candidate_at(pool_idx, slot, self.mask) {
                return Some(e);
            }
        }
        None
    }
}

impl<'a> Drop for EntityCollection<'a> {
    fn drop(&mut self) {
        if let Some(idx) = self.pool_idx {
            self.manager.unlock_driving_pool(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::manager::EntityManager;

    struct A10(#[allow(dead_code)] u32);
    struct A30(#[allow(dead_code)] u32);
    struct A60(#[allow(dead_code)] u32);
    struct A90(#[allow(dead_code)] u32);

    #[test]
    fn find_all_three() {
        let mgr = EntityManager::new();
        for _ in 0..1_000 {
            let e = mgr.new_entity();
            mgr.assign(e, A10(1)).unwrap();
            mgr.assign(e, A30(1)).unwrap();
            mgr.assign(e, A60(1)).unwrap();
        }
        let mask = mgr.create_mask::<A10>().unwrap()
            | mgr.create_mask::<A30>().unwrap()
            | mgr.create_mask::<A60>().unwrap();
        assert_eq!(mgr.entities_with(mask).count(), 1_000);
    }

    #[test]
    fn find_one_among_many_uses_smallest_pool() {
        let mgr = EntityManager::new();
        let special = mgr.new_entity();
        mgr.assign(special, A10(1)).unwrap();
        mgr.assign(special, A90(1)).unwrap();
        for _ in 0..9_999 {
            let e = mgr.new_entity();
            mgr.assign(e, A10(1)).unwrap();
            mgr.assign(e, A30(1)).unwrap();
            mgr.assign(e, A60(1)).unwrap();
        }
        let mask = mgr.create_mask::<A10>().unwrap() | mgr.create_mask::<A90>().unwrap();
        let found: Vec<_> = mgr.entities_with(mask).collect();
        assert_eq!(found, vec![special]);
    }

    #[test]
    fn empty_mask_is_empty_collection() {
        let mgr = EntityManager::new();
        assert_eq!(mgr.entities_with(crate::mask::ComponentMask::EMPTY).count(), 0);
    }

    #[test]
    fn destroying_entities_during_iteration_is_safe() {
        let mgr = EntityManager::new();
        let mut ents = Vec::new();
        for _ in 0..5 {
            let e = mgr.new_entity();
            mgr.assign(e, A10(1)).unwrap();
            ents.push(e);
        }
        let mask = mgr.create_mask::<A10>().unwrap();
        let mut seen = 0;
        for e in mgr.entities_with(mask) {
            seen += 1;
            if e == ents[1] {
                mgr.destroy(ents[2]).unwrap();
            }
        }
        assert!(seen >= 4);
    }
}
