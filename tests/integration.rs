use std::cell::Cell;
use std::rc::Rc;

use packed_ecs::{EntityManager, Subscription};

struct Character {
    health: i32,
}

struct Weapon {
    damage: i32,
}

struct Hit {
    attacker: packed_ecs::Entity,
    target: packed_ecs::Entity,
}

#[test]
fn receive_event_for_all_entities() {
    let mgr = Rc::new(EntityManager::new());

    let a = mgr.new_entity();
    let b = mgr.new_entity();
    mgr.assign(a, Character { health: 20 }).unwrap();
    mgr.assign(a, Weapon { damage: 5 }).unwrap();
    mgr.assign(b, Character { health: 20 }).unwrap();
    mgr.assign(b, Weapon { damage: 3 }).unwrap();

    let handler_mgr = mgr.clone();
    let _sub: Subscription = mgr.subscribe::<Hit>(move |_e, hit| {
        let damage = handler_mgr.get::<Weapon>(hit.attacker).unwrap().get().unwrap().damage;
        handler_mgr
            .mutate::<Character, _>(hit.target, |c| c.health -= damage)
            .unwrap();
    });

    mgr.emit(a, &Hit { attacker: a, target: b });
    mgr.emit(b, &Hit { attacker: b, target: a });

    assert_eq!(mgr.get::<Character>(a).unwrap().get().unwrap().health, 17);
    assert_eq!(mgr.get::<Character>(b).unwrap().get().unwrap().health, 15);
}

#[test]
fn unsubscribe_during_dispatch_across_modules() {
    let mgr = Rc::new(EntityManager::new());
    let calls = Rc::new(Cell::new(0u32));

    let sub_cell: Rc<std::cell::RefCell<Option<Subscription>>> = Rc::new(std::cell::RefCell::new(None));
    let sub_cell_for_cb = sub_cell.clone();
    let calls_for_cb = calls.clone();
    let sub = mgr.subscribe::<Hit>(move |_e, _hit| {
        calls_for_cb.set(calls_for_cb.get() + 1);
        if let Some(s) = sub_cell_for_cb.borrow().as_ref() {
            s.unsubscribe();
        }
    });
    *sub_cell.borrow_mut() = Some(sub.clone());

    let calls_for_second = calls.clone();
    let _s2 = mgr.subscribe::<Hit>(move |_e, _hit| {
        calls_for_second.set(calls_for_second.get() + 1);
    });

    let e = mgr.new_entity();
    mgr.emit(e, &Hit { attacker: e, target: e });
    assert_eq!(calls.get(), 2, "both subscribers fire once despite mid-dispatch unsubscribe");
    assert!(!sub.is_active());

    mgr.emit(e, &Hit { attacker: e, target: e });
    assert_eq!(calls.get(), 3, "only the still-active subscriber fires on the next emit");
}

#[test]
fn entity_destroyed_disconnects_scoped_subscriptions_across_modules() {
    let mgr = EntityManager::new();
    let e = mgr.new_entity();
    let hits_taken = Rc::new(Cell::new(0));
    let h = hits_taken.clone();
    let sub = mgr.subscribe_entity::<Hit>(e, move |_target, hit| {
        h.set(h.get() + hit.attacker.index() as i32);
    });

    mgr.destroy(e).unwrap();
    assert!(!sub.is_active());

    let other = mgr.new_entity();
    mgr.emit(other, &Hit { attacker: other, target: other });
    assert_eq!(hits_taken.get(), 0);
}

#[test]
fn destroying_entity_mid_query_does_not_corrupt_iteration() {
    let mgr = EntityManager::new();
    let mut entities = Vec::new();
    for _ in 0..20 {
        let e = mgr.new_entity();
        mgr.assign(e, Character { health: 10 }).unwrap();
        entities.push(e);
    }
    let mask = mgr.create_mask::<Character>().unwrap();

    let mut visited = 0;
    for e in mgr.entities_with(mask) {
        visited += 1;
        if e == entities[3] {
            mgr.destroy(entities[10]).unwrap();
        }
    }
    assert!(visited >= 19);
    assert!(!mgr.valid(entities[10]));
}
