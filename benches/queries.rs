use criterion::{black_box, criterion_group, criterion_main, Bencher, Criterion};
use packed_ecs::EntityManager;

#[derive(Default)]
struct CompA(u32);
#[derive(Default)]
struct CompB(u32);
#[derive(Default)]
struct CompC(u32);

fn populate(num: usize, sparsity: usize) -> EntityManager {
    let mgr = EntityManager::new();
    for i in 0..num {
        let e = mgr.new_entity();
        mgr.assign(e, CompA::default()).unwrap();
        if i % sparsity == 0 {
            mgr.assign(e, CompB::default()).unwrap();
            mgr.assign(e, CompC::default()).unwrap();
        }
    }
    mgr
}

fn find_all_three(b: &mut Bencher, num: usize) {
    let mgr = populate(num, 1);
    let mask = mgr.create_mask::<CompA>().unwrap()
        | mgr.create_mask::<CompB>().unwrap()
        | mgr.create_mask::<CompC>().unwrap();
    b.iter(|| {
        for e in mgr.entities_with(mask) {
            black_box(e);
        }
    });
}

fn find_rare_among_many(b: &mut Bencher, num: usize) {
    let mgr = populate(num, 100);
    let mask = mgr.create_mask::<CompA>().unwrap() | mgr.create_mask::<CompC>().unwrap();
    b.iter(|| {
        for e in mgr.entities_with(mask) {
            black_box(e);
        }
    });
}

fn benches_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("entities_with");
    for &num in &[100usize, 1_000, 10_000] {
        group.bench_function(format!("find_all_three/{num}"), |b| find_all_three(b, num));
        group.bench_function(format!("find_rare_among_many/{num}"), |b| {
            find_rare_among_many(b, num)
        });
    }
    group.finish();
}

criterion_group!(queries, benches_queries);
criterion_main!(queries);
