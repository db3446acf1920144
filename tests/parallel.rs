#![cfg(all(feature = "parallel", not(target_arch = "wasm32")))]

use {
    sieve::{query::FenceTracker, QueryError, TypeRegistry, World},
    std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

#[derive(Clone, Copy, Debug, PartialEq)]
struct Counter(u64);

#[derive(Clone, Copy, Debug, PartialEq)]
struct Active;

fn registry() -> Arc<TypeRegistry> {
    Arc::new(
        TypeRegistry::builder()
            .register::<Counter>()
            .register_enableable::<Active>()
            .build()
            .unwrap(),
    )
}

#[test]
fn parallel_chunks_visit_enabled_entities_once() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut world = World::builder(registry()).chunk_capacity(32).build();
    let entities = world
        .spawn_batch((0..1000).map(|_| (Counter(0), Active)))
        .unwrap();
    for &e in entities.iter().step_by(3) {
        world.set_enabled::<Active>(e, false).unwrap();
    }

    let mut query = world
        .query()
        .with_all_rw::<Counter>()
        .with_all::<Active>()
        .build()
        .unwrap();

    let visited = AtomicUsize::new(0);
    let tracker = FenceTracker::new();
    query
        .par_for_each_chunk(&mut world, &tracker, |chunk, indices| {
            let mut counters = chunk.column_mut::<Counter>().unwrap();
            for index in indices {
                counters[index].0 += 1;
                visited.fetch_add(1, Ordering::Relaxed);
            }
        })
        .unwrap();

    let expected = entities.len() - (entities.len() + 2) / 3;
    assert_eq!(visited.load(Ordering::Relaxed), expected);
    for (i, &e) in entities.iter().enumerate() {
        let count = if i % 3 == 0 { 0 } else { 1 };
        assert_eq!(world.get::<Counter>(e), Ok(&Counter(count)));
    }
}

#[test]
fn parallel_query_rejects_foreign_world() {
    let mut world = World::new(registry());
    let mut query = sieve::QueryBuilder::new(registry())
        .with_all::<Counter>()
        .build()
        .unwrap();

    let result = query.par_for_each_chunk(&mut world, &FenceTracker::new(), |_, _| {});
    assert!(matches!(result, Err(QueryError::InvalidQuery(_))));
}
