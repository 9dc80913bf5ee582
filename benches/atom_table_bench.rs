use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rc_atomspace::{AtomTable, Handle, Link, Node, TableConfig, Type};
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn node(n: u64) -> Handle {
    Node::new(Type::CONCEPT_NODE, format!("k{:016x}", n)).unwrap()
}

fn bench_add_nodes_10k(c: &mut Criterion) {
    c.bench_function("table::add_nodes_10k", |b| {
        b.iter_batched(
            || lcg(1).take(10_000).map(node).collect::<Vec<_>>(),
            |atoms| {
                let t = AtomTable::with_config(TableConfig::new().with_capacity(10_000));
                for h in &atoms {
                    let _ = t.add(h).unwrap();
                }
                black_box(t)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_add_links_10k(c: &mut Criterion) {
    c.bench_function("table::add_free_links_10k", |b| {
        b.iter_batched(
            || {
                let xs: Vec<u64> = lcg(3).take(10_001).collect();
                xs.windows(2)
                    .map(|w| Link::new(Type::LIST_LINK, vec![node(w[0]), node(w[1])]).unwrap())
                    .collect::<Vec<_>>()
            },
            |links| {
                let t = AtomTable::new();
                for l in &links {
                    let _ = t.add(l).unwrap();
                }
                black_box(t)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_get_node_hit_10k(c: &mut Criterion) {
    c.bench_function("table::get_node_hit_10k", |b| {
        let t = AtomTable::new();
        let keys: Vec<u64> = lcg(7).take(10_000).collect();
        for &k in &keys {
            let _ = t.add(&node(k)).unwrap();
        }
        let names: Vec<String> = keys.iter().map(|k| format!("k{:016x}", k)).collect();
        b.iter(|| {
            for n in &names {
                black_box(t.get_node(Type::CONCEPT_NODE, n));
            }
        })
    });
}

fn bench_remove_recursive(c: &mut Criterion) {
    c.bench_function("table::remove_hub_with_1k_dependents", |b| {
        b.iter_batched(
            || {
                let t = AtomTable::new();
                let hub = t.add(&node(0)).unwrap();
                for x in lcg(9).take(1_000) {
                    let _ = t
                        .add(&Link::new(Type::MEMBER_LINK, vec![node(x), hub.clone()]).unwrap())
                        .unwrap();
                }
                (t, hub)
            },
            |(t, hub)| {
                let removed = t.remove(&hub, true).unwrap();
                black_box((t, removed))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(12)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches_table;
    config = bench_config();
    targets = bench_add_nodes_10k,
              bench_add_links_10k,
              bench_get_node_hit_10k,
              bench_remove_recursive
}
criterion_main!(benches_table);
