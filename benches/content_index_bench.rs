use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rc_atomspace::content_index::ContentIndex;
use rc_atomspace::{Handle, Node, Type};
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

fn bench_insert_fresh_100k(c: &mut Criterion) {
    c.bench_function("content_index::insert_fresh_100k", |b| {
        b.iter_batched(
            || lcg(1).take(100_000).map(node).collect::<Vec<_>>(),
            |atoms| {
                let mut m = ContentIndex::new();
                for h in atoms {
                    let _ = m.insert(h).unwrap();
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_remove_random_10k(c: &mut Criterion) {
    c.bench_function("content_index::remove_random_10k_of_110k", |b| {
        b.iter_batched(
            || {
                let mut m = ContentIndex::new();
                let atoms: Vec<Handle> = lcg(5).take(110_000).map(node).collect();
                for h in &atoms {
                    let _ = m.insert(h.clone()).unwrap();
                }
                // Precompute 10k unique indices via LCG
                let n = atoms.len();
                let mut sel = std::collections::HashSet::with_capacity(10_000);
                let mut s = 0x9e3779b97f4a7c15u64;
                while sel.len() < 10_000 {
                    s = s.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
                    sel.insert((s as usize) % n);
                }
                let to_remove: Vec<Handle> = sel.into_iter().map(|i| atoms[i].clone()).collect();
                (m, to_remove)
            },
            |(mut m, to_remove)| {
                for h in &to_remove {
                    let _ = m.remove(h);
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_find_hit_10k(c: &mut Criterion) {
    c.bench_function("content_index::find_hit_10k_on_100k", |b| {
        let mut m = ContentIndex::new();
        let keys: Vec<u64> = lcg(7).take(100_000).collect();
        for &k in &keys {
            let _ = m.insert(node(k)).unwrap();
        }
        // Fresh, already-hashed twins: probes pay for equality, not hashing.
        let n = keys.len();
        let mut s = 0x9e3779b97f4a7c15u64;
        let queries: Vec<Handle> = (0..10_000)
            .map(|_| {
                s = s.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
                let q = node(keys[(s as usize) % n]);
                q.get_hash();
                q
            })
            .collect();
        b.iter(|| {
            for q in &queries {
                black_box(m.find(q));
            }
        })
    });
}

fn bench_find_miss_10k(c: &mut Criterion) {
    c.bench_function("content_index::find_miss_10k_on_100k", |b| {
        let mut m = ContentIndex::new();
        for x in lcg(11).take(100_000) {
            let _ = m.insert(node(x)).unwrap();
        }
        let queries: Vec<Handle> = lcg(0xdead_beef).take(10_000).map(node).collect();
        b.iter(|| {
            for q in &queries {
                black_box(m.find(q));
            }
        })
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(12)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches_insert;
    config = bench_config();
    targets = bench_insert_fresh_100k
}
criterion_group! {
    name = benches_ops;
    config = bench_config();
    targets = bench_remove_random_10k,
              bench_find_hit_10k,
              bench_find_miss_10k
}
criterion_main!(benches_insert, benches_ops);
