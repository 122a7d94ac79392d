use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rehashmap::{Dict, IntKeyed};
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn filled(n: usize, seed: u64) -> (Dict<IntKeyed<u64>>, Vec<u32>) {
    let mut d = Dict::new(IntKeyed::new());
    let mut keys = Vec::with_capacity(n);
    for (i, x) in lcg(seed).take(n).enumerate() {
        let k = x as u32;
        if d.insert(k, i as u64).is_ok() {
            keys.push(k);
        }
    }
    // Settle any in-flight migration so lookups measure steady state.
    while d.is_rehashing() {
        d.rehash(100);
    }
    (d, keys)
}

fn bench_insert_fresh_100k(c: &mut Criterion) {
    c.bench_function("dict::insert_fresh_100k", |b| {
        b.iter_batched(
            || Dict::<IntKeyed<u64>>::new(IntKeyed::new()),
            |mut d| {
                for (i, x) in lcg(1).take(100_000).enumerate() {
                    let _ = d.insert(x as u32, i as u64);
                }
                black_box(d)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_find_hit_10k(c: &mut Criterion) {
    c.bench_function("dict::find_hit_10k_on_100k", |b| {
        let (mut d, keys) = filled(100_000, 7);
        let queries: Vec<u32> = keys.iter().cycle().take(10_000).copied().collect();
        b.iter(|| {
            for k in &queries {
                black_box(d.find(k));
            }
        })
    });
}

fn bench_find_miss_10k(c: &mut Criterion) {
    c.bench_function("dict::find_miss_10k_on_100k", |b| {
        let (mut d, _keys) = filled(100_000, 11);
        b.iter(|| {
            let mut miss = lcg(0xdead_beef);
            for _ in 0..10_000 {
                // Random probes against 100k of 4 billion keys: nearly
                // every lookup is a miss.
                let k = miss.next().unwrap() as u32;
                black_box(d.find(&k));
            }
        })
    });
}

fn bench_rehash_drain_100k(c: &mut Criterion) {
    c.bench_function("dict::rehash_drain_100k", |b| {
        b.iter_batched(
            || {
                let (mut d, _) = filled(100_000, 21);
                d.expand(1 << 18).expect("idle table accepts expansion");
                d
            },
            |mut d| {
                while d.rehash(100) {}
                black_box(d)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_iterate_100k(c: &mut Criterion) {
    c.bench_function("dict::iterate_100k", |b| {
        let (d, _keys) = filled(100_000, 33);
        b.iter(|| {
            let mut acc = 0u64;
            for e in d.iter() {
                acc = acc.wrapping_add(e.value().copied().unwrap_or(0));
            }
            black_box(acc)
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
    name = benches;
    config = bench_config();
    targets = bench_insert_fresh_100k,
              bench_find_hit_10k,
              bench_find_miss_10k,
              bench_rehash_drain_100k,
              bench_iterate_100k
}
criterion_main!(benches);
