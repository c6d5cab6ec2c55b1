use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ghosted_vector::prelude::*;

fn filled(n: usize, seed: u64) -> Vector<f64, NoComm> {
    let mut rng = StdRng::seed_from_u64(seed);
    let values: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let mut v = Vector::with_size(NoComm, n, n, ParallelType::Serial).expect("init");
    v.assign_from_slice(&values).expect("assign");
    v.close().expect("close");
    v
}

fn bench_vector(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector");

    for &n in &[1_000usize, 100_000] {
        let v = filled(n, 42);
        let w = filled(n, 7);

        group.bench_with_input(BenchmarkId::new("cached_get", n), &n, |b, &n| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 7919) % n;
                black_box(v.get(i).expect("get"));
            });
        });

        group.bench_with_input(BenchmarkId::new("l2_norm", n), &n, |b, _| {
            b.iter(|| black_box(v.l2_norm().expect("norm")));
        });

        group.bench_with_input(BenchmarkId::new("dot", n), &n, |b, _| {
            b.iter(|| black_box(v.dot(&w).expect("dot")));
        });

        group.bench_with_input(BenchmarkId::new("axpy_close", n), &n, |b, _| {
            let mut y = v.try_clone().expect("clone");
            b.iter(|| {
                y.add_scaled(0.5, &w).expect("axpy");
                y.close().expect("close");
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_vector);
criterion_main!(benches);
