#![allow(dead_code)]

use ghosted_vector::algs::communicator::RayonComm;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Run `f` once per rank of a fresh `n`-rank world, one thread per rank.
/// Results come back in rank order.
pub fn run_ranks<R, F>(n: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(RayonComm) -> R + Sync,
{
    let comms = RayonComm::world(n);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|c| s.spawn(move || f(c)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Reproducible values for global indices `[0, n)`.
pub fn seeded_values(n: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(0xDEADBEEF);
    (0..n).map(|_| rng.gen_range(-10.0..10.0)).collect()
}
