//! Benchmark utilities.

use rand::seq::SliceRandom;
use rand::Rng;

/// Random payload of `size` bytes.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// `count` hierarchical keys such as `tenant-3/user-0042/session-7`, in
/// random order.
///
/// Shared prefixes at several depths make the radix tree split labels the
/// way real key spaces do.
pub fn hierarchical_keys(count: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::thread_rng();
    let mut keys: Vec<Vec<u8>> = (0..count)
        .map(|i| format!("tenant-{}/user-{:04}/session-{}", i % 8, i / 8, i % 13).into_bytes())
        .collect();
    keys.shuffle(&mut rng);
    keys
}
