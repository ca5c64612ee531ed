//! Benchmark workloads and utilities for the Loam memory toolkit.
//!
//! Provides deterministic, seeded workload generators shared by the
//! criterion benches:
//!
//! - [`alloc_sizes`]: allocation size sequences for arena benches
//! - [`shuffled_keys`]: distinct keys in shuffled order for map benches
//! - [`mixed_indices`]: bounded pseudo-random indices for churn benches

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use rand::seq::SliceRandom;
use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Generate `count` allocation sizes in `1..=max_size`.
///
/// The sequence is fully determined by `seed`, so benchmark runs are
/// comparable across machines and commits.
pub fn alloc_sizes(seed: u64, count: usize, max_size: usize) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count).map(|_| rng.random_range(1..=max_size)).collect()
}

/// The distinct keys `0..count`, shuffled deterministically by `seed`.
///
/// Shuffling decorrelates insertion order from hash order, so map
/// benches measure the probe sequences a real workload would see.
pub fn shuffled_keys(seed: u64, count: usize) -> Vec<u64> {
    let mut keys: Vec<u64> = (0..count as u64).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    keys.shuffle(&mut rng);
    keys
}

/// Generate `count` indices in `0..bound` for churn workloads.
pub fn mixed_indices(seed: u64, count: usize, bound: usize) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count).map(|_| rng.random_range(0..bound)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_sizes_are_deterministic_and_in_range() {
        let a = alloc_sizes(42, 256, 128);
        let b = alloc_sizes(42, 256, 128);
        assert_eq!(a, b);
        assert_eq!(a.len(), 256);
        assert!(a.iter().all(|&size| (1..=128).contains(&size)));
    }

    #[test]
    fn shuffled_keys_are_a_permutation() {
        let keys = shuffled_keys(7, 1000);
        assert_eq!(keys.len(), 1000);
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        let expected: Vec<u64> = (0..1000).collect();
        assert_eq!(sorted, expected);
        assert_ne!(keys, expected, "seed 7 should not yield the identity order");
    }

    #[test]
    fn mixed_indices_respect_the_bound() {
        let indices = mixed_indices(3, 512, 64);
        assert!(indices.iter().all(|&index| index < 64));
        assert_eq!(indices, mixed_indices(3, 512, 64));
    }
}
