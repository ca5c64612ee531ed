//! Criterion micro-benchmarks for arena allocation, rollback, and linearization.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use loam_alloc::{Allocator, SystemAllocator};
use loam_arena::Arena;
use loam_bench::alloc_sizes;

const SYSTEM: SystemAllocator = SystemAllocator;

/// Benchmark: 1K bump allocations of mixed sizes, arena built per iteration.
fn bench_bump_alloc_1k(c: &mut Criterion) {
    let sizes = alloc_sizes(42, 1000, 256);
    c.bench_function("arena_bump_alloc_1k", |b| {
        b.iter(|| {
            let arena = Arena::new(&SYSTEM);
            for &size in &sizes {
                black_box(arena.alloc_raw(size, 8, false));
            }
        });
    });
}

/// Benchmark: allocate a burst past a marker, then roll back without
/// releasing, so steady state reuses recycled buckets.
fn bench_marker_reset_cycle(c: &mut Criterion) {
    let sizes = alloc_sizes(43, 200, 512);
    let mut arena = Arena::with_min_bucket_size(&SYSTEM, 4096);
    c.bench_function("arena_marker_reset_cycle", |b| {
        b.iter(|| {
            let marker = arena.marker();
            for &size in &sizes {
                black_box(arena.alloc_raw(size, 8, false));
            }
            arena.reset_to(marker, false);
        });
    });
}

/// Benchmark: stream writes across bucket boundaries, then linearize the
/// spanned range into one contiguous block.
fn bench_linearize_spanning(c: &mut Criterion) {
    let chunk = [0xA5u8; 96];
    let mut arena = Arena::with_min_bucket_size(&SYSTEM, 256);
    c.bench_function("arena_linearize_spanning", |b| {
        b.iter(|| {
            let begin = arena.marker();
            for _ in 0..32 {
                arena.push_bytes(&chunk);
            }
            let end = arena.marker();
            black_box(arena.linearize(begin, end));
            arena.reset_to(begin, false);
        });
    });
}

/// Benchmark: the same mixed-size workload straight against the system
/// heap through the protocol, as the non-arena baseline.
fn bench_system_baseline_1k(c: &mut Criterion) {
    let sizes = alloc_sizes(42, 1000, 256);
    c.bench_function("system_alloc_free_1k", |b| {
        b.iter(|| {
            for &size in &sizes {
                let block = SYSTEM.allocate(size, 8, false);
                SYSTEM.free(black_box(block), 8);
            }
        });
    });
}

criterion_group!(
    benches,
    bench_bump_alloc_1k,
    bench_marker_reset_cycle,
    bench_linearize_spanning,
    bench_system_baseline_1k
);
criterion_main!(benches);
