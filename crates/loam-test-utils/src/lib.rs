//! Test utilities and instrumented allocators for Loam development.
//!
//! Provides wrappers around the allocator protocol for exercising
//! allocation behavior in tests: a [`CountingAllocator`] that audits
//! traffic passing through to an inner allocator, a [`FailingAllocator`]
//! with a configurable allocation budget for out-of-memory paths, and an
//! [`IdentityState`] hasher for hash-map tests that need full control
//! over probe sequences.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::cell::Cell;
use std::hash::{BuildHasher, Hasher};

use loam_alloc::{AllocRef, Allocator, Block, SystemAllocator};

/// Audits protocol traffic on its way to an inner allocator.
///
/// Counts successful allocations and frees and tracks the number of live
/// bytes, so tests can assert accounting invariants such as "growth frees
/// the old storage exactly once" or "drop returns every bucket".
pub struct CountingAllocator<'a> {
    inner: AllocRef<'a>,
    allocations: Cell<usize>,
    frees: Cell<usize>,
    live_bytes: Cell<usize>,
}

impl<'a> CountingAllocator<'a> {
    pub fn new(inner: AllocRef<'a>) -> CountingAllocator<'a> {
        CountingAllocator {
            inner,
            allocations: Cell::new(0),
            frees: Cell::new(0),
            live_bytes: Cell::new(0),
        }
    }

    /// Successful fresh allocations served so far.
    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    /// Frees served so far.
    pub fn frees(&self) -> usize {
        self.frees.get()
    }

    /// Live allocations: allocations minus frees.
    pub fn live_allocations(&self) -> usize {
        self.allocations.get() - self.frees.get()
    }

    /// Bytes currently held by live allocations.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.get()
    }
}

impl Allocator for CountingAllocator<'_> {
    fn resize(
        &self,
        old: Block,
        old_align: usize,
        new_size: usize,
        new_align: usize,
        zero: bool,
    ) -> Block {
        let result = self.inner.resize(old, old_align, new_size, new_align, zero);
        if new_size == 0 {
            if !old.is_empty() {
                self.frees.set(self.frees.get() + 1);
                self.live_bytes.set(self.live_bytes.get() - old.len());
            }
        } else if !result.is_empty() {
            if old.is_empty() {
                self.allocations.set(self.allocations.get() + 1);
                self.live_bytes.set(self.live_bytes.get() + new_size);
            } else {
                self.live_bytes
                    .set(self.live_bytes.get() - old.len() + new_size);
            }
        }
        result
    }
}

/// Serves requests from the system heap until a budget runs out, then
/// returns the empty block for everything.
///
/// Frees always pass through, so code under test can release what it was
/// granted before the budget was exhausted.
pub struct FailingAllocator {
    inner: SystemAllocator,
    remaining: Cell<usize>,
}

impl FailingAllocator {
    /// Allow `budget` successful non-free requests before failing.
    pub fn new(budget: usize) -> FailingAllocator {
        FailingAllocator {
            inner: SystemAllocator,
            remaining: Cell::new(budget),
        }
    }

    /// Requests still allowed to succeed.
    pub fn remaining(&self) -> usize {
        self.remaining.get()
    }
}

impl Allocator for FailingAllocator {
    fn resize(
        &self,
        old: Block,
        old_align: usize,
        new_size: usize,
        new_align: usize,
        zero: bool,
    ) -> Block {
        if new_size > 0 {
            if self.remaining.get() == 0 {
                return Block::EMPTY;
            }
            self.remaining.set(self.remaining.get() - 1);
        }
        self.inner.resize(old, old_align, new_size, new_align, zero)
    }
}

/// Identity hashing for deterministic probe sequences in map tests.
///
/// Integer keys hash to their own value, so a key's home slot is simply
/// `key % capacity` and collision chains can be constructed by hand.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityState;

pub struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 = (self.0 << 8) | u64::from(byte);
        }
    }

    fn write_u32(&mut self, value: u32) {
        self.0 = u64::from(value);
    }

    fn write_u64(&mut self, value: u64) {
        self.0 = value;
    }

    fn write_usize(&mut self, value: usize) {
        self.0 = value as u64;
    }
}

impl BuildHasher for IdentityState {
    type Hasher = IdentityHasher;

    fn build_hasher(&self) -> IdentityHasher {
        IdentityHasher(0)
    }
}
