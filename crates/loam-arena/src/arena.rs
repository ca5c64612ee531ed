//! The bucket-chain arena allocator.

use std::cell::RefCell;
use std::ptr;

use loam_alloc::{align_up, AllocRef, Allocator, Block};
use smallvec::SmallVec;

use crate::bucket::{Bucket, BucketTable, BUCKET_ALIGN};
use crate::marker::Marker;

/// A bump allocator backed by a growable chain of buckets.
///
/// Fresh allocations advance a cursor in the current bucket; when it is
/// full the arena reuses a recycled bucket or grows the chain with a new
/// one (sizes double as the chain grows). Individual frees reclaim bytes
/// only for the most recent allocation — everything else is reclaimed in
/// bulk through [`Arena::reset_to`] and [`Arena::clear`].
///
/// The allocation methods take `&self` (the arena hands out memory while
/// shared, like any other allocator behind an
/// [`AllocRef`](loam_alloc::AllocRef)); the bulk-reclaim methods take
/// `&mut self`, so storage cannot be rolled back while a container still
/// borrows the arena.
///
/// # Example
///
/// ```
/// use loam_alloc::SystemAllocator;
/// use loam_arena::Arena;
///
/// let system = SystemAllocator;
/// let mut arena = Arena::new(&system);
///
/// let greeting = arena.alloc_slice_copy(b"hello");
/// assert_eq!(greeting, b"hello");
///
/// let marker = arena.marker();
/// arena.alloc_slice_copy(&[0u8; 1024]);
/// arena.reset_to(marker, false);
/// assert_eq!(arena.used_bytes(), 5);
/// ```
pub struct Arena<'a> {
    backing: AllocRef<'a>,
    min_bucket_size: usize,
    inner: RefCell<ArenaInner>,
}

struct ArenaInner {
    table: BucketTable,
    /// Live chain head: the bucket the cursor currently bumps in.
    current: Option<u32>,
    /// Recycle list of buckets retained by a non-releasing rollback.
    free: Option<u32>,
}

/// Bump-allocate `size` bytes at `align` from `bucket`, or `None` if the
/// padded request does not fit. Leaves the bucket untouched on failure.
fn bump(bucket: &mut Bucket, size: usize, align: usize) -> Option<Block> {
    let addr = bucket.fill_addr();
    let aligned = align_up(addr, align);
    let pad = aligned - addr;
    let needed = pad.checked_add(size)?;
    if needed > bucket.total() - bucket.used {
        return None;
    }
    bucket.used += needed;
    debug_assert!(bucket.used <= bucket.total());
    Some(Block::new(aligned as *mut u8, size))
}

fn zero_block(block: Block) {
    // SAFETY: callers pass a block that was just bump-allocated and is
    // not yet visible to anyone else.
    unsafe { ptr::write_bytes(block.as_ptr(), 0, block.len()) };
}

impl<'a> Arena<'a> {
    /// Default minimum bucket size in bytes.
    pub const DEFAULT_MIN_BUCKET_SIZE: usize = 4096;

    /// Create an arena with the default minimum bucket size.
    pub fn new(backing: AllocRef<'a>) -> Arena<'a> {
        Arena::with_min_bucket_size(backing, Arena::DEFAULT_MIN_BUCKET_SIZE)
    }

    /// Create an arena whose bucket growth is seeded at `min_bucket_size`.
    ///
    /// The first bucket has exactly this size; each later bucket doubles
    /// the previous one (and keeps doubling until an oversized request
    /// fits).
    pub fn with_min_bucket_size(backing: AllocRef<'a>, min_bucket_size: usize) -> Arena<'a> {
        assert!(min_bucket_size > 0, "min_bucket_size must be non-zero");
        Arena {
            backing,
            min_bucket_size,
            inner: RefCell::new(ArenaInner {
                table: BucketTable::new(),
                current: None,
                free: None,
            }),
        }
    }

    /// The backing allocator buckets are acquired from.
    pub fn backing(&self) -> AllocRef<'a> {
        self.backing
    }

    /// Bump-allocate `size` bytes aligned to `align`.
    ///
    /// Returns [`Block::EMPTY`] when `size` is zero or the backing
    /// allocator cannot provide a new bucket.
    pub fn alloc_raw(&self, size: usize, align: usize, zero: bool) -> Block {
        debug_assert!(
            align.is_power_of_two(),
            "align must be a power of two (got {align})"
        );
        if size == 0 {
            return Block::EMPTY;
        }
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;

        // Fast path: the current bucket.
        if let Some(ci) = inner.current {
            if let Some(block) = bump(inner.table.get_mut(ci), size, align) {
                if zero {
                    zero_block(block);
                }
                return block;
            }
        }

        // Second chance: the head of the recycle list.
        if let Some(fi) = inner.free {
            if let Some(block) = bump(inner.table.get_mut(fi), size, align) {
                // Unlink from the recycle list, splice in as current.
                let bucket = inner.table.get_mut(fi);
                inner.free = bucket.prev;
                bucket.prev = inner.current;
                inner.current = Some(fi);
                if zero {
                    zero_block(block);
                }
                return block;
            }
        }

        // Grow the chain: double from the current bucket's size until the
        // request is covered, seeded at the configured minimum.
        let seed = match inner.current {
            Some(ci) => inner.table.get(ci).total().saturating_mul(2),
            None => self.min_bucket_size,
        };
        let mut bucket_size = seed.max(self.min_bucket_size);
        while bucket_size < size {
            bucket_size = match bucket_size.checked_mul(2) {
                Some(doubled) => doubled,
                None => size,
            };
        }

        let storage_align = align.max(BUCKET_ALIGN);
        let storage = self.backing.allocate(bucket_size, storage_align, false);
        if storage.is_empty() {
            return Block::EMPTY;
        }
        let index = inner.table.insert(Bucket {
            storage,
            align: storage_align,
            used: 0,
            prev: inner.current,
        });
        inner.current = Some(index);
        let block = bump(inner.table.get_mut(index), size, align)
            .expect("fresh bucket is sized and aligned to fit the request");
        if zero {
            zero_block(block);
        }
        block
    }

    /// Resize `old` to `new_size` bytes aligned to `new_align`.
    ///
    /// The most recent allocation grows or shrinks in place when its
    /// bucket allows; anything else grows by moving to a fresh block,
    /// while shrinks and frees of interior blocks leak their tail bytes
    /// until a bucket-level reclaim — the usual bump-allocator trade.
    pub fn realloc_raw(
        &self,
        old: Block,
        old_align: usize,
        new_size: usize,
        new_align: usize,
        zero: bool,
    ) -> Block {
        debug_assert!(
            old.is_empty() || old.as_ptr() as usize % old_align == 0,
            "old block does not satisfy old_align"
        );
        if old.is_empty() {
            return self.alloc_raw(new_size, new_align, zero);
        }

        if new_size == 0 {
            // Free: only the most recent allocation gives bytes back.
            let mut inner = self.inner.borrow_mut();
            if let Some(ci) = inner.current {
                let bucket = inner.table.get_mut(ci);
                let start = old.as_ptr() as usize;
                if start >= bucket.base_addr() && start + old.len() == bucket.fill_addr() {
                    bucket.used = start - bucket.base_addr();
                }
            }
            return Block::EMPTY;
        }

        let aligned_ok = old.as_ptr() as usize % new_align == 0;
        {
            let mut inner = self.inner.borrow_mut();
            if let Some(ci) = inner.current {
                let bucket = inner.table.get_mut(ci);
                let start = old.as_ptr() as usize;
                if aligned_ok
                    && start >= bucket.base_addr()
                    && start + old.len() == bucket.fill_addr()
                {
                    let offset = start - bucket.base_addr();
                    if new_size <= old.len() {
                        // Shrink in place, reclaiming the tail.
                        bucket.used = offset + new_size;
                        return Block::new(old.as_ptr(), new_size);
                    }
                    if new_size <= bucket.total() - offset {
                        // Grow in place.
                        bucket.used = offset + new_size;
                        if zero {
                            // SAFETY: the tail [old.len, new_size) is in
                            // bounds of the bucket per the check above.
                            unsafe {
                                ptr::write_bytes(
                                    old.as_ptr().add(old.len()),
                                    0,
                                    new_size - old.len(),
                                )
                            };
                        }
                        return Block::new(old.as_ptr(), new_size);
                    }
                }
            }
        }

        if new_size <= old.len() && aligned_ok {
            // Interior shrink: the tail is leaked until rollback or clear.
            return Block::new(old.as_ptr(), new_size);
        }

        // Grow by moving: fresh block, copy the old contents forward.
        let fresh = self.alloc_raw(new_size, new_align, false);
        if fresh.is_empty() {
            return Block::EMPTY;
        }
        let preserved = old.len().min(new_size);
        // SAFETY: `fresh` was just bump-allocated past `old`, so the
        // regions are disjoint and each covers `preserved` bytes.
        unsafe { ptr::copy_nonoverlapping(old.as_ptr(), fresh.as_ptr(), preserved) };
        if zero && new_size > preserved {
            // SAFETY: the tail [preserved, new_size) is in bounds of `fresh`.
            unsafe { ptr::write_bytes(fresh.as_ptr().add(preserved), 0, new_size - preserved) };
        }
        fresh
    }

    /// Copy `bytes` into the arena (alignment 1).
    ///
    /// Returns [`Block::EMPTY`] when the arena cannot grow.
    pub fn push_bytes(&self, bytes: &[u8]) -> Block {
        let block = self.alloc_raw(bytes.len(), 1, false);
        if !block.is_empty() {
            // SAFETY: `block` is a fresh arena allocation of
            // `bytes.len()` bytes, disjoint from `bytes`.
            unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), block.as_ptr(), bytes.len()) };
        }
        block
    }

    /// Copy a slice into the arena and return the arena-owned copy.
    ///
    /// Aborts via `handle_alloc_error` when the backing allocator is
    /// exhausted. The returned slice lives until the next `&mut self`
    /// reclaim (`reset_to`, `clear`, or drop), which the borrow checker
    /// enforces.
    pub fn alloc_slice_copy<T: Copy>(&self, src: &[T]) -> &mut [T] {
        if src.is_empty() || std::mem::size_of::<T>() == 0 {
            // SAFETY: zero-sized views never touch memory.
            return unsafe {
                std::slice::from_raw_parts_mut(std::ptr::NonNull::dangling().as_ptr(), src.len())
            };
        }
        let layout = std::alloc::Layout::for_value(src);
        let block = self.alloc_raw(layout.size(), layout.align(), false);
        if block.is_empty() {
            std::alloc::handle_alloc_error(layout);
        }
        let dst = block.as_ptr().cast::<T>();
        // SAFETY: `block` is a fresh allocation of `size_of_val(src)`
        // bytes aligned for `T`, disjoint from `src`; `T: Copy` so a byte
        // copy is a valid duplicate. The returned borrow is tied to
        // `&self`, and every reclaim path takes `&mut self`.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
            std::slice::from_raw_parts_mut(dst, src.len())
        }
    }

    /// Capture the current bump position as a rollback point.
    pub fn marker(&self) -> Marker {
        let inner = self.inner.borrow();
        match inner.current {
            Some(ci) => Marker {
                bucket: Some(ci),
                offset: inner.table.get(ci).used,
            },
            None => Marker::default(),
        }
    }

    /// Roll the arena back to `marker`.
    ///
    /// Buckets allocated after the marker are released to the backing
    /// allocator (`release = true`) or parked on the recycle list for
    /// reuse (`release = false`); the marker's bucket keeps its storage
    /// and rewinds its cursor to the marker offset. The empty marker
    /// rolls back to the oldest bucket at offset zero.
    ///
    /// A marker whose bucket has already been released no longer names a
    /// position; the rollback then retires the whole chain.
    pub fn reset_to(&mut self, marker: Marker, release: bool) {
        let inner = self.inner.get_mut();
        while let Some(ci) = inner.current {
            if marker.bucket == Some(ci) {
                break;
            }
            if marker.bucket.is_none() && inner.table.get(ci).prev.is_none() {
                break;
            }
            if release {
                let bucket = inner.table.remove(ci);
                inner.current = bucket.prev;
                self.backing.free(bucket.storage, bucket.align);
            } else {
                let free_head = inner.free;
                let bucket = inner.table.get_mut(ci);
                inner.current = bucket.prev;
                bucket.used = 0;
                bucket.prev = free_head;
                inner.free = Some(ci);
            }
        }
        if let Some(ci) = inner.current {
            let bucket = inner.table.get_mut(ci);
            let offset = if marker.bucket.is_some() {
                marker.offset
            } else {
                0
            };
            debug_assert!(
                offset <= bucket.total(),
                "marker offset exceeds its bucket"
            );
            bucket.used = offset.min(bucket.total());
        }
    }

    /// Reset everything.
    ///
    /// Equivalent to `reset_to(Marker::default(), release)`; with
    /// `release = true` the recycle list is flushed back to the backing
    /// allocator as well.
    pub fn clear(&mut self, release: bool) {
        self.reset_to(Marker::default(), release);
        if release {
            let inner = self.inner.get_mut();
            while let Some(fi) = inner.free {
                let bucket = inner.table.remove(fi);
                inner.free = bucket.prev;
                self.backing.free(bucket.storage, bucket.align);
            }
        }
    }

    /// Materialize the bytes written between two markers as one
    /// contiguous block.
    ///
    /// When both markers fall in the same bucket this is free: the result
    /// points straight into the bucket. Otherwise the arena pushes a
    /// fresh block of the total size onto itself and copies each bucket's
    /// contributing range in program order. This is what lets a writer
    /// stream data across bucket boundaries and only pay for contiguity
    /// at the end.
    ///
    /// Returns [`Block::EMPTY`] for an empty range or when the arena
    /// cannot grow.
    pub fn linearize(&self, begin: Marker, end: Marker) -> Block {
        if begin.bucket == end.bucket {
            let ci = match begin.bucket {
                Some(ci) => ci,
                None => return Block::EMPTY,
            };
            let inner = self.inner.borrow();
            let bucket = inner.table.get(ci);
            assert!(
                begin.offset <= end.offset && end.offset <= bucket.used,
                "markers out of order"
            );
            let len = end.offset - begin.offset;
            if len == 0 {
                return Block::EMPTY;
            }
            return Block::new((bucket.base_addr() + begin.offset) as *mut u8, len);
        }

        let end_index = match end.bucket {
            Some(ci) => ci,
            // Empty end marker: nothing lies between `begin` and the
            // start of the arena.
            None => return Block::EMPTY,
        };

        // Collect each bucket's contributing range, newest first.
        let mut ranges: SmallVec<[(usize, usize); 8]> = SmallVec::new();
        let mut total: usize;
        {
            let inner = self.inner.borrow();
            let end_bucket = inner.table.get(end_index);
            assert!(end.offset <= end_bucket.used, "end marker out of range");
            total = end.offset;
            ranges.push((end_bucket.base_addr(), end.offset));

            let mut cursor = end_bucket.prev;
            loop {
                let ci = match cursor {
                    Some(ci) => ci,
                    None => {
                        assert!(
                            begin.is_empty(),
                            "begin marker is not on the chain behind end"
                        );
                        break;
                    }
                };
                let bucket = inner.table.get(ci);
                if begin.bucket == Some(ci) {
                    assert!(begin.offset <= bucket.used, "begin marker out of range");
                    let len = bucket.used - begin.offset;
                    total += len;
                    ranges.push((bucket.base_addr() + begin.offset, len));
                    break;
                }
                total += bucket.used;
                ranges.push((bucket.base_addr(), bucket.used));
                cursor = bucket.prev;
            }
        }

        if total == 0 {
            return Block::EMPTY;
        }
        let dest = self.alloc_raw(total, 1, false);
        if dest.is_empty() {
            return Block::EMPTY;
        }
        let mut out = dest.as_ptr();
        for &(addr, len) in ranges.iter().rev() {
            // SAFETY: each source range lies in live bucket storage that
            // the destination push cannot move or reclaim; `dest` has
            // room for `total` bytes, the sum of all range lengths.
            unsafe {
                ptr::copy_nonoverlapping(addr as *const u8, out, len);
                out = out.add(len);
            }
        }
        dest
    }

    /// Number of buckets on the live chain.
    pub fn bucket_count(&self) -> usize {
        let inner = self.inner.borrow();
        let mut count = 0;
        let mut cursor = inner.current;
        while let Some(ci) = cursor {
            count += 1;
            cursor = inner.table.get(ci).prev;
        }
        count
    }

    /// Number of buckets parked on the recycle list.
    pub fn free_bucket_count(&self) -> usize {
        let inner = self.inner.borrow();
        let mut count = 0;
        let mut cursor = inner.free;
        while let Some(ci) = cursor {
            count += 1;
            cursor = inner.table.get(ci).prev;
        }
        count
    }

    /// Bytes handed out across the live chain, including padding.
    pub fn used_bytes(&self) -> usize {
        let inner = self.inner.borrow();
        let mut used = 0;
        let mut cursor = inner.current;
        while let Some(ci) = cursor {
            let bucket = inner.table.get(ci);
            used += bucket.used;
            cursor = bucket.prev;
        }
        used
    }

    /// Total bucket storage held, live chain plus recycle list.
    pub fn capacity_bytes(&self) -> usize {
        let inner = self.inner.borrow();
        let mut capacity = 0;
        for cursor in [inner.current, inner.free] {
            let mut cursor = cursor;
            while let Some(ci) = cursor {
                let bucket = inner.table.get(ci);
                capacity += bucket.total();
                cursor = bucket.prev;
            }
        }
        capacity
    }
}

impl Allocator for Arena<'_> {
    fn resize(
        &self,
        old: Block,
        old_align: usize,
        new_size: usize,
        new_align: usize,
        zero: bool,
    ) -> Block {
        self.realloc_raw(old, old_align, new_size, new_align, zero)
    }
}

impl Drop for Arena<'_> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        for head in [inner.current.take(), inner.free.take()] {
            let mut cursor = head;
            while let Some(ci) = cursor {
                let bucket = inner.table.remove(ci);
                cursor = bucket.prev;
                self.backing.free(bucket.storage, bucket.align);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_alloc::SystemAllocator;

    const SYSTEM: SystemAllocator = SystemAllocator;

    #[test]
    fn first_allocation_creates_min_sized_bucket() {
        let arena = Arena::with_min_bucket_size(&SYSTEM, 1024);
        let block = arena.alloc_raw(1, 1, false);
        assert!(!block.is_empty());
        assert_eq!(arena.bucket_count(), 1);
        assert_eq!(arena.capacity_bytes(), 1024);
    }

    #[test]
    fn zero_sized_allocation_is_empty() {
        let arena = Arena::new(&SYSTEM);
        assert!(arena.alloc_raw(0, 1, false).is_empty());
        assert_eq!(arena.bucket_count(), 0);
    }

    #[test]
    fn bucket_sizes_follow_the_doubling_rule() {
        let arena = Arena::with_min_bucket_size(&SYSTEM, 1024);
        // 7 * 1024 bytes in 1024-byte chunks: buckets of 1024, 2048, 4096.
        for _ in 0..7 {
            assert!(!arena.alloc_raw(1024, 1, false).is_empty());
        }
        assert_eq!(arena.bucket_count(), 3);
        assert_eq!(arena.capacity_bytes(), 1024 + 2048 + 4096);
        assert_eq!(arena.used_bytes(), 7 * 1024);
    }

    #[test]
    fn oversized_request_gets_a_covering_bucket() {
        let arena = Arena::with_min_bucket_size(&SYSTEM, 64);
        let block = arena.alloc_raw(1000, 1, false);
        assert!(!block.is_empty());
        assert_eq!(arena.bucket_count(), 1);
        assert!(arena.capacity_bytes() >= 1000);
    }

    #[test]
    fn alignment_padding_within_a_bucket() {
        let arena = Arena::with_min_bucket_size(&SYSTEM, 4096);
        let _ = arena.alloc_raw(1, 1, false);
        let aligned = arena.alloc_raw(8, 64, false);
        assert_eq!(aligned.as_ptr() as usize % 64, 0);
        assert_eq!(arena.bucket_count(), 1);
    }

    #[test]
    fn aligned_overflow_creates_aligned_bucket() {
        // 1023 bytes fill bucket one; a 1024-aligned byte must land at
        // the front of a second, 1024-aligned bucket.
        let arena = Arena::with_min_bucket_size(&SYSTEM, 1024);
        assert!(!arena.alloc_raw(1023, 1, false).is_empty());
        assert_eq!(arena.bucket_count(), 1);

        let aligned = arena.alloc_raw(1, 1024, false);
        assert!(!aligned.is_empty());
        assert_eq!(arena.bucket_count(), 2);
        assert_eq!(aligned.as_ptr() as usize % 1024, 0);
    }

    #[test]
    fn zero_fill_covers_fresh_allocation() {
        let arena = Arena::new(&SYSTEM);
        let block = arena.alloc_raw(64, 8, true);
        // SAFETY: fresh allocation, exclusively owned by this test.
        assert!(unsafe { block.as_slice() }.iter().all(|&b| b == 0));
    }

    #[test]
    fn most_recent_allocation_grows_in_place() {
        let arena = Arena::new(&SYSTEM);
        let block = arena.alloc_raw(16, 8, false);
        let grown = arena.realloc_raw(block, 8, 64, 8, false);
        assert_eq!(grown.as_ptr(), block.as_ptr());
        assert_eq!(arena.used_bytes(), 64);
    }

    #[test]
    fn grow_in_place_zero_fills_only_the_tail() {
        let arena = Arena::new(&SYSTEM);
        let block = arena.alloc_raw(16, 8, false);
        // SAFETY: fresh allocation, exclusively owned.
        unsafe { block.as_mut_slice() }.fill(7);
        let grown = arena.realloc_raw(block, 8, 32, 8, true);
        // SAFETY: `grown` replaced `block`; exclusively owned.
        let bytes = unsafe { grown.as_slice() };
        assert!(bytes[..16].iter().all(|&b| b == 7));
        assert!(bytes[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn shrinking_most_recent_reclaims_the_tail() {
        let arena = Arena::new(&SYSTEM);
        let block = arena.alloc_raw(64, 8, false);
        let shrunk = arena.realloc_raw(block, 8, 16, 8, false);
        assert_eq!(shrunk.as_ptr(), block.as_ptr());
        assert_eq!(arena.used_bytes(), 16);
    }

    #[test]
    fn shrinking_interior_block_leaks_the_tail() {
        let arena = Arena::new(&SYSTEM);
        let first = arena.alloc_raw(64, 8, false);
        let _second = arena.alloc_raw(8, 8, false);
        let shrunk = arena.realloc_raw(first, 8, 16, 8, false);
        assert_eq!(shrunk.as_ptr(), first.as_ptr());
        // 64 + 8: the interior tail stays accounted until rollback.
        assert_eq!(arena.used_bytes(), 72);
    }

    #[test]
    fn growing_interior_block_moves_and_copies() {
        let arena = Arena::new(&SYSTEM);
        let first = arena.alloc_raw(16, 1, false);
        // SAFETY: fresh allocation, exclusively owned.
        unsafe { first.as_mut_slice() }.fill(3);
        let _second = arena.alloc_raw(8, 1, false);

        let moved = arena.realloc_raw(first, 1, 32, 1, false);
        assert_ne!(moved.as_ptr(), first.as_ptr());
        // SAFETY: `moved` replaced `first`; exclusively owned.
        assert!(unsafe { moved.as_slice() }[..16].iter().all(|&b| b == 3));
    }

    #[test]
    fn freeing_most_recent_rewinds_the_cursor() {
        let arena = Arena::new(&SYSTEM);
        let first = arena.alloc_raw(16, 1, false);
        let second = arena.alloc_raw(16, 1, false);
        arena.free(second, 1);
        assert_eq!(arena.used_bytes(), 16);
        arena.free(first, 1);
        assert_eq!(arena.used_bytes(), 0);
    }

    #[test]
    fn marker_round_trip_is_a_no_op() {
        let mut arena = Arena::new(&SYSTEM);
        arena.alloc_raw(100, 1, false);
        let marker = arena.marker();
        arena.reset_to(marker, false);
        assert_eq!(arena.marker(), marker);
        assert_eq!(arena.used_bytes(), 100);
    }

    #[test]
    fn reset_recycles_overflow_buckets() {
        // 512 bytes, then a marker, then 1024 bytes overflowing into a
        // second bucket, then a non-releasing rollback.
        let mut arena = Arena::with_min_bucket_size(&SYSTEM, 1024);
        arena.alloc_raw(512, 1, false);
        let marker = arena.marker();
        arena.alloc_raw(1024, 1, false);
        assert_eq!(arena.bucket_count(), 2);

        arena.reset_to(marker, false);
        assert_eq!(arena.marker(), marker);
        assert_eq!(arena.used_bytes(), 512);
        assert_eq!(arena.bucket_count(), 1);
        assert_eq!(arena.free_bucket_count(), 1);
    }

    #[test]
    fn recycled_bucket_is_reused_before_growing() {
        let mut arena = Arena::with_min_bucket_size(&SYSTEM, 1024);
        arena.alloc_raw(512, 1, false);
        let marker = arena.marker();
        arena.alloc_raw(1024, 1, false);
        arena.reset_to(marker, false);
        let capacity = arena.capacity_bytes();

        // The next overflow must come from the recycle list, not a grow.
        arena.alloc_raw(1024, 1, false);
        assert_eq!(arena.capacity_bytes(), capacity);
        assert_eq!(arena.free_bucket_count(), 0);
        assert_eq!(arena.bucket_count(), 2);
    }

    #[test]
    fn releasing_reset_returns_buckets() {
        let mut arena = Arena::with_min_bucket_size(&SYSTEM, 1024);
        arena.alloc_raw(512, 1, false);
        let marker = arena.marker();
        arena.alloc_raw(4096, 1, false);
        arena.reset_to(marker, true);
        assert_eq!(arena.free_bucket_count(), 0);
        assert_eq!(arena.capacity_bytes(), 1024);
    }

    #[test]
    fn empty_marker_resets_to_oldest_bucket() {
        let mut arena = Arena::with_min_bucket_size(&SYSTEM, 1024);
        arena.alloc_raw(1000, 1, false);
        arena.alloc_raw(1000, 1, false);
        arena.reset_to(Marker::default(), false);
        assert_eq!(arena.used_bytes(), 0);
        assert_eq!(arena.bucket_count(), 1);
        assert_eq!(arena.free_bucket_count(), 1);
    }

    #[test]
    fn clear_with_release_flushes_the_recycle_list() {
        let mut arena = Arena::with_min_bucket_size(&SYSTEM, 1024);
        arena.alloc_raw(1000, 1, false);
        arena.alloc_raw(1000, 1, false);
        arena.reset_to(Marker::default(), false);
        assert_eq!(arena.free_bucket_count(), 1);

        arena.clear(true);
        assert_eq!(arena.free_bucket_count(), 0);
        assert_eq!(arena.used_bytes(), 0);
    }

    #[test]
    fn linearize_single_bucket_is_zero_copy() {
        let arena = Arena::new(&SYSTEM);
        arena.push_bytes(b"warmup");
        let begin = arena.marker();
        let pushed = arena.push_bytes(b"contiguous");
        let end = arena.marker();

        let before = arena.used_bytes();
        let linear = arena.linearize(begin, end);
        assert_eq!(arena.used_bytes(), before, "fast path must not allocate");
        assert_eq!(linear.as_ptr(), pushed.as_ptr());
        // SAFETY: the block points into live bucket storage.
        assert_eq!(unsafe { linear.as_slice() }, b"contiguous");
    }

    #[test]
    fn linearize_spanning_buckets_concatenates() {
        let arena = Arena::with_min_bucket_size(&SYSTEM, 16);
        let begin = arena.marker();
        arena.push_bytes(b"abcdefgh");
        arena.push_bytes(b"ijklmnop");
        arena.push_bytes(b"qrstuvwx");
        let end = arena.marker();
        assert!(arena.bucket_count() > 1);

        let linear = arena.linearize(begin, end);
        // SAFETY: the block is a fresh arena allocation.
        assert_eq!(unsafe { linear.as_slice() }, b"abcdefghijklmnopqrstuvwx");
    }

    #[test]
    fn linearize_empty_range_is_empty() {
        let arena = Arena::new(&SYSTEM);
        arena.push_bytes(b"data");
        let marker = arena.marker();
        assert!(arena.linearize(marker, marker).is_empty());
        assert!(arena
            .linearize(Marker::default(), Marker::default())
            .is_empty());
    }

    #[test]
    fn linearize_from_empty_begin_covers_everything() {
        let arena = Arena::with_min_bucket_size(&SYSTEM, 8);
        arena.push_bytes(b"head");
        arena.push_bytes(b"tailtail");
        let end = arena.marker();
        let linear = arena.linearize(Marker::default(), end);
        // SAFETY: the block is a fresh arena allocation.
        assert_eq!(unsafe { linear.as_slice() }, b"headtailtail");
    }

    #[test]
    fn alloc_slice_copy_round_trips() {
        let arena = Arena::new(&SYSTEM);
        let values = arena.alloc_slice_copy(&[1u32, 2, 3, 4]);
        values[0] = 9;
        assert_eq!(values, &[9, 2, 3, 4]);
        assert_eq!(values.as_ptr() as usize % std::mem::align_of::<u32>(), 0);
    }

    #[test]
    fn arena_backs_the_allocator_protocol() {
        let arena = Arena::new(&SYSTEM);
        let handle: AllocRef<'_> = &arena;
        let block = handle.allocate(32, 8, true);
        assert!(!block.is_empty());
        let grown = handle.reallocate(block, 8, 64, 8, false);
        assert!(!grown.is_empty());
        handle.free(grown, 8);
        assert_eq!(arena.used_bytes(), 0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn marker_rollback_restores_used_bytes(
                before in proptest::collection::vec(1usize..128, 1..8),
                after in proptest::collection::vec(1usize..128, 1..8),
            ) {
                let mut arena = Arena::with_min_bucket_size(&SYSTEM, 64);
                for size in &before {
                    arena.alloc_raw(*size, 1, false);
                }
                let used = arena.used_bytes();
                let marker = arena.marker();
                for size in &after {
                    arena.alloc_raw(*size, 1, false);
                }
                arena.reset_to(marker, false);
                prop_assert_eq!(arena.used_bytes(), used);
                prop_assert_eq!(arena.marker(), marker);
            }

            #[test]
            fn linearize_matches_program_order(
                chunks in proptest::collection::vec(
                    proptest::collection::vec(any::<u8>(), 1..48),
                    1..12,
                ),
                min_bucket in 8usize..64,
            ) {
                let arena = Arena::with_min_bucket_size(&SYSTEM, min_bucket);
                let begin = arena.marker();
                let mut expected = Vec::new();
                for chunk in &chunks {
                    prop_assert!(!arena.push_bytes(chunk).is_empty());
                    expected.extend_from_slice(chunk);
                }
                let end = arena.marker();

                let linear = arena.linearize(begin, end);
                // SAFETY: the block is live arena storage.
                let actual = unsafe { linear.as_slice() };
                prop_assert_eq!(actual, expected.as_slice());
            }

            #[test]
            fn used_never_exceeds_capacity(
                sizes in proptest::collection::vec((1usize..256, 0u32..5), 1..32),
            ) {
                let arena = Arena::with_min_bucket_size(&SYSTEM, 32);
                for (size, align_pow) in sizes {
                    arena.alloc_raw(size, 1 << align_pow, false);
                    prop_assert!(arena.used_bytes() <= arena.capacity_bytes());
                }
            }
        }
    }
}
