//! Fixed-buffer bump allocator.

use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr;

use crate::{align_up, Allocator, Block};

/// Bump allocator over a caller-owned byte buffer.
///
/// Hands out memory from the front of the buffer and never gives any of
/// it back early: only the single most recent allocation can grow or
/// shrink in place, and only freeing that allocation rewinds the cursor.
/// Growing any other block allocates fresh from the tail and copies;
/// freeing or shrinking any other block leaks the bytes until
/// [`reset`](FixedBufferAllocator::reset).
///
/// Useful as scratch space with a hard ceiling — exhaustion returns the
/// empty block, it never spills to the heap.
pub struct FixedBufferAllocator<'b> {
    base: *mut u8,
    capacity: usize,
    used: Cell<usize>,
    /// Most recent allocation, the only one eligible for in-place resize.
    last: Cell<Block>,
    _buffer: PhantomData<&'b mut [u8]>,
}

impl<'b> FixedBufferAllocator<'b> {
    /// Wrap a caller-owned buffer.
    ///
    /// The allocator borrows the buffer for its whole lifetime and hands
    /// its bytes out through the protocol.
    pub fn new(buffer: &'b mut [u8]) -> FixedBufferAllocator<'b> {
        FixedBufferAllocator {
            base: buffer.as_mut_ptr(),
            capacity: buffer.len(),
            used: Cell::new(0),
            last: Cell::new(Block::EMPTY),
            _buffer: PhantomData,
        }
    }

    /// Bytes consumed so far, including alignment padding.
    pub fn used(&self) -> usize {
        self.used.get()
    }

    /// Total size of the underlying buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget every allocation and start over from the front.
    ///
    /// Takes `&mut self` so no shared handle can still be allocating;
    /// blocks handed out earlier are invalidated and must not be used.
    pub fn reset(&mut self) {
        self.used.set(0);
        self.last.set(Block::EMPTY);
    }

    fn bump(&self, size: usize, align: usize, zero: bool) -> Block {
        let addr = self.base as usize + self.used.get();
        let aligned = align_up(addr, align);
        let pad = aligned - addr;
        let needed = match pad.checked_add(size) {
            Some(needed) => needed,
            None => return Block::EMPTY,
        };
        if needed > self.capacity - self.used.get() {
            return Block::EMPTY;
        }
        // SAFETY: `aligned` lies within the buffer; the fit check above
        // guarantees `size` bytes from it are in bounds.
        let ptr = unsafe { self.base.add(self.used.get() + pad) };
        self.used.set(self.used.get() + needed);
        if zero {
            // SAFETY: the fresh range [ptr, ptr + size) is in bounds.
            unsafe { ptr::write_bytes(ptr, 0, size) };
        }
        let block = Block::new(ptr, size);
        self.last.set(block);
        block
    }

    fn is_last(&self, block: Block) -> bool {
        let last = self.last.get();
        !last.is_empty() && last.as_ptr() == block.as_ptr() && last.len() == block.len()
    }
}

impl Allocator for FixedBufferAllocator<'_> {
    fn resize(
        &self,
        old: Block,
        old_align: usize,
        new_size: usize,
        new_align: usize,
        zero: bool,
    ) -> Block {
        debug_assert!(
            old_align.is_power_of_two() && new_align.is_power_of_two(),
            "alignments must be powers of two"
        );

        if new_size == 0 {
            if !old.is_empty() && self.is_last(old) {
                // Rewind the cursor over the most recent allocation.
                self.used.set(old.as_ptr() as usize - self.base as usize);
                self.last.set(Block::EMPTY);
            }
            return Block::EMPTY;
        }

        if old.is_empty() {
            return self.bump(new_size, new_align, zero);
        }

        let aligned_ok = old.as_ptr() as usize % new_align == 0;
        if self.is_last(old) && aligned_ok {
            let start = old.as_ptr() as usize - self.base as usize;
            if new_size <= old.len() {
                // Shrink in place, reclaiming the tail.
                self.used.set(start + new_size);
                let block = Block::new(old.as_ptr(), new_size);
                self.last.set(block);
                return block;
            }
            if new_size <= self.capacity - start {
                // Grow in place.
                self.used.set(start + new_size);
                if zero {
                    // SAFETY: the tail [old.len, new_size) is in bounds of
                    // the buffer per the fit check above.
                    unsafe { ptr::write_bytes(old.as_ptr().add(old.len()), 0, new_size - old.len()) };
                }
                let block = Block::new(old.as_ptr(), new_size);
                self.last.set(block);
                return block;
            }
        }

        if new_size <= old.len() && aligned_ok {
            // Interior shrink: the freed tail is leaked until reset.
            return Block::new(old.as_ptr(), new_size);
        }

        // Grow by moving: fresh allocation from the tail, copy forward.
        let fresh = self.bump(new_size, new_align, false);
        if fresh.is_empty() {
            return Block::EMPTY;
        }
        let preserved = old.len().min(new_size);
        // SAFETY: `fresh` comes from the unused tail, so the regions are
        // disjoint and each covers at least `preserved` bytes.
        unsafe { ptr::copy_nonoverlapping(old.as_ptr(), fresh.as_ptr(), preserved) };
        if zero && new_size > preserved {
            // SAFETY: the tail [preserved, new_size) is in bounds of `fresh`.
            unsafe { ptr::write_bytes(fresh.as_ptr().add(preserved), 0, new_size - preserved) };
        }
        fresh
    }
}
