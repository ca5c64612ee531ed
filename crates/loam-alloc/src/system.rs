//! System-heap allocator.

use std::alloc::{alloc, alloc_zeroed, dealloc, realloc, Layout};
use std::ptr;

use crate::{Allocator, Block};

/// Allocator backed by the system heap (`std::alloc`).
///
/// The stateless default backing for arenas and containers. `Layout`
/// carries the alignment on every call, so allocation and free honour
/// over-aligned requests directly. The one gap is `realloc`, which keeps
/// the original layout's alignment — an alignment-raising resize
/// therefore allocates fresh, copies, and frees the old block. Returned
/// pointers are checked against the requested alignment in debug builds.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAllocator;

impl SystemAllocator {
    #[inline]
    fn layout(size: usize, align: usize) -> Option<Layout> {
        Layout::from_size_align(size, align).ok()
    }
}

impl Allocator for SystemAllocator {
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
            if !old.is_empty() {
                let layout = match Self::layout(old.len(), old_align) {
                    Some(layout) => layout,
                    None => return Block::EMPTY,
                };
                // SAFETY: `old` was allocated by this allocator with
                // exactly this size and alignment.
                unsafe { dealloc(old.as_ptr(), layout) };
            }
            return Block::EMPTY;
        }

        if old.is_empty() {
            let layout = match Self::layout(new_size, new_align) {
                Some(layout) => layout,
                None => return Block::EMPTY,
            };
            // SAFETY: `layout` has non-zero size.
            let ptr = unsafe {
                if zero {
                    alloc_zeroed(layout)
                } else {
                    alloc(layout)
                }
            };
            if ptr.is_null() {
                return Block::EMPTY;
            }
            debug_assert_eq!(ptr as usize % new_align, 0, "misaligned allocation");
            return Block::new(ptr, new_size);
        }

        if new_align <= old_align {
            let old_layout = match Self::layout(old.len(), old_align) {
                Some(layout) => layout,
                None => return Block::EMPTY,
            };
            if Self::layout(new_size, old_align).is_none() {
                return Block::EMPTY;
            }
            // SAFETY: `old` is live with `old_layout`, and `new_size` was
            // validated against the layout rules just above.
            let new_ptr = unsafe { realloc(old.as_ptr(), old_layout, new_size) };
            if new_ptr.is_null() {
                return Block::EMPTY;
            }
            if zero && new_size > old.len() {
                // SAFETY: the tail [old.len, new_size) is in bounds of the
                // reallocated block.
                unsafe { ptr::write_bytes(new_ptr.add(old.len()), 0, new_size - old.len()) };
            }
            debug_assert_eq!(new_ptr as usize % new_align, 0, "misaligned reallocation");
            return Block::new(new_ptr, new_size);
        }

        // Alignment raised: realloc cannot change alignment, so move the
        // block by hand.
        let fresh = self.allocate(new_size, new_align, false);
        if fresh.is_empty() {
            return Block::EMPTY;
        }
        let preserved = old.len().min(new_size);
        // SAFETY: both regions are live and disjoint, and each covers at
        // least `preserved` bytes.
        unsafe { ptr::copy_nonoverlapping(old.as_ptr(), fresh.as_ptr(), preserved) };
        if zero && new_size > preserved {
            // SAFETY: the tail [preserved, new_size) is in bounds of `fresh`.
            unsafe { ptr::write_bytes(fresh.as_ptr().add(preserved), 0, new_size - preserved) };
        }
        self.free(old, old_align);
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_write_free_round_trip() {
        let system = SystemAllocator;
        let block = system.allocate(64, 8, false);
        assert!(!block.is_empty());
        assert_eq!(block.len(), 64);
        // SAFETY: fresh allocation, exclusively owned by this test.
        let bytes = unsafe { block.as_mut_slice() };
        bytes.fill(0xAB);
        assert!(bytes.iter().all(|&b| b == 0xAB));
        system.free(block, 8);
    }

    #[test]
    fn zeroed_allocation_is_zeroed() {
        let system = SystemAllocator;
        let block = system.allocate(128, 16, true);
        // SAFETY: fresh allocation, exclusively owned by this test.
        let bytes = unsafe { block.as_slice() };
        assert!(bytes.iter().all(|&b| b == 0));
        system.free(block, 16);
    }

    #[test]
    fn grow_preserves_prefix_and_zeroes_tail() {
        let system = SystemAllocator;
        let block = system.allocate(16, 8, false);
        // SAFETY: fresh allocation, exclusively owned.
        unsafe { block.as_mut_slice() }.fill(7);

        let grown = system.reallocate(block, 8, 64, 8, true);
        assert_eq!(grown.len(), 64);
        // SAFETY: `grown` replaced `block`; exclusively owned.
        let bytes = unsafe { grown.as_slice() };
        assert!(bytes[..16].iter().all(|&b| b == 7));
        assert!(bytes[16..].iter().all(|&b| b == 0));
        system.free(grown, 8);
    }

    #[test]
    fn shrink_preserves_prefix() {
        let system = SystemAllocator;
        let block = system.allocate(64, 8, false);
        // SAFETY: fresh allocation, exclusively owned.
        let bytes = unsafe { block.as_mut_slice() };
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }

        let shrunk = system.reallocate(block, 8, 8, 8, false);
        assert_eq!(shrunk.len(), 8);
        // SAFETY: `shrunk` replaced `block`; exclusively owned.
        let bytes = unsafe { shrunk.as_slice() };
        assert_eq!(bytes, &[0, 1, 2, 3, 4, 5, 6, 7]);
        system.free(shrunk, 8);
    }

    #[test]
    fn raising_alignment_moves_and_aligns() {
        let system = SystemAllocator;
        let block = system.allocate(32, 8, false);
        // SAFETY: fresh allocation, exclusively owned.
        unsafe { block.as_mut_slice() }.fill(3);

        let moved = system.reallocate(block, 8, 32, 1024, false);
        assert!(!moved.is_empty());
        assert_eq!(moved.as_ptr() as usize % 1024, 0);
        // SAFETY: `moved` replaced `block`; exclusively owned.
        assert!(unsafe { moved.as_slice() }.iter().all(|&b| b == 3));
        system.free(moved, 1024);
    }

    #[test]
    fn over_aligned_allocation_honours_alignment() {
        let system = SystemAllocator;
        for align in [64usize, 256, 4096] {
            let block = system.allocate(16, align, false);
            assert_eq!(block.as_ptr() as usize % align, 0);
            system.free(block, align);
        }
    }

    #[test]
    fn free_through_resize_returns_empty() {
        let system = SystemAllocator;
        let block = system.allocate(8, 8, false);
        let result = system.resize(block, 8, 0, 8, false);
        assert!(result.is_empty());
    }
}
