//! The allocator protocol trait and the shared handle alias.

use crate::Block;

/// Shared allocator capability.
///
/// The handle every container and arena stores. It is a plain `Copy`
/// trait-object reference, so one allocator can back arbitrarily many
/// consumers at once; dispatch goes through the vtable. Protocol methods
/// take `&self` — implementations that need state use interior
/// mutability, which is sound here because the whole toolkit is
/// single-threaded and externally serialized by the caller.
pub type AllocRef<'a> = &'a dyn Allocator;

/// The allocator protocol: one polymorphic resize operation.
///
/// [`resize`](Allocator::resize) subsumes allocation, reallocation, and
/// free. The convenience methods [`allocate`](Allocator::allocate),
/// [`reallocate`](Allocator::reallocate), and [`free`](Allocator::free)
/// are thin wrappers over it and form the three-operation surface the
/// rest of the workspace calls through.
///
/// # Contract
///
/// - `old` empty, `new_size > 0`: allocate `new_size` bytes aligned to
///   `new_align`.
/// - `old` non-empty, `new_size == 0`: free `old`; the return value is
///   [`Block::EMPTY`] and is not meaningful.
/// - Both non-empty: resize. The implementation may move the bytes or
///   adjust the allocation in place; either way the first
///   `min(old.len(), new_size)` bytes are preserved.
/// - `zero` zero-fills the whole block on a fresh allocation, and only
///   the newly added tail bytes on growth.
/// - Failure is signalled by returning [`Block::EMPTY`]; the old block
///   is left untouched and stays live. There is no error path and no
///   panic for exhaustion — callers must check.
/// - Alignments must be powers of two, and `old_align` must be the
///   alignment `old` was requested with.
pub trait Allocator {
    /// The single polymorphic operation; see the trait-level contract.
    fn resize(
        &self,
        old: Block,
        old_align: usize,
        new_size: usize,
        new_align: usize,
        zero: bool,
    ) -> Block;

    /// Allocate a fresh block of `size` bytes aligned to `align`.
    fn allocate(&self, size: usize, align: usize, zero: bool) -> Block {
        self.resize(Block::EMPTY, align, size, align, zero)
    }

    /// Resize `old` to `new_size` bytes aligned to `new_align`.
    fn reallocate(
        &self,
        old: Block,
        old_align: usize,
        new_size: usize,
        new_align: usize,
        zero: bool,
    ) -> Block {
        self.resize(old, old_align, new_size, new_align, zero)
    }

    /// Return `block` to the allocator.
    fn free(&self, block: Block, align: usize) {
        self.resize(block, align, 0, align, false);
    }
}
