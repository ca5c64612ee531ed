//! Allocator-aware containers for the Loam memory toolkit.
//!
//! Both containers here take their memory exclusively through an
//! [`AllocRef`](loam_alloc::AllocRef) handed in at construction — there
//! is no ambient global allocator anywhere in this workspace:
//!
//! - [`Array`]: a growable array with an amortized (or caller-supplied)
//!   capacity policy, batch insertion, and both order-preserving and
//!   swap-based removal.
//! - [`HashMap`]: an open-addressing hash map with linear probing and
//!   tombstone-aware lookups.
//!
//! This crate is one of three in the workspace that contain bounded
//! `unsafe` code (along with `loam-alloc` and `loam-arena`).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod array;
mod map;

pub use array::{Array, GrowthPolicy};
pub use map::{HashMap, Iter};

/// Requested element count can no longer be expressed in bytes.
#[cold]
pub(crate) fn capacity_overflow() -> ! {
    panic!("capacity overflow");
}

/// Infallible-path allocation failure: abort the way `Vec` does.
#[cold]
pub(crate) fn alloc_failure(size: usize, align: usize) -> ! {
    match std::alloc::Layout::from_size_align(size.max(1), align) {
        Ok(layout) => std::alloc::handle_alloc_error(layout),
        Err(_) => panic!("allocation failed: {size} bytes, align {align}"),
    }
}
