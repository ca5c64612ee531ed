//! Loam: a manual-memory foundation layer.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Loam sub-crates. For most users, adding `loam` as a single dependency is
//! sufficient.
//!
//! Everything in Loam is built over one abstraction: the allocator protocol
//! ([`Allocator`](loam_alloc::Allocator)), a single polymorphic resize
//! operation covering allocate, reallocate, and free. Allocators are passed
//! explicitly as [`AllocRef`](loam_alloc::AllocRef) capabilities — there is
//! no ambient global — and exhaustion is signalled in-band by an empty
//! [`Block`](loam_alloc::Block), never by panic. The whole toolkit is
//! single-threaded and caller-disciplined: reclamation is explicit, and an
//! arena reclaims only in bulk.
//!
//! # Quick start
//!
//! ```rust
//! use loam::prelude::*;
//!
//! let system = SystemAllocator;
//!
//! // Containers take their allocator explicitly.
//! let mut values = Array::new(&system);
//! let mut index: HashMap<'_, u64, usize> = HashMap::new(&system);
//! for (i, value) in [10u64, 20, 30].into_iter().enumerate() {
//!     values.push(value);
//!     index.insert(value, i);
//! }
//! assert_eq!(index.get(&20), Some(&1));
//!
//! // An arena is an allocator too: bump-allocate, then roll back in bulk.
//! let mut arena = Arena::new(&system);
//! let marker = arena.marker();
//! let scratch = arena.alloc_slice_copy(values.as_slice());
//! assert_eq!(scratch, &[10, 20, 30]);
//! arena.reset_to(marker, false);
//! assert_eq!(arena.used_bytes(), 0);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`alloc`] | `loam-alloc` | `Block`, the `Allocator` trait, system and fixed-buffer allocators |
//! | [`arena`] | `loam-arena` | Bucket-chain `Arena`, `Marker`, rollback and linearization |
//! | [`collections`] | `loam-collections` | `Array` and `HashMap` over the protocol |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Allocator protocol and reference allocators (`loam-alloc`).
///
/// Home of [`alloc::Block`], the [`alloc::Allocator`] trait and its
/// [`alloc::AllocRef`] handle alias, [`alloc::SystemAllocator`], and
/// [`alloc::FixedBufferAllocator`].
pub use loam_alloc as alloc;

/// Bucket-chain arena allocation (`loam-arena`).
///
/// An [`arena::Arena`] bump-allocates from a chain of buckets and reclaims
/// in bulk through [`arena::Marker`] rollback; it implements the allocator
/// protocol, so it can back anything that takes an
/// [`alloc::AllocRef`].
pub use loam_arena as arena;

/// Allocator-aware containers (`loam-collections`).
///
/// [`collections::Array`] is the growable array;
/// [`collections::HashMap`] is the open-addressing, tombstone-probing
/// hash map.
pub use loam_collections as collections;

/// Common imports for typical Loam usage.
///
/// ```rust
/// use loam::prelude::*;
/// ```
///
/// This imports the allocator protocol surface, the reference allocators,
/// the arena with its markers, and both containers.
pub mod prelude {
    // Allocator protocol
    pub use loam_alloc::{
        AllocError, AllocRef, Allocator, Block, FixedBufferAllocator, SystemAllocator,
    };

    // Arena
    pub use loam_arena::{Arena, Marker};

    // Containers
    pub use loam_collections::{Array, GrowthPolicy, HashMap};
}
