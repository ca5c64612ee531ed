//! Bucket-chain arena allocation for the Loam memory toolkit.
//!
//! An [`Arena`] is a bump allocator backed by a chain of buckets acquired
//! from a backing [`Allocator`](loam_alloc::Allocator). Allocation is a
//! cursor bump; reclamation happens only in bulk, by rolling the arena
//! back to a previously captured [`Marker`] or clearing it outright.
//! Because the arena itself implements the allocator protocol, it can
//! back anything that takes an [`AllocRef`](loam_alloc::AllocRef) —
//! arrays, hash maps, or another arena.
//!
//! # Architecture
//!
//! ```text
//! Arena
//! ├── BucketTable (contiguous slot table; links are indices)
//! │   ├── live chain: current → prev → … → oldest
//! │   └── recycle list: buckets retained by a non-releasing rollback
//! └── backing AllocRef (bucket storage source)
//! ```
//!
//! Buckets are table entries rather than a pointer-linked list, so a
//! stale [`Marker`] can produce a wrong rollback but never undefined
//! behavior.
//!
//! This crate is one of three in the workspace that contain bounded
//! `unsafe` code (along with `loam-alloc` and `loam-collections`).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod arena;
mod bucket;
mod marker;

pub use arena::Arena;
pub use marker::Marker;
