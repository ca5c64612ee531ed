//! Allocation failure reporting for fallible container paths.

use std::error::Error;
use std::fmt;

/// An allocator returned the empty block for a request.
///
/// The protocol itself signals exhaustion in-band
/// ([`Block::EMPTY`](crate::Block::EMPTY)); this type exists for the
/// surfaces that report the failure to the caller instead of aborting,
/// such as `Array::try_reserve` in `loam-collections`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocError {
    /// Number of bytes requested.
    pub size: usize,
    /// Requested alignment.
    pub align: usize,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allocation failed: {} bytes, align {}",
            self.size, self.align
        )
    }
}

impl Error for AllocError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_size_and_align() {
        let err = AllocError {
            size: 4096,
            align: 16,
        };
        assert_eq!(err.to_string(), "allocation failed: 4096 bytes, align 16");
    }
}
