//! Growable array backed by the allocator protocol.

use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use loam_alloc::{AllocError, AllocRef, Allocator, Block};

use crate::{alloc_failure, capacity_overflow};

/// Capacity policy: given the current capacity and the required minimum,
/// return the new capacity. The result is clamped up to the minimum.
pub type GrowthPolicy = fn(current: usize, required: usize) -> usize;

/// Amortized default: seed at 16 elements, then multiply by 1.5.
fn amortized_growth(current: usize, required: usize) -> usize {
    let mut cap = current.max(16);
    while cap < required {
        cap = cap.saturating_add(cap / 2);
    }
    cap
}

/// A growable array that takes all of its storage from an
/// [`AllocRef`](loam_alloc::AllocRef).
///
/// The element buffer is one allocation, reallocated on demand; capacity
/// follows the amortized default policy or a caller-supplied
/// [`GrowthPolicy`]. Beyond the `Vec`-like surface there is batch
/// insertion that constructs elements in place ([`Array::insert_with`],
/// [`Array::insert_from_slice`]) and both removal policies: order-
/// preserving shifting ([`Array::remove_n`]) and O(1) hole-filling from
/// the tail ([`Array::swap_remove_n`]).
///
/// Out-of-bounds indices panic. The infallible growth path aborts on
/// exhaustion the way `Vec` does; [`Array::try_reserve`] reports it as an
/// [`AllocError`] instead.
///
/// # Example
///
/// ```
/// use loam_alloc::SystemAllocator;
/// use loam_collections::Array;
///
/// let system = SystemAllocator;
/// let mut values = Array::new(&system);
/// values.extend_from_slice(&[1, 2, 4, 5]);
/// values.insert(2, 3);
/// assert_eq!(values.as_slice(), &[1, 2, 3, 4, 5]);
/// ```
pub struct Array<'a, T> {
    ptr: NonNull<T>,
    len: usize,
    cap: usize,
    alloc: AllocRef<'a>,
    growth: Option<GrowthPolicy>,
    _elems: PhantomData<T>,
}

impl<'a, T> Array<'a, T> {
    /// Create an empty array. No allocation happens until the first push.
    pub fn new(alloc: AllocRef<'a>) -> Array<'a, T> {
        Array {
            ptr: NonNull::dangling(),
            len: 0,
            cap: if mem::size_of::<T>() == 0 {
                usize::MAX
            } else {
                0
            },
            alloc,
            growth: None,
            _elems: PhantomData,
        }
    }

    /// Create an empty array with room for at least `capacity` elements.
    pub fn with_capacity(alloc: AllocRef<'a>, capacity: usize) -> Array<'a, T> {
        let mut array = Array::new(alloc);
        if let Err(err) = array.grow_to(capacity, true) {
            alloc_failure(err.size, err.align);
        }
        array
    }

    /// Create an empty array with a caller-supplied capacity policy.
    pub fn with_growth_policy(alloc: AllocRef<'a>, growth: GrowthPolicy) -> Array<'a, T> {
        let mut array = Array::new(alloc);
        array.growth = Some(growth);
        array
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the current allocation can hold.
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// The allocator this array draws from.
    pub fn allocator(&self) -> AllocRef<'a> {
        self.alloc
    }

    fn current_block(&self) -> Block {
        if self.cap == 0 || mem::size_of::<T>() == 0 {
            Block::EMPTY
        } else {
            Block::new(self.ptr.as_ptr().cast(), self.cap * mem::size_of::<T>())
        }
    }

    /// Reallocate so that `capacity >= min_cap`. `exact` skips the
    /// growth policy (used by `with_capacity`).
    fn grow_to(&mut self, min_cap: usize, exact: bool) -> Result<(), AllocError> {
        if min_cap <= self.cap {
            return Ok(());
        }
        debug_assert!(mem::size_of::<T>() != 0, "zero-sized elements never allocate");

        let new_cap = if exact {
            min_cap
        } else {
            let policy = self.growth.unwrap_or(amortized_growth);
            policy(self.cap, min_cap).max(min_cap)
        };
        let elem = mem::size_of::<T>();
        let bytes = match new_cap.checked_mul(elem) {
            Some(bytes) if bytes <= isize::MAX as usize => bytes,
            _ => capacity_overflow(),
        };
        let align = mem::align_of::<T>();
        let block = self
            .alloc
            .reallocate(self.current_block(), align, bytes, align, false);
        if block.is_empty() {
            return Err(AllocError { size: bytes, align });
        }
        // SAFETY: the allocator returned a non-empty block aligned for T.
        self.ptr = unsafe { NonNull::new_unchecked(block.as_ptr().cast::<T>()) };
        self.cap = new_cap;
        Ok(())
    }

    /// Ensure room for `additional` more elements, reporting failure.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), AllocError> {
        let required = match self.len.checked_add(additional) {
            Some(required) => required,
            None => capacity_overflow(),
        };
        self.grow_to(required, false)
    }

    /// Ensure room for `additional` more elements.
    pub fn reserve(&mut self, additional: usize) {
        if let Err(err) = self.try_reserve(additional) {
            alloc_failure(err.size, err.align);
        }
    }

    /// Append `value`.
    pub fn push(&mut self, value: T) {
        if self.len == self.cap {
            self.reserve(1);
        }
        // SAFETY: len < cap after the reserve above.
        unsafe { ptr::write(self.ptr.as_ptr().add(self.len), value) };
        self.len += 1;
    }

    /// Remove and return the last element.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: the element at the old last index is initialized and is
        // now outside the live range.
        Some(unsafe { ptr::read(self.ptr.as_ptr().add(self.len)) })
    }

    /// Shift the tail up to open `count` slots at `index`. The gap is
    /// uninitialized; callers must fill it before adjusting `len`.
    fn open_gap(&mut self, index: usize, count: usize) -> *mut T {
        assert!(
            index <= self.len,
            "insertion index (is {index}) must be <= len (is {})",
            self.len
        );
        self.reserve(count);
        let base = self.ptr.as_ptr();
        // SAFETY: capacity covers len + count; the vacated source
        // positions count as moved-from until the caller fills them.
        unsafe {
            let gap = base.add(index);
            if count > 0 {
                ptr::copy(gap, gap.add(count), self.len - index);
            }
            gap
        }
    }

    /// Insert `value` at `index`, shifting the tail up.
    pub fn insert(&mut self, index: usize, value: T) {
        let gap = self.open_gap(index, 1);
        // SAFETY: the gap holds exactly one vacant slot.
        unsafe { ptr::write(gap, value) };
        self.len += 1;
    }

    /// Insert `count` elements at `index`, constructing each in place
    /// with `f(i)`. One shift, no double initialization.
    pub fn insert_with(&mut self, index: usize, count: usize, mut f: impl FnMut(usize) -> T) {
        let old_len = self.len;
        let gap = self.open_gap(index, count);
        // A panicking constructor leaks the shifted tail rather than
        // double-dropping it.
        self.len = index;
        for i in 0..count {
            // SAFETY: the gap holds `count` vacant slots.
            unsafe { ptr::write(gap.add(i), f(i)) };
        }
        self.len = old_len + count;
    }

    /// Insert a copy of `src` at `index` with a single shift.
    pub fn insert_from_slice(&mut self, index: usize, src: &[T])
    where
        T: Copy,
    {
        let gap = self.open_gap(index, src.len());
        // SAFETY: the gap holds src.len() vacant slots, and `src` cannot
        // alias them — the gap is uninitialized spare capacity.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), gap, src.len()) };
        self.len += src.len();
    }

    /// Append a copy of `src`.
    pub fn extend_from_slice(&mut self, src: &[T])
    where
        T: Copy,
    {
        let len = self.len;
        self.insert_from_slice(len, src);
    }

    /// Remove `count` elements starting at `index`, preserving the order
    /// of the rest.
    pub fn remove_n(&mut self, index: usize, count: usize) {
        assert!(
            count <= self.len && index <= self.len - count,
            "removal range {index}..{index}+{count} out of bounds (len {})",
            self.len
        );
        let old_len = self.len;
        let base = self.ptr.as_ptr();
        // A panicking Drop leaks the tail rather than double-dropping it.
        self.len = index;
        unsafe {
            // SAFETY: [index, index + count) is initialized and now
            // outside the live range.
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(base.add(index), count));
            // SAFETY: the tail shifts down within the allocation.
            ptr::copy(
                base.add(index + count),
                base.add(index),
                old_len - index - count,
            );
        }
        self.len = old_len - count;
    }

    /// Remove `count` elements starting at `index` by relocating the
    /// tail-most elements into the hole. O(count), order not preserved.
    pub fn swap_remove_n(&mut self, index: usize, count: usize) {
        assert!(
            count <= self.len && index <= self.len - count,
            "removal range {index}..{index}+{count} out of bounds (len {})",
            self.len
        );
        let old_len = self.len;
        let base = self.ptr.as_ptr();
        self.len = index;
        unsafe {
            // SAFETY: [index, index + count) is initialized and now
            // outside the live range.
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(base.add(index), count));
            // SAFETY: the moved suffix starts at or after index + count,
            // so source and hole never overlap.
            let tail_len = old_len - index - count;
            let moved = count.min(tail_len);
            ptr::copy_nonoverlapping(base.add(old_len - moved), base.add(index), moved);
        }
        self.len = old_len - count;
    }

    /// Remove and return the element at `index`, shifting the tail down.
    pub fn remove(&mut self, index: usize) -> T {
        assert!(
            index < self.len,
            "index (is {index}) out of bounds (len {})",
            self.len
        );
        let base = self.ptr.as_ptr();
        // SAFETY: `index` is in bounds; the read slot is refilled by the
        // shift before it re-enters the live range.
        unsafe {
            let value = ptr::read(base.add(index));
            ptr::copy(base.add(index + 1), base.add(index), self.len - index - 1);
            self.len -= 1;
            value
        }
    }

    /// Remove and return the element at `index`, moving the last element
    /// into its place. O(1), order not preserved.
    pub fn swap_remove(&mut self, index: usize) -> T {
        assert!(
            index < self.len,
            "index (is {index}) out of bounds (len {})",
            self.len
        );
        let base = self.ptr.as_ptr();
        // SAFETY: `index` is in bounds; the last element refills the hole
        // (a self-copy when index is the last element).
        unsafe {
            let value = ptr::read(base.add(index));
            self.len -= 1;
            ptr::copy(base.add(self.len), base.add(index), 1);
            value
        }
    }

    /// Drop every element past `new_len`.
    pub fn truncate(&mut self, new_len: usize) {
        if new_len >= self.len {
            return;
        }
        let old_len = self.len;
        self.len = new_len;
        // SAFETY: [new_len, old_len) is initialized and now outside the
        // live range.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                self.ptr.as_ptr().add(new_len),
                old_len - new_len,
            ))
        };
    }

    /// Drop every element, keeping the allocation.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// The live elements as a slice.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the first `len` elements are initialized; the dangling
        // pointer is valid for the empty and zero-sized cases.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The live elements as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as for `as_slice`, with exclusive access via `&mut self`.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// The uninitialized capacity past the live elements, for callers
    /// that construct in place and then commit with [`Array::set_len`].
    pub fn spare_capacity_mut(&mut self) -> &mut [MaybeUninit<T>] {
        // SAFETY: [len, cap) is allocated; exposing it as MaybeUninit
        // makes no claim about its contents.
        unsafe {
            slice::from_raw_parts_mut(
                self.ptr.as_ptr().add(self.len).cast::<MaybeUninit<T>>(),
                self.cap - self.len,
            )
        }
    }

    /// Set the live length directly.
    ///
    /// # Safety
    ///
    /// `new_len` must not exceed the capacity, and the first `new_len`
    /// elements must be initialized.
    pub unsafe fn set_len(&mut self, new_len: usize) {
        debug_assert!(new_len <= self.cap, "len must not exceed capacity");
        self.len = new_len;
    }
}

impl<T> Deref for Array<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for Array<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: fmt::Debug> fmt::Debug for Array<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Drop for Array<'_, T> {
    fn drop(&mut self) {
        self.clear();
        let block = self.current_block();
        if !block.is_empty() {
            self.alloc.free(block, mem::align_of::<T>());
        }
    }
}
