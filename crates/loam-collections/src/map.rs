//! Open-addressing hash map backed by the allocator protocol.

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};

use loam_alloc::{AllocRef, Allocator, Block};

use crate::{alloc_failure, capacity_overflow};

/// State of one probe slot.
///
/// `Free` is the all-zeroes state, so a zero-filled slot allocation
/// starts fully free.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum SlotState {
    /// Never held an entry since the last rebuild; terminates every
    /// probe sequence.
    Free = 0,
    /// Holds a live key/value pair.
    Occupied = 1,
    /// Tombstone left by a removal. Lookups walk through it; insertions
    /// may reclaim it.
    Dead = 2,
}

/// Outcome of probing for an insertion slot.
enum InsertSlot {
    /// The key is already present at this index.
    Existing(usize),
    /// Claim this index for a new entry.
    Vacant(usize),
    /// A full pass found neither the key nor a claimable slot.
    Full,
}

/// Capacity floor for the first allocation; growth doubles from here.
const MIN_CAPACITY: usize = 64;

/// Proactive load-factor check: grow before the next insertion would
/// reach 70% occupancy. Integer form of `count + 1 < 0.7 × capacity`.
fn needs_grow(count: usize, capacity: usize) -> bool {
    (count + 1) * 10 >= capacity * 7
}

/// Allocate one parallel component array of `capacity` elements.
///
/// Aborts through `alloc_failure` on exhaustion; zero-sized element
/// types never allocate.
fn alloc_component<T>(alloc: AllocRef<'_>, capacity: usize, zero: bool) -> NonNull<T> {
    if mem::size_of::<T>() == 0 {
        return NonNull::dangling();
    }
    let bytes = match capacity.checked_mul(mem::size_of::<T>()) {
        Some(bytes) if bytes <= isize::MAX as usize => bytes,
        _ => capacity_overflow(),
    };
    let align = mem::align_of::<T>();
    let block = alloc.allocate(bytes, align, zero);
    if block.is_empty() {
        alloc_failure(bytes, align);
    }
    // SAFETY: the allocator returned a non-empty block aligned for T.
    unsafe { NonNull::new_unchecked(block.as_ptr().cast::<T>()) }
}

/// Return one parallel component array to the allocator.
fn free_component<T>(alloc: AllocRef<'_>, ptr: NonNull<T>, capacity: usize) {
    if capacity == 0 || mem::size_of::<T>() == 0 {
        return;
    }
    let block = Block::new(ptr.as_ptr().cast(), capacity * mem::size_of::<T>());
    alloc.free(block, mem::align_of::<T>());
}

/// An open-addressing hash map that takes all of its storage from an
/// [`AllocRef`](loam_alloc::AllocRef).
///
/// Entries live in three parallel arrays — slot states, keys, values —
/// probed linearly from `hash(key) mod capacity`. Removal leaves a
/// tombstone rather than shifting entries, and lookups walk *through*
/// tombstones, stopping only on a free slot or a key match; that
/// asymmetry is what keeps every live key reachable no matter how many
/// removals happened along its probe path. Growth is proactive (before
/// an insertion would reach 70% occupancy) and rebuilds the table
/// wholesale: new storage, every live entry re-inserted at its new home
/// slot, old storage freed last. Capacity never shrinks.
///
/// Hashing and equality come from the usual `Hash + Eq` bounds plus a
/// pluggable [`BuildHasher`], so probe sequences can be pinned down in
/// tests with a deterministic hasher.
///
/// # Example
///
/// ```
/// use loam_alloc::SystemAllocator;
/// use loam_collections::HashMap;
///
/// let system = SystemAllocator;
/// let mut ages: HashMap<'_, &str, u32> = HashMap::new(&system);
/// ages.insert("ada", 36);
/// ages.insert("grace", 85);
/// assert_eq!(ages.get(&"ada"), Some(&36));
/// assert_eq!(ages.remove(&"ada"), Some(36));
/// assert_eq!(ages.len(), 1);
/// ```
pub struct HashMap<'a, K, V, S = RandomState> {
    slots: NonNull<SlotState>,
    keys: NonNull<K>,
    values: NonNull<V>,
    count: usize,
    cap: usize,
    alloc: AllocRef<'a>,
    hasher: S,
    _entries: PhantomData<(K, V)>,
}

impl<'a, K, V> HashMap<'a, K, V> {
    /// Create an empty map with a randomly seeded hasher. No allocation
    /// happens until the first insertion.
    pub fn new(alloc: AllocRef<'a>) -> HashMap<'a, K, V> {
        HashMap::with_hasher(alloc, RandomState::new())
    }
}

impl<'a, K, V, S> HashMap<'a, K, V, S> {
    /// Create an empty map using `hasher` to place keys.
    pub fn with_hasher(alloc: AllocRef<'a>, hasher: S) -> HashMap<'a, K, V, S> {
        HashMap {
            slots: NonNull::dangling(),
            keys: NonNull::dangling(),
            values: NonNull::dangling(),
            count: 0,
            cap: 0,
            alloc,
            hasher,
            _entries: PhantomData,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of slots in the current table.
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// The allocator this map draws from.
    pub fn allocator(&self) -> AllocRef<'a> {
        self.alloc
    }

    /// The hasher used to place keys.
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Iterate over the live entries in slot order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: self.slots.as_ptr(),
            keys: self.keys.as_ptr(),
            values: self.values.as_ptr(),
            index: 0,
            remaining: self.count,
            _entries: PhantomData,
        }
    }

    /// Drop every entry and mark every slot free, keeping the storage.
    pub fn clear(&mut self) {
        for index in 0..self.cap {
            // SAFETY: `index < cap`; occupied slots hold initialized
            // pairs, which leave the live set before being dropped.
            unsafe {
                let slot = self.slots.as_ptr().add(index);
                let state = *slot;
                *slot = SlotState::Free;
                if state == SlotState::Occupied {
                    ptr::drop_in_place(self.keys.as_ptr().add(index));
                    ptr::drop_in_place(self.values.as_ptr().add(index));
                }
            }
        }
        self.count = 0;
    }

    fn slot(&self, index: usize) -> SlotState {
        debug_assert!(index < self.cap);
        // SAFETY: `index < cap` and the slot array is always initialized.
        unsafe { *self.slots.as_ptr().add(index) }
    }

    fn release_storage(&mut self) {
        free_component(self.alloc, self.slots, self.cap);
        free_component(self.alloc, self.keys, self.cap);
        free_component(self.alloc, self.values, self.cap);
    }
}

impl<'a, K, V, S> HashMap<'a, K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn home_slot(&self, key: &K, capacity: usize) -> usize {
        self.hasher.hash_one(key) as usize % capacity
    }

    /// Probe for `key`, walking through tombstones. Returns the index of
    /// the matching occupied slot, or `None` after hitting a free slot
    /// or completing a full pass.
    fn probe_find(&self, key: &K) -> Option<usize> {
        if self.cap == 0 {
            return None;
        }
        let home = self.home_slot(key, self.cap);
        for step in 0..self.cap {
            let index = (home + step) % self.cap;
            match self.slot(index) {
                SlotState::Free => return None,
                // Stopping at a tombstone would strand any key whose
                // probe path crossed a later removal.
                SlotState::Dead => {}
                SlotState::Occupied => {
                    // SAFETY: occupied slots hold initialized keys.
                    if unsafe { &*self.keys.as_ptr().add(index) } == key {
                        return Some(index);
                    }
                }
            }
        }
        None
    }

    /// Probe for somewhere to put `key`. The first tombstone on the path
    /// is remembered and claimed once the probe has ruled out an
    /// existing match, so a key can never end up occupying two slots.
    fn probe_insert(&self, key: &K) -> InsertSlot {
        debug_assert!(self.cap > 0);
        let home = self.home_slot(key, self.cap);
        let mut first_dead = None;
        for step in 0..self.cap {
            let index = (home + step) % self.cap;
            match self.slot(index) {
                SlotState::Free => return InsertSlot::Vacant(first_dead.unwrap_or(index)),
                SlotState::Dead => {
                    if first_dead.is_none() {
                        first_dead = Some(index);
                    }
                }
                SlotState::Occupied => {
                    // SAFETY: occupied slots hold initialized keys.
                    if unsafe { &*self.keys.as_ptr().add(index) } == key {
                        return InsertSlot::Existing(index);
                    }
                }
            }
        }
        // Full pass with no free slot: the key is provably absent, so a
        // remembered tombstone is safe to claim. A table with no
        // tombstones either is genuinely full.
        match first_dead {
            Some(index) => InsertSlot::Vacant(index),
            None => InsertSlot::Full,
        }
    }

    /// Rebuild the table at `max(64, capacity × 2)` slots.
    ///
    /// Every live entry is re-inserted at its home slot against the new
    /// capacity; tombstones do not survive the rebuild. The old storage
    /// is freed only after the last entry has moved.
    fn grow(&mut self) {
        let new_cap = (self.cap * 2).max(MIN_CAPACITY);
        let new_slots: NonNull<SlotState> = alloc_component(self.alloc, new_cap, true);
        let new_keys: NonNull<K> = alloc_component(self.alloc, new_cap, false);
        let new_values: NonNull<V> = alloc_component(self.alloc, new_cap, false);

        for index in 0..self.cap {
            if self.slot(index) != SlotState::Occupied {
                continue;
            }
            // SAFETY: the occupied slot holds an initialized pair; the
            // reads move it out of the old table, which is freed (never
            // dropped through) below.
            unsafe {
                let key = ptr::read(self.keys.as_ptr().add(index));
                let value = ptr::read(self.values.as_ptr().add(index));
                let home = self.home_slot(&key, new_cap);
                let mut dest = home;
                // The fresh table has no tombstones and plenty of free
                // slots, so a plain free-slot scan suffices.
                while *new_slots.as_ptr().add(dest) == SlotState::Occupied {
                    dest = (dest + 1) % new_cap;
                }
                *new_slots.as_ptr().add(dest) = SlotState::Occupied;
                ptr::write(new_keys.as_ptr().add(dest), key);
                ptr::write(new_values.as_ptr().add(dest), value);
            }
        }

        self.release_storage();
        self.slots = new_slots;
        self.keys = new_keys;
        self.values = new_values;
        self.cap = new_cap;
    }

    /// Insert `key → value`, returning the previous value if the key was
    /// already present (the stored key is kept).
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if self.cap == 0 || needs_grow(self.count, self.cap) {
            self.grow();
        }
        loop {
            match self.probe_insert(&key) {
                InsertSlot::Existing(index) => {
                    // SAFETY: the matching slot holds an initialized value.
                    let old = unsafe { ptr::replace(self.values.as_ptr().add(index), value) };
                    return Some(old);
                }
                InsertSlot::Vacant(index) => {
                    // SAFETY: `index < cap`; the slot is free or a
                    // tombstone, so nothing live is overwritten.
                    unsafe {
                        *self.slots.as_ptr().add(index) = SlotState::Occupied;
                        ptr::write(self.keys.as_ptr().add(index), key);
                        ptr::write(self.values.as_ptr().add(index), value);
                    }
                    self.count += 1;
                    return None;
                }
                // Unreachable under the proactive growth policy, kept as
                // the safe fallback for an exhausted probe.
                InsertSlot::Full => self.grow(),
            }
        }
    }

    /// Shared reference to the value for `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        let index = self.probe_find(key)?;
        // SAFETY: `probe_find` returned an occupied slot.
        Some(unsafe { &*self.values.as_ptr().add(index) })
    }

    /// Mutable reference to the value for `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let index = self.probe_find(key)?;
        // SAFETY: `probe_find` returned an occupied slot, and `&mut self`
        // makes this the only access path.
        Some(unsafe { &mut *self.values.as_ptr().add(index) })
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.probe_find(key).is_some()
    }

    /// Remove `key`, returning its value. The slot becomes a tombstone;
    /// capacity never shrinks.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, value)| value)
    }

    /// Remove `key`, returning the stored key and value.
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let index = self.probe_find(key)?;
        // SAFETY: `probe_find` returned an occupied slot; the tombstone
        // takes the pair out of the live set before it is moved out.
        unsafe {
            *self.slots.as_ptr().add(index) = SlotState::Dead;
            let key = ptr::read(self.keys.as_ptr().add(index));
            let value = ptr::read(self.values.as_ptr().add(index));
            self.count -= 1;
            Some((key, value))
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for HashMap<'_, K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> Drop for HashMap<'_, K, V, S> {
    fn drop(&mut self) {
        for index in 0..self.cap {
            if self.slot(index) == SlotState::Occupied {
                // SAFETY: occupied slots hold initialized pairs, dropped
                // exactly once here.
                unsafe {
                    ptr::drop_in_place(self.keys.as_ptr().add(index));
                    ptr::drop_in_place(self.values.as_ptr().add(index));
                }
            }
        }
        self.release_storage();
    }
}

/// Iterator over a map's live entries, in slot order.
///
/// Created by [`HashMap::iter`].
pub struct Iter<'m, K, V> {
    slots: *const SlotState,
    keys: *const K,
    values: *const V,
    index: usize,
    remaining: usize,
    _entries: PhantomData<&'m (K, V)>,
}

impl<'m, K, V> Iterator for Iter<'m, K, V> {
    type Item = (&'m K, &'m V);

    fn next(&mut self) -> Option<(&'m K, &'m V)> {
        while self.remaining > 0 {
            let index = self.index;
            self.index += 1;
            // SAFETY: `remaining > 0` guarantees another occupied slot
            // exists at or past `index`, so `index` stays in bounds; the
            // borrow of the map keeps the entries alive and unaliased.
            unsafe {
                if *self.slots.add(index) == SlotState::Occupied {
                    self.remaining -= 1;
                    return Some((&*self.keys.add(index), &*self.values.add(index)));
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<'m, K, V, S> IntoIterator for &'m HashMap<'_, K, V, S> {
    type Item = (&'m K, &'m V);
    type IntoIter = Iter<'m, K, V>;

    fn into_iter(self) -> Iter<'m, K, V> {
        self.iter()
    }
}
