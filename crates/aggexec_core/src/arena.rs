//! C9 — scoped memory arenas.
//!
//! Per-group transition states are naturally arena-allocated: a
//! [`GroupArena`] is a flat `Vec` of [`crate::trans_state::TransValue`] and
//! references to entries inside it ([`ArenaOffset`]) are plain indices, not
//! pointers. Destroying a table (or resetting a grouping set at a group
//! boundary) drops every value in one shot by truncating the backing
//! `Vec`, which is the Rust analogue of freeing a whole arena at once.
//!
//! [`MemoryArenas`] owns three scopes named directly in spec.md §3:
//! one arena per active grouping set (sorted/plain strategies, reset at
//! each group boundary), one arena shared by all hash tables (hashed
//! strategy, freed when the table is destroyed), and callbacks registered
//! against the current grouping-set arena that fire on reset/destroy
//! (`AggRegisterCallback`, spec.md §6).

use std::fmt;

use crate::trans_state::TransValue;

/// An offset into a [`GroupArena`]. Stable until the arena is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaOffset(pub u32);

/// A bump-style arena of transition-state values.
///
/// Bytes accounted here feed the memory-bound hash table's overflow
/// decision (spec.md §4.3): "after each insertion, the caller recomputes
/// the table's allocated bytes via the arena and compares to
/// `hash_mem_limit`".
#[derive(Default)]
pub struct GroupArena {
    values: Vec<TransValue>,
    bytes: usize,
}

impl GroupArena {
    pub fn new() -> Self {
        GroupArena::default()
    }

    pub fn alloc(&mut self, value: TransValue) -> ArenaOffset {
        self.bytes += value.approx_size();
        let offset = self.values.len() as u32;
        self.values.push(value);
        ArenaOffset(offset)
    }

    pub fn get(&self, offset: ArenaOffset) -> &TransValue {
        &self.values[offset.0 as usize]
    }

    pub fn get_mut(&mut self, offset: ArenaOffset) -> &mut TransValue {
        &mut self.values[offset.0 as usize]
    }

    /// Replace the value at `offset`, updating the byte count. Used when a
    /// transition function returns a new by-reference state that must be
    /// copied into the arena (spec.md §4.5).
    pub fn replace(&mut self, offset: ArenaOffset, value: TransValue) {
        self.bytes -= self.values[offset.0 as usize].approx_size();
        self.bytes += value.approx_size();
        self.values[offset.0 as usize] = value;
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Free every value in the arena at once.
    pub fn reset(&mut self) {
        self.values.clear();
        self.bytes = 0;
    }
}

impl fmt::Debug for GroupArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupArena")
            .field("len", &self.values.len())
            .field("bytes", &self.bytes)
            .finish()
    }
}

/// A callback registered against the current grouping-set arena
/// (`AggRegisterCallback`, spec.md §6). Fires on reset/destroy, not on
/// error paths — the driver only calls these from [`MemoryArenas::reset_grouping_set`]
/// and [`MemoryArenas::reset_hash_arena`], never while unwinding.
pub type ArenaCallback = Box<dyn FnMut() + Send>;

#[derive(Default)]
struct CallbackSlot {
    callbacks: Vec<ArenaCallback>,
}

impl CallbackSlot {
    fn fire(&mut self) {
        for mut cb in self.callbacks.drain(..) {
            cb();
        }
    }
}

impl fmt::Debug for CallbackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("pending", &self.callbacks.len())
            .finish()
    }
}

/// Owns the arena scopes used by one [`crate::driver::AggregationDriver`]
/// instance.
#[derive(Debug, Default)]
pub struct MemoryArenas {
    /// One arena per grouping set, indexed the same way as the driver's
    /// `grouping_sets` list. Used by the sorted/plain strategies.
    grouping_set_arenas: Vec<GroupArena>,
    grouping_set_callbacks: Vec<CallbackSlot>,

    /// Single arena backing every hash table. Destroying the table is
    /// equivalent to calling [`MemoryArenas::reset_hash_arena`].
    hash_arena: GroupArena,
    hash_callbacks: CallbackSlot,
}

impl MemoryArenas {
    pub fn with_grouping_sets(n: usize) -> Self {
        MemoryArenas {
            grouping_set_arenas: (0..n).map(|_| GroupArena::new()).collect(),
            grouping_set_callbacks: (0..n).map(|_| CallbackSlot::default()).collect(),
            hash_arena: GroupArena::new(),
            hash_callbacks: CallbackSlot::default(),
        }
    }

    pub fn grouping_set(&self, idx: usize) -> &GroupArena {
        &self.grouping_set_arenas[idx]
    }

    pub fn grouping_set_mut(&mut self, idx: usize) -> &mut GroupArena {
        &mut self.grouping_set_arenas[idx]
    }

    pub fn hash_arena(&self) -> &GroupArena {
        &self.hash_arena
    }

    pub fn hash_arena_mut(&mut self) -> &mut GroupArena {
        &mut self.hash_arena
    }

    pub fn register_grouping_set_callback(&mut self, idx: usize, cb: ArenaCallback) {
        self.grouping_set_callbacks[idx].callbacks.push(cb);
    }

    pub fn register_hash_callback(&mut self, cb: ArenaCallback) {
        self.hash_callbacks.callbacks.push(cb);
    }

    /// Reset one grouping set's arena at a group boundary, firing any
    /// registered callbacks first.
    pub fn reset_grouping_set(&mut self, idx: usize) {
        self.grouping_set_callbacks[idx].fire();
        self.grouping_set_arenas[idx].reset();
    }

    /// Free the shared hash-table arena (table destroy / recursive refill).
    pub fn reset_hash_arena(&mut self) {
        self.hash_callbacks.fire();
        self.hash_arena.reset();
    }
}
