//! C3 — GroupKeyTable: hash table mapping grouping-key tuples to per-group
//! transition-state arrays.
//!
//! Open addressing with linear probing and a cached 32-bit hash prefix per
//! slot (see [`entry`]), in the style of
//! `execution::operators::hash_aggregate::hash_table`. That module
//! batches rows into `GroupChunk`s for vectorized execution; this crate
//! processes one row at a time (spec.md's transition semantics are
//! inherently row-at-a-time), so groups are stored directly in a flat
//! `Vec<GroupEntry>` addressed by `u32` index instead of `(chunk, row)`
//! pairs.

pub(crate) mod entry;

use aggexec_types::row::{OwnedRow, Row};
use smallvec::SmallVec;
use tracing::warn;

use crate::arena::GroupArena;
use crate::trans_state::PerTransState;
use entry::EntryKey;

const LOAD_FACTOR: f64 = 0.75;
const MIN_CAPACITY: usize = 16;

/// Representative key tuple plus the per-group transition-state array
/// (spec.md §3, "GroupEntry").
#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub key: OwnedRow,
    pub states: SmallVec<[PerTransState; 4]>,
}

impl GroupEntry {
    fn approx_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.key.columns.len() * 24
    }
}

/// Hash table mapping grouping-key tuples to per-group transition state
/// (spec.md §4.3).
#[derive(Debug)]
pub struct GroupKeyTable {
    entries: Vec<EntryKey<u32>>,
    groups: Vec<GroupEntry>,
    arena: GroupArena,
    num_occupied: usize,

    /// Number of unique transition states tracked per group (after
    /// [`crate::share::ShareDetector`] dedup).
    num_trans: usize,

    /// `lookup()` stops inserting once either memory watermark trips,
    /// flipping the table permanently into lookup-only mode (spec.md
    /// §4.3/§4.6).
    lookup_only: bool,

    mem_limit: usize,
    ngroups_limit: usize,
}

impl GroupKeyTable {
    /// Bucket count is the smallest power of two >= `estimated_groups`,
    /// capped by `memory_budget / per_entry_size` (spec.md §4.3).
    pub fn new(
        estimated_groups: usize,
        per_entry_size: usize,
        num_trans: usize,
        mem_limit: usize,
        ngroups_limit: usize,
    ) -> Self {
        let budget_cap = if per_entry_size == 0 {
            usize::MAX
        } else {
            (mem_limit / per_entry_size).max(1)
        };
        let target = estimated_groups.min(budget_cap).max(1);
        let capacity = target.next_power_of_two().max(MIN_CAPACITY);

        GroupKeyTable {
            entries: vec![EntryKey::default(); capacity],
            groups: Vec::new(),
            arena: GroupArena::new(),
            num_occupied: 0,
            num_trans,
            lookup_only: false,
            mem_limit,
            ngroups_limit,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn num_occupied(&self) -> usize {
        self.num_occupied
    }

    pub fn is_lookup_only(&self) -> bool {
        self.lookup_only
    }

    pub fn force_lookup_only(&mut self) {
        self.lookup_only = true;
    }

    pub fn arena(&self) -> &GroupArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut GroupArena {
        &mut self.arena
    }

    /// Splits the borrow so a caller can mutate one group's transition
    /// states while also mutating the shared arena they point into.
    pub fn group_and_arena_mut(&mut self, idx: usize) -> (&mut GroupEntry, &mut GroupArena) {
        (&mut self.groups[idx], &mut self.arena)
    }

    /// Bytes currently allocated by this table's arena plus its group
    /// metadata. Compared against `mem_limit`/`ngroups_limit` after every
    /// insertion (spec.md §4.3).
    pub fn bytes_used(&self) -> usize {
        self.arena.bytes_used() + self.groups.iter().map(GroupEntry::approx_size).sum::<usize>()
    }

    /// Checks whether the table has crossed either memory watermark,
    /// flipping into lookup-only mode if so. Returns whether the table is
    /// now in lookup-only mode.
    pub fn check_watermark(&mut self) -> bool {
        if !self.lookup_only
            && (self.bytes_used() > self.mem_limit || self.num_occupied > self.ngroups_limit)
        {
            warn!(
                bytes_used = self.bytes_used(),
                mem_limit = self.mem_limit,
                groups = self.num_occupied,
                "hash table memory watermark crossed, flipping to lookup-only"
            );
            self.lookup_only = true;
        }
        self.lookup_only
    }

    pub fn get(&self, idx: usize) -> &GroupEntry {
        &self.groups[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut GroupEntry {
        &mut self.groups[idx]
    }

    /// Looks up `key`, inserting a new group (with states initialized via
    /// `init_states`) unless the table is in lookup-only mode, in which
    /// case an absent key returns `None`.
    pub fn lookup_or_insert(
        &mut self,
        key: &Row,
        hash: u64,
        init_states: impl FnOnce(&mut GroupArena) -> SmallVec<[PerTransState; 4]>,
    ) -> Option<usize> {
        if self.lookup_only {
            return self.probe_existing(key, hash);
        }

        self.resize_if_needed(1);
        let cap = self.entries.len() as u64;
        let mut offset = (hash % cap) as usize;

        loop {
            if self.entries[offset].is_empty() {
                let group_idx = self.groups.len() as u32;
                let states = init_states(&mut self.arena);
                debug_assert_eq!(states.len(), self.num_trans);
                self.groups.push(GroupEntry {
                    key: key.clone().into_owned(),
                    states,
                });
                self.entries[offset] = EntryKey::new(hash, group_idx);
                self.num_occupied += 1;
                return Some(group_idx as usize);
            }

            if self.entries[offset].prefix_matches_hash(hash) {
                let group_idx = self.entries[offset].key as usize;
                if self.groups[group_idx].key == *key {
                    return Some(group_idx);
                }
            }

            offset = (offset + 1) % self.entries.len();
        }
    }

    /// Lookup-only probe: never inserts.
    pub fn probe_existing(&self, key: &Row, hash: u64) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        let cap = self.entries.len() as u64;
        let mut offset = (hash % cap) as usize;
        let start = offset;
        loop {
            let ent = &self.entries[offset];
            if ent.is_empty() {
                return None;
            }
            if ent.prefix_matches_hash(hash) {
                let group_idx = ent.key as usize;
                if self.groups[group_idx].key == *key {
                    return Some(group_idx);
                }
            }
            offset = (offset + 1) % self.entries.len();
            if offset == start {
                return None;
            }
        }
    }

    /// Stable while no inserts occur (spec.md §4.3).
    pub fn iter(&self) -> impl Iterator<Item = (usize, &GroupEntry)> {
        self.groups.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Frees the arena and all group storage together.
    pub fn destroy(self) {
        drop(self);
    }

    fn resize_if_needed(&mut self, incoming: usize) {
        let possible = self.num_occupied + incoming;
        let mut new_cap = self.entries.len().max(MIN_CAPACITY);
        while (possible as f64) / (new_cap as f64) >= LOAD_FACTOR {
            new_cap *= 2;
        }
        if new_cap != self.entries.len() {
            self.resize(new_cap);
        }
    }

    fn resize(&mut self, new_capacity: usize) {
        let mut new_entries = vec![EntryKey::default(); new_capacity];
        for ent in self.entries.drain(..) {
            if ent.is_empty() {
                continue;
            }
            // Recompute the full hash is unavailable post-hoc (only the
            // prefix was cached), so rehash from the stored group's key.
            // We keep the original slot-selection hash implicitly by
            // reusing linear probing from the prefix; since the prefix
            // alone isn't enough to pick a new bucket, the table instead
            // keys new placement off the group's stored row hash, which we
            // recompute here.
            let group = &self.groups[ent.key as usize];
            let hash = aggexec_types::hash::hash_row(&group.key);
            let mut offset = (hash % new_capacity as u64) as usize;
            while !new_entries[offset].is_empty() {
                offset = (offset + 1) % new_capacity;
            }
            new_entries[offset] = EntryKey::new(hash, ent.key);
        }
        self.entries = new_entries;
    }
}
