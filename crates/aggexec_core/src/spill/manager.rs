//! C4 — SpillManager: memory-bounded overflow handling for the hashed
//! strategy (spec.md §4.4).
//!
//! Each grouping set that overflows its memory budget gets its own
//! "episode": a fresh [`TapeSetId`] with `N` tapes, one per partition.
//! Recursive re-spill (a refilled batch that itself overflows) opens a new
//! episode rather than reusing the parent's tape set; spec.md's open
//! question on shared-vs-per-batch tape pools permits either, and
//! per-episode sets keep partition bookkeeping local to one depth at a
//! time (documented in DESIGN.md).

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use aggexec_error::Result;
use aggexec_types::row::{OwnedRow, Row};

use super::partition::{choose_partition_count, partition_bits, partition_for_hash};
use super::record::{decode_row, encode_row};
use super::tape::{FileTapePool, TapePool, TapeSetId};
use crate::group_table::entry::hash_prefix;

/// Bytes reserved per partition for output buffering, used by the buffer
/// cap in [`choose_partition_count`]. Matches one typical spill record's
/// worth of headroom; not user-configurable.
const BUFFER_PER_PARTITION: usize = 8 * 1024;

/// A batch of spilled tuples belonging to exactly one grouping set
/// (spec.md §4.4: "a batch belongs to exactly one grouping set, so
/// refills touch exactly one table at a time").
#[derive(Debug)]
pub struct SpillBatch {
    pub grouping_set_id: usize,
    pub tape_set: TapeSetId,
    pub tape_index: usize,
    pub tuple_count: usize,
    /// Number of hash bits already consumed by this batch's ancestor
    /// episodes; the next episode spilling from this batch must consume a
    /// disjoint slice starting here.
    pub bit_depth: u32,
}

struct Episode {
    tape_set: TapeSetId,
    bit_depth: u32,
    partition_bits: u32,
    counts: Vec<usize>,
}

/// Owns the tape pool and routes overflowing tuples into partitioned spill
/// files, one active episode per grouping set at a time.
#[derive(Debug)]
pub struct SpillManager {
    pool: Box<dyn TapePool>,
    episodes: HashMap<usize, Episode>,
    pending: VecDeque<SpillBatch>,
    /// One episode can queue several batches (one per non-empty partition)
    /// that all share a single [`TapeSetId`]; a tape set is only actually
    /// closed once every batch referencing it has been released, since
    /// `TapePool::close` drops every tape in the set, not just one.
    tape_set_refs: HashMap<TapeSetId, usize>,
}

impl Default for SpillManager {
    fn default() -> Self {
        SpillManager {
            pool: Box::new(FileTapePool::new()),
            episodes: HashMap::new(),
            pending: VecDeque::new(),
            tape_set_refs: HashMap::new(),
        }
    }
}

impl SpillManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tape_pool(pool: Box<dyn TapePool>) -> Self {
        SpillManager {
            pool,
            episodes: HashMap::new(),
            pending: VecDeque::new(),
            tape_set_refs: HashMap::new(),
        }
    }

    /// Opens an overflow episode for `grouping_set_id` if one isn't already
    /// active, sizing the partition count from the remaining-group
    /// estimate `g`, the per-entry size estimate `e`, and the memory
    /// budget `m` available for spilling (spec.md §4.4).
    pub fn ensure_episode(
        &mut self,
        grouping_set_id: usize,
        parent_bit_depth: u32,
        g: usize,
        e: usize,
        m: usize,
    ) -> Result<()> {
        if self.episodes.contains_key(&grouping_set_id) {
            return Ok(());
        }
        let remaining_bits = 32u32.saturating_sub(parent_bit_depth);
        let mut n = choose_partition_count(g, e, m, BUFFER_PER_PARTITION);
        if remaining_bits == 0 {
            n = 1;
        } else {
            n = n.min(1usize << remaining_bits);
        }
        let bits = partition_bits(n.max(1));
        let tape_set = self.pool.create(n.max(1))?;
        debug!(grouping_set_id, partitions = n.max(1), parent_bit_depth, "opening spill episode");
        self.episodes.insert(
            grouping_set_id,
            Episode {
                tape_set,
                bit_depth: parent_bit_depth,
                partition_bits: bits,
                counts: vec![0; n.max(1)],
            },
        );
        Ok(())
    }

    /// Writes one tuple into its partition's tape. `ensure_episode` must
    /// have been called for `grouping_set_id` first.
    pub fn write_tuple(&mut self, grouping_set_id: usize, row: &Row, hash: u64) -> Result<()> {
        let episode = self
            .episodes
            .get_mut(&grouping_set_id)
            .expect("ensure_episode must run before write_tuple");
        let partition =
            partition_for_hash(hash, episode.bit_depth, episode.partition_bits.max(1));
        let bytes = encode_row(row);
        let mut record = Vec::with_capacity(8 + bytes.len());
        record.extend_from_slice(&hash_prefix(hash).to_le_bytes());
        record.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        record.extend_from_slice(&bytes);
        self.pool.write(episode.tape_set, partition, &record)?;
        episode.counts[partition] += 1;
        Ok(())
    }

    /// Closes out the active episode for `grouping_set_id`, queuing one
    /// [`SpillBatch`] per non-empty partition for later refill.
    pub fn finalize_episode(&mut self, grouping_set_id: usize) -> Result<usize> {
        let episode = match self.episodes.remove(&grouping_set_id) {
            Some(e) => e,
            None => return Ok(0),
        };
        let child_bit_depth = episode.bit_depth + episode.partition_bits;
        let mut queued = 0;
        for (idx, count) in episode.counts.into_iter().enumerate() {
            if count == 0 {
                continue;
            }
            self.pending.push_back(SpillBatch {
                grouping_set_id,
                tape_set: episode.tape_set,
                tape_index: idx,
                tuple_count: count,
                bit_depth: child_bit_depth,
            });
            queued += 1;
        }
        if queued == 0 {
            self.pool.close(episode.tape_set)?;
        } else {
            self.tape_set_refs.insert(episode.tape_set, queued);
        }
        debug!(grouping_set_id, batches_queued = queued, "spill episode finalized");
        Ok(queued)
    }

    pub fn pop_next_batch(&mut self) -> Option<SpillBatch> {
        self.pending.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Reads every tuple out of `batch` in order, handing each `(row, hash_prefix)`
    /// pair to `visit`. Closes the batch's tape set only once all tapes
    /// sharing it have been drained by the caller, via `release_tape_set`.
    pub fn replay_batch(
        &mut self,
        batch: &SpillBatch,
        mut visit: impl FnMut(OwnedRow, u32) -> Result<()>,
    ) -> Result<()> {
        self.pool.rewind_for_read(batch.tape_set, batch.tape_index)?;
        loop {
            let header = match self.pool.read(batch.tape_set, batch.tape_index, 8)? {
                Some(bytes) => bytes,
                None => break,
            };
            let hash_prefix = u32::from_le_bytes(header[0..4].try_into().unwrap());
            let tuple_len = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
            let tuple_bytes = self
                .pool
                .read(batch.tape_set, batch.tape_index, tuple_len)?
                .expect("tuple body must follow its header");
            let row = decode_row(&tuple_bytes)?;
            visit(row, hash_prefix)?;
        }
        Ok(())
    }

    /// Releases one batch's reference to `tape_set`. The underlying tapes
    /// are only actually closed once every batch that was queued out of
    /// the same episode has released its reference.
    pub fn release_tape_set(&mut self, tape_set: TapeSetId) -> Result<()> {
        match self.tape_set_refs.get_mut(&tape_set) {
            Some(count) => {
                *count -= 1;
                if *count == 0 {
                    self.tape_set_refs.remove(&tape_set);
                    self.pool.close(tape_set)?;
                }
                Ok(())
            }
            None => self.pool.close(tape_set),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggexec_types::scalar::ScalarValue;

    #[test]
    fn writes_and_replays_in_order() {
        let mut mgr = SpillManager::new();
        mgr.ensure_episode(0, 0, 100, 32, 4096).unwrap();

        let row = Row::from_iter(vec![ScalarValue::Int64(7)]);
        mgr.write_tuple(0, &row, 0xAAAA_BBBB_0000_0001).unwrap();
        mgr.write_tuple(0, &row, 0xAAAA_BBBB_0000_0002).unwrap();
        let queued = mgr.finalize_episode(0).unwrap();
        assert!(queued >= 1);

        let mut seen = 0;
        while let Some(batch) = mgr.pop_next_batch() {
            let expected = batch.tuple_count;
            let mut count = 0;
            mgr.replay_batch(&batch, |r, _hp| {
                assert_eq!(r, row.clone().into_owned());
                count += 1;
                Ok(())
            })
            .unwrap();
            assert_eq!(count, expected);
            seen += count;
            mgr.release_tape_set(batch.tape_set).unwrap();
        }
        assert_eq!(seen, 2);
    }
}
