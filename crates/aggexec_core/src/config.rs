//! Configuration recognized by the aggregation executor (spec.md §6).

/// `HASH_PARTITION_FACTOR` from spec.md §4.4.
pub const HASH_PARTITION_FACTOR: f64 = 1.5;
/// `HASH_MIN_PARTITIONS` from spec.md §4.4.
pub const HASH_MIN_PARTITIONS: usize = 4;
/// `HASH_MAX_PARTITIONS` from spec.md §4.4.
pub const HASH_MAX_PARTITIONS: usize = 256;

/// Runtime-tunable knobs for one aggregation driver instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateConfig {
    /// Byte budget for the hash table set; divided among concurrently live
    /// tables (phase 0 may hold one table per hashed grouping set).
    pub work_mem: usize,

    /// When true, disables the memory/group caps entirely: the hash table
    /// never flips to lookup-only mode and nothing is spilled.
    pub hashagg_mem_overflow: bool,

    /// Estimated number of groups that will ultimately be produced, used to
    /// size the initial hash table and to plan partition counts when a
    /// spill episode starts.
    pub estimated_groups: usize,

    /// Estimated bytes per hash table entry (key + per-trans-state array),
    /// used for the same sizing decisions as `estimated_groups`.
    pub estimated_entry_size: usize,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        AggregateConfig {
            work_mem: 4 * 1024 * 1024,
            hashagg_mem_overflow: false,
            estimated_groups: 1024,
            estimated_entry_size: 64,
        }
    }
}

impl AggregateConfig {
    /// Partition-file buffering is capped at a quarter of `work_mem`
    /// (spec.md §4.4, `HASH_PARTITION_MEM`).
    pub fn hash_partition_mem(&self) -> usize {
        self.work_mem / 4
    }
}
