//! Partition sizing and selection for hashed-strategy spill episodes
//! (spec.md §4.4).

use crate::config::{HASH_MAX_PARTITIONS, HASH_MIN_PARTITIONS, HASH_PARTITION_FACTOR};

/// Picks the number of spill partitions for an overflow episode given the
/// estimated remaining group count `g`, the per-entry size estimate `e`,
/// and the memory budget `m` available to the episode.
///
/// `ceil(HASH_PARTITION_FACTOR * g * e / m)`, rounded up to a power of two
/// and clamped to `[HASH_MIN_PARTITIONS, HASH_MAX_PARTITIONS]`, then capped
/// again so that buffering all partitions never exceeds a quarter of `m`
/// (spec.md §4.4: "the partition count is further capped so that
/// per-partition output buffers together never exceed a quarter of
/// work_mem").
pub fn choose_partition_count(g: usize, e: usize, m: usize, buffer_per_partition: usize) -> usize {
    if m == 0 || g == 0 {
        return HASH_MIN_PARTITIONS;
    }

    let raw = (HASH_PARTITION_FACTOR * g as f64 * e as f64 / m as f64).ceil();
    let raw = raw.max(1.0) as usize;
    let mut n = raw.next_power_of_two();
    n = n.clamp(HASH_MIN_PARTITIONS, HASH_MAX_PARTITIONS);

    if buffer_per_partition > 0 {
        let quarter = (m / 4).max(buffer_per_partition);
        let buffer_cap = (quarter / buffer_per_partition).max(1);
        if n > buffer_cap {
            n = buffer_cap.next_power_of_two().clamp(1, n);
            n = n.max(1);
        }
    }
    n
}

/// `n` such that `2^n == partitions`; `partitions` is always a power of two
/// by construction of [`choose_partition_count`].
pub fn partition_bits(partitions: usize) -> u32 {
    debug_assert!(partitions.is_power_of_two());
    partitions.trailing_zeros()
}

/// Selects the destination partition for a 64-bit row hash, consuming
/// `bits` bits of the hash starting after the `already_consumed` bits used
/// by ancestor episodes (spec.md §4.4: each recursive spill consumes a
/// fresh, disjoint slice of hash bits so re-spilling never revisits a
/// partitioning decision already made by an ancestor).
pub fn partition_for_hash(hash: u64, already_consumed: u32, bits: u32) -> usize {
    if bits == 0 {
        return 0;
    }
    let shifted = hash.rotate_left(already_consumed);
    (shifted & ((1u64 << bits) - 1)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_count_is_power_of_two_within_bounds() {
        let n = choose_partition_count(1_000_000, 64, 1024, 0);
        assert!(n.is_power_of_two());
        assert!(n >= HASH_MIN_PARTITIONS);
        assert!(n <= HASH_MAX_PARTITIONS);
    }

    #[test]
    fn small_groups_hit_the_floor() {
        let n = choose_partition_count(1, 8, 1_000_000, 0);
        assert_eq!(n, HASH_MIN_PARTITIONS);
    }

    #[test]
    fn partition_selection_is_deterministic_and_in_range() {
        let bits = 4;
        for h in [0u64, 1, 12345, u64::MAX] {
            let p = partition_for_hash(h, 0, bits);
            assert!(p < (1usize << bits));
            assert_eq!(p, partition_for_hash(h, 0, bits));
        }
    }
}
