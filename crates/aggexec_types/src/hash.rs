//! Hashing for group keys.
//!
//! Grouping-key equality must agree with hashing: two rows that compare
//! equal (§4.3/§4.6) must hash identically. NULLs hash to a fixed
//! arbitrary value rather than being skipped, so that `(NULL, 1)` and
//! `(NULL, 2)` land in different buckets.

use ahash::RandomState;

use crate::row::Row;
use crate::scalar::ScalarValue;

/// Fixed seed so spill tapes written and read back within one process
/// lifetime hash consistently. Per spec.md §9, spill files are not
/// portable across runs, so a fixed-but-arbitrary seed is fine.
pub const HASH_RANDOM_STATE: RandomState = RandomState::with_seeds(0, 0, 0, 0);

/// Combines two hashes into one, in the style of `util::hash`
/// (itself credited there to datafusion).
pub const fn combine_hashes(l: u64, r: u64) -> u64 {
    let hash = (17 * 37u64).wrapping_add(l);
    hash.wrapping_mul(37).wrapping_add(r)
}

fn null_hash_value() -> u64 {
    HASH_RANDOM_STATE.hash_one(1u8)
}

fn hash_scalar(value: &ScalarValue) -> u64 {
    match value {
        ScalarValue::Null => null_hash_value(),
        ScalarValue::Boolean(v) => HASH_RANDOM_STATE.hash_one(v),
        ScalarValue::Int64(v) => HASH_RANDOM_STATE.hash_one(v),
        ScalarValue::Float64(v) => HASH_RANDOM_STATE.hash_one(v.to_ne_bytes()),
        ScalarValue::Utf8(v) => HASH_RANDOM_STATE.hash_one(v.as_bytes()),
        ScalarValue::Binary(v) => HASH_RANDOM_STATE.hash_one(v.as_ref()),
    }
}

/// Hash every column of a row, combining column hashes left to right.
pub fn hash_row(row: &Row) -> u64 {
    let mut iter = row.iter();
    let mut hash = match iter.next() {
        Some(first) => hash_scalar(first),
        None => return null_hash_value(),
    };
    for value in iter {
        hash = combine_hashes(hash_scalar(value), hash);
    }
    hash
}

/// Partition selector used for hash repartitioning / hash joins / hash
/// aggregates alike: consistent hash-to-partition mapping.
pub const fn partition_for_hash(hash: u64, partitions: usize) -> usize {
    hash as usize % partitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn equal_rows_hash_equal() {
        let a = Row::from_iter([ScalarValue::Int64(1), ScalarValue::Utf8(Cow::Borrowed("x"))]);
        let b = Row::from_iter([ScalarValue::Int64(1), ScalarValue::Utf8(Cow::Borrowed("x"))]);
        assert_eq!(hash_row(&a), hash_row(&b));
    }

    #[test]
    fn nulls_distinguish_positions() {
        let a = Row::from_iter([ScalarValue::Null, ScalarValue::Int64(1)]);
        let b = Row::from_iter([ScalarValue::Int64(1), ScalarValue::Null]);
        assert_ne!(hash_row(&a), hash_row(&b));
    }
}
