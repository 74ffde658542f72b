//! Per-aggregate DISTINCT/ORDER BY buffering (spec.md §4.5, §6 `sorter`
//! external interface).
//!
//! Only the sorted/plain strategies allow DISTINCT/ORDER BY on individual
//! aggregates ([`crate::descriptor::PerAggDescriptor::reject_for_hashed`]
//! enforces this earlier). A group's lifetime is bounded by one sort-key
//! prefix match, so these buffers live and die with a single group and
//! never need to spill independently of the driver's own memory
//! accounting — unlike the grouping hash table, there's no recursive
//! overflow path here.

use aggexec_error::Result;
use aggexec_types::row::OwnedRow;
use aggexec_types::scalar::ScalarValue;

/// Contract an embedder could swap in for a disk-backed sort when a single
/// aggregate's DISTINCT/ORDER BY buffer is expected to outgrow memory.
/// [`VecSorter`] is the only implementation this crate ships.
pub trait SorterFactory {
    fn create(&self, sort_keys: Vec<usize>) -> Box<dyn Sorter>;
}

pub trait Sorter: std::fmt::Debug {
    fn put(&mut self, tuple: OwnedRow);
    fn perform_sort(&mut self);
    fn get_tuple(&mut self) -> Option<OwnedRow>;
    fn end(&mut self);
}

/// In-memory sorter, stable on ties so that ORDER BY aggregates preserve
/// input order among equal keys the way `sum(x ORDER BY y)` requires.
#[derive(Debug, Default)]
pub struct VecSorter {
    sort_keys: Vec<usize>,
    tuples: Vec<OwnedRow>,
    read_idx: usize,
    sorted: bool,
}

impl VecSorter {
    pub fn new(sort_keys: Vec<usize>) -> Self {
        VecSorter {
            sort_keys,
            tuples: Vec::new(),
            read_idx: 0,
            sorted: false,
        }
    }
}

impl Sorter for VecSorter {
    fn put(&mut self, tuple: OwnedRow) {
        debug_assert!(!self.sorted, "put() after perform_sort()");
        self.tuples.push(tuple);
    }

    fn perform_sort(&mut self) {
        let keys = &self.sort_keys;
        self.tuples.sort_by(|a, b| {
            for &k in keys {
                let ord = a[k]
                    .partial_cmp(&b[k])
                    .unwrap_or(std::cmp::Ordering::Equal);
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        self.sorted = true;
    }

    fn get_tuple(&mut self) -> Option<OwnedRow> {
        let tuple = self.tuples.get(self.read_idx).cloned();
        if tuple.is_some() {
            self.read_idx += 1;
        }
        tuple
    }

    fn end(&mut self) {
        self.tuples.clear();
        self.read_idx = 0;
        self.sorted = false;
    }
}

#[derive(Debug, Default)]
pub struct DefaultSorterFactory;

impl SorterFactory for DefaultSorterFactory {
    fn create(&self, sort_keys: Vec<usize>) -> Box<dyn Sorter> {
        Box::new(VecSorter::new(sort_keys))
    }
}

/// Drops consecutive duplicate rows after a sort on `distinct_cols`
/// (spec.md §4.5: DISTINCT collapses equal tuples on the aggregate's own
/// argument list before feeding `transfn`).
pub fn dedup_sorted(sorter: &mut dyn Sorter, distinct_cols: &[usize]) -> Vec<OwnedRow> {
    let mut out: Vec<OwnedRow> = Vec::new();
    while let Some(row) = sorter.get_tuple() {
        let is_dup = out.last().is_some_and(|prev: &OwnedRow| {
            distinct_cols
                .iter()
                .all(|&c| rows_scalar_eq(&prev[c], &row[c]))
        });
        if !is_dup {
            out.push(row);
        }
    }
    out
}

fn rows_scalar_eq(a: &ScalarValue, b: &ScalarValue) -> bool {
    a.partial_cmp(b) == Some(std::cmp::Ordering::Equal)
}
