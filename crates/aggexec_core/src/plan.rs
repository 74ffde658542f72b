//! Data model shared by the phase controller and driver (spec.md §3).

use std::collections::BTreeMap;

use aggexec_types::row::Row;

/// One GROUP BY specification: an ordered list of column indices into the
/// child's output row. The empty set (`[]`) groups everything into one
/// row, used by `ROLLUP`/`CUBE`/`GROUPING SETS` supersets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupingSet {
    pub columns: Vec<usize>,
}

impl GroupingSet {
    pub fn new(columns: Vec<usize>) -> Self {
        GroupingSet { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn project(&self, row: &Row) -> Row {
        row.project(&self.columns)
    }
}

/// Which algorithm processes one phase's grouping sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// No GROUP BY at all: a single implicit group over the whole input.
    Plain,
    /// Input arrives already ordered by this phase's sort prefix.
    Sorted,
    /// Grouping via hash table, phase 0 only (spec.md §3).
    Hashed,
}

/// A contiguous run of grouping sets processed under one strategy.
///
/// Phase 0 is reserved for all hashed grouping sets. Phases 1..N are
/// sorted phases, the most specific (longest) grouping set listed first
/// within a phase, matching spec.md §3's "most specific (longest) is
/// listed first" and §4.1's boundary-detection tie-break.
#[derive(Debug, Clone)]
pub struct Phase {
    pub strategy: Strategy,
    pub grouping_sets: Vec<GroupingSet>,
    /// Sort prefix this phase's input must already satisfy (sorted phases
    /// only); `None` for phase 0 (hashed).
    pub sort_prefix: Option<Vec<usize>>,
}

impl Phase {
    /// Equality predicates are deduplicated by grouping-set length
    /// (spec.md §4.1): two grouping sets of the same length share one
    /// comparison, since both only ever compare the first N columns of
    /// the sort prefix.
    pub fn distinct_prefix_lengths(&self) -> Vec<usize> {
        let mut lens: Vec<usize> = self
            .grouping_sets
            .iter()
            .map(|gs| gs.len())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        // Longest first, matching "most specific first".
        lens.sort_unstable_by(|a, b| b.cmp(a));
        lens
    }
}

/// The full multi-phase plan for one driver instance.
#[derive(Debug, Clone)]
pub struct AggPlan {
    pub phases: Vec<Phase>,
}

impl AggPlan {
    /// A single grouping set processed by the sorted strategy (the common
    /// `GROUP BY a, b` case with pre-sorted input); no grouping sets is
    /// the plain/no-GROUP-BY case.
    pub fn single_sorted(columns: Vec<usize>) -> Self {
        AggPlan {
            phases: vec![Phase {
                strategy: Strategy::Sorted,
                grouping_sets: vec![GroupingSet::new(columns.clone())],
                sort_prefix: Some(columns),
            }],
        }
    }

    pub fn plain() -> Self {
        AggPlan {
            phases: vec![Phase {
                strategy: Strategy::Plain,
                grouping_sets: vec![GroupingSet::default()],
                sort_prefix: None,
            }],
        }
    }

    pub fn single_hashed(columns: Vec<usize>) -> Self {
        AggPlan {
            phases: vec![Phase {
                strategy: Strategy::Hashed,
                grouping_sets: vec![GroupingSet::new(columns)],
                sort_prefix: None,
            }],
        }
    }

    /// True when any phase uses the hashed strategy.
    pub fn has_hashed_phase(&self) -> bool {
        self.phases.iter().any(|p| p.strategy == Strategy::Hashed)
    }

    /// True when any phase uses a sorted/plain strategy.
    pub fn has_sorted_phase(&self) -> bool {
        self.phases
            .iter()
            .any(|p| matches!(p.strategy, Strategy::Sorted | Strategy::Plain))
    }

    /// Total number of output rows expected from empty-set handling,
    /// keyed by phase index -> grouping set index with `columns.is_empty()`.
    pub fn empty_grouping_sets(&self) -> BTreeMap<usize, Vec<usize>> {
        let mut out = BTreeMap::new();
        for (phase_idx, phase) in self.phases.iter().enumerate() {
            let empties: Vec<usize> = phase
                .grouping_sets
                .iter()
                .enumerate()
                .filter(|(_, gs)| gs.is_empty())
                .map(|(i, _)| i)
                .collect();
            if !empties.is_empty() {
                out.insert(phase_idx, empties);
            }
        }
        out
    }
}
