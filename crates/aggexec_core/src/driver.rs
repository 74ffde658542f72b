//! C6 — AggregationDriver: the pull iterator tying every other component
//! together (spec.md §4.6).
//!
//! Callers are expected to have already run [`crate::share::ShareDetector`]
//! over their aggregate call list and to pass exactly one
//! [`PerAggDescriptor`] per distinct result slot (`descriptors.len() ==
//! num_agg_slots`, `descriptor.agg_no` is that slot's position in the
//! output row). Shared `trans_no` values across descriptors are honored:
//! this driver allocates one [`PerTransState`] per distinct `trans_no`,
//! not one per descriptor.
//!
//! Mixed hash+sort plans need the child rewound between the hash pass and
//! the sorted pass, so they run as two full passes over
//! [`ChildIterator::rescan`] rather than fused in one pass (spec.md's
//! "mixed hash+sort execution" doesn't mandate single-pass fusion; see
//! DESIGN.md for the tradeoff).

use std::collections::VecDeque;

use tracing::{debug, trace};

use aggexec_error::{AggExecError, ErrorKind, Result};
use aggexec_types::row::{OwnedRow, Row};
use aggexec_types::scalar::OwnedScalarValue;
use smallvec::SmallVec;

use crate::arena::{GroupArena, MemoryArenas};
use crate::config::AggregateConfig;
use crate::descriptor::PerAggDescriptor;
use crate::group_table::GroupKeyTable;
use crate::iface::ChildIterator;
use crate::interrupt::InterruptCheck;
use crate::phase::{PhaseController, PhaseStage};
use crate::plan::{AggPlan, GroupingSet, Strategy};
use crate::sorter::{DefaultSorterFactory, SorterFactory};
use crate::spill::{SpillManager, TapePool};
use crate::trans_state::PerTransState;
use crate::transition::{resolve_distinct_order_by, TransitionInvoker};

type TransArray = SmallVec<[PerTransState; 4]>;

/// One finished group's output: the grouping columns (NULL where not part
/// of this grouping set), the finalized aggregate values, and a bitmask
/// recording which of the plan's group-by columns are present in this
/// grouping set (the embedder's expression layer is expected to translate
/// this into a `GROUPING()` pseudo-column if the query asked for one).
#[derive(Debug, Clone)]
pub struct GroupOutput {
    pub group_values: Vec<OwnedScalarValue>,
    pub agg_values: Vec<OwnedScalarValue>,
    pub grouping_bitmask: u64,
}

impl GroupOutput {
    pub fn into_row(self) -> OwnedRow {
        let mut columns = self.group_values;
        columns.extend(self.agg_values);
        Row::from_iter(columns)
    }
}

pub struct AggregationDriver {
    child: Box<dyn ChildIterator>,
    plan: AggPlan,
    descriptors: Vec<PerAggDescriptor>,
    num_trans_slots: usize,
    representative_for_trans: Vec<usize>,
    all_group_cols: Vec<usize>,
    config: AggregateConfig,
    interrupt: InterruptCheck,
    sorter_factory: Box<dyn SorterFactory>,
    output: VecDeque<GroupOutput>,
    phases: PhaseController,
    started: bool,
    finished: bool,
    spilled_batches: usize,
}

impl AggregationDriver {
    pub fn new(
        child: Box<dyn ChildIterator>,
        plan: AggPlan,
        descriptors: Vec<PerAggDescriptor>,
        num_trans_slots: usize,
        config: AggregateConfig,
    ) -> Result<Self> {
        for d in &descriptors {
            d.validate()?;
        }
        if plan.has_hashed_phase() {
            for d in &descriptors {
                // Hashed grouping sets reject per-aggregate DISTINCT/ORDER BY
                // only when this plan actually has a hashed phase; a mixed
                // plan still allows them on its sorted phases.
                if plan.phases.len() == 1 {
                    d.reject_for_hashed()?;
                }
            }
        }

        let mut representative_for_trans = vec![usize::MAX; num_trans_slots];
        for (idx, d) in descriptors.iter().enumerate() {
            if representative_for_trans[d.trans_no] == usize::MAX {
                representative_for_trans[d.trans_no] = idx;
            }
        }

        let mut all_group_cols = std::collections::BTreeSet::new();
        for phase in &plan.phases {
            for gs in &phase.grouping_sets {
                all_group_cols.extend(gs.columns.iter().copied());
            }
        }
        let all_group_cols: Vec<usize> = all_group_cols.into_iter().collect();

        let num_phases = plan.phases.len();
        Ok(AggregationDriver {
            child,
            plan,
            descriptors,
            num_trans_slots,
            representative_for_trans,
            all_group_cols,
            config,
            interrupt: InterruptCheck::new(),
            sorter_factory: Box::new(DefaultSorterFactory),
            output: VecDeque::new(),
            phases: PhaseController::new(num_phases.max(1)),
            started: false,
            finished: false,
            spilled_batches: 0,
        })
    }

    pub fn with_interrupt(mut self, interrupt: InterruptCheck) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Pulls the next output row, running the driver to completion on
    /// first call (spec.md §4.6: hashed output isn't known until the
    /// entire grouping set has been seen, so there is no way to stream it
    /// incrementally; sorted output streams internally but is still
    /// queued behind that since a mixed plan's sorted pass runs second).
    pub fn next(&mut self) -> Result<Option<OwnedRow>> {
        if !self.started {
            self.started = true;
            self.run()?;
        }
        self.interrupt.check()?;
        Ok(self.output.pop_front().map(GroupOutput::into_row))
    }

    /// Restarts the driver from the beginning, rewinding its child
    /// (spec.md §6 exposed contract: `init, next, rescan, end`).
    pub fn rescan(&mut self) -> Result<()> {
        self.child.rescan()?;
        self.output.clear();
        self.started = false;
        self.finished = false;
        self.spilled_batches = 0;
        self.phases = PhaseController::new(self.plan.phases.len().max(1));
        Ok(())
    }

    /// Releases this driver's resources. Tape pools and arenas are owned
    /// by value and already drop with the driver; this exists so callers
    /// following the exposed `init/next/rescan/end` contract have an
    /// explicit call site rather than relying on `Drop` timing.
    pub fn end(self) {
        drop(self);
    }

    /// Number of spill batches consumed during refill (spec.md §8 S5:
    /// "`batches > 0`"). Zero for plans that never overflowed their
    /// memory budget.
    pub fn spilled_batches(&self) -> usize {
        self.spilled_batches
    }

    /// Drives [`PhaseController`] through the plan's phases in lockstep
    /// with actual execution (spec.md §4.2): each iteration asks the
    /// controller which phase is current, runs that phase's strategy, then
    /// calls `advance()` so the controller's forward-only/non-adjacent-jump
    /// contract actually guards the sequence instead of sitting unused
    /// beside an independently phase-indexed loop.
    fn run(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        debug!(phases = self.plan.phases.len(), "starting aggregation run");

        while !self.phases.is_done() {
            let phase_idx = self.phases.current_phase();
            let strategy = self.plan.phases[phase_idx].strategy;
            trace!(phase_idx, stage = ?self.phases.stage(), ?strategy, "entering phase");
            match strategy {
                Strategy::Hashed => {
                    self.run_hashed_phase(phase_idx)?;
                    if self.plan.has_sorted_phase() {
                        debug!("rescanning child for sorted phases after hash phase");
                        self.child.rescan()?;
                    }
                }
                Strategy::Sorted | Strategy::Plain => {
                    self.run_sorted_like_phase(phase_idx)?;
                }
            }
            self.phases.advance()?;
        }

        self.finished = true;
        debug!(rows = self.output.len(), "aggregation run finished");
        Ok(())
    }

    fn new_trans_array(&self, arena: &mut GroupArena) -> TransArray {
        (0..self.num_trans_slots)
            .map(|t| {
                let rep = self.representative_for_trans[t];
                let initcond = self.descriptors[rep].initcond.clone();
                PerTransState::init(arena, initcond)
            })
            .collect()
    }

    fn finalize_group(
        &self,
        arena: &GroupArena,
        trans: &TransArray,
        key_row: &Row,
        gs: &GroupingSet,
    ) -> Result<GroupOutput> {
        let mut agg_values = vec![OwnedScalarValue::Null; self.descriptors.len()];
        for d in &self.descriptors {
            let value = TransitionInvoker::finalize(d, &trans[d.trans_no], arena)?;
            if d.agg_no < agg_values.len() {
                agg_values[d.agg_no] = value;
            }
        }

        let present: std::collections::HashSet<usize> = gs.columns.iter().copied().collect();
        let mut grouping_bitmask = 0u64;
        let mut group_values = Vec::with_capacity(self.all_group_cols.len());
        for (bit, &col) in self.all_group_cols.iter().enumerate() {
            if present.contains(&col) {
                let pos = gs.columns.iter().position(|&c| c == col).unwrap();
                group_values.push(key_row[pos].clone().into_owned());
            } else {
                group_values.push(OwnedScalarValue::Null);
                grouping_bitmask |= 1 << bit;
            }
        }

        Ok(GroupOutput {
            group_values,
            agg_values,
            grouping_bitmask,
        })
    }

    fn uses_distinct_or_order_by(&self) -> bool {
        self.descriptors
            .iter()
            .any(|d| d.distinct || !d.order_by.is_empty())
    }

    /// Sorted and Plain strategies share a boundary-detection loop: the
    /// only difference is that Plain's single implicit group starts
    /// eagerly so an empty input still produces one output row.
    fn run_sorted_like_phase(&mut self, phase_idx: usize) -> Result<()> {
        let phase = self.plan.phases[phase_idx].clone();
        let buffering = self.uses_distinct_or_order_by();
        let n = phase.grouping_sets.len();

        let mut arenas = MemoryArenas::with_grouping_sets(n);
        let mut current_key: Vec<Option<OwnedRow>> = vec![None; n];
        let mut trans: Vec<Option<TransArray>> = vec![None; n];
        let mut buffers: Vec<Vec<OwnedRow>> = vec![Vec::new(); n];
        let mut saw_any_row = false;

        if phase.strategy == Strategy::Plain {
            for i in 0..n {
                current_key[i] = Some(Row::empty());
                trans[i] = Some(self.new_trans_array(arenas.grouping_set_mut(i)));
            }
        }

        loop {
            self.interrupt.check()?;
            let row = match self.child.next_row()? {
                Some(r) => r,
                None => break,
            };
            saw_any_row = true;

            for (i, gs) in phase.grouping_sets.iter().enumerate() {
                let key = gs.project(&row);
                let boundary = match &current_key[i] {
                    Some(k) => *k != key,
                    None => false,
                };

                if boundary {
                    let key_row = current_key[i].as_ref().expect("boundary implies a previous key");
                    self.flush_group(&mut arenas, &mut trans, &mut buffers, &phase, i, key_row)?;
                }

                if current_key[i].is_none() || boundary {
                    current_key[i] = Some(key.clone());
                    trans[i] = Some(self.new_trans_array(arenas.grouping_set_mut(i)));
                }

                if buffering {
                    buffers[i].push(row.clone().into_owned());
                } else {
                    let arena = arenas.grouping_set_mut(i);
                    let ts = trans[i].as_mut().expect("initialized above");
                    for d in &self.descriptors {
                        TransitionInvoker::apply_row(d, &mut ts[d.trans_no], arena, &row)?;
                    }
                }
            }
        }

        for i in 0..n {
            if let Some(key_row) = current_key[i].clone() {
                self.flush_group(&mut arenas, &mut trans, &mut buffers, &phase, i, &key_row)?;
            }
        }

        if phase.strategy != Strategy::Plain && !saw_any_row {
            self.emit_empty_grouping_sets(&phase, phase_idx)?;
        }

        Ok(())
    }

    fn flush_group(
        &mut self,
        arenas: &mut MemoryArenas,
        trans: &mut [Option<TransArray>],
        buffers: &mut [Vec<OwnedRow>],
        phase: &crate::plan::Phase,
        i: usize,
        key_row: &Row,
    ) -> Result<()> {
        let arena = arenas.grouping_set_mut(i);
        let ts = trans[i].take().expect("group must be initialized before flush");
        let mut ts = ts;

        if !buffers[i].is_empty() {
            for d in &self.descriptors {
                let rows = resolve_distinct_order_by(d, self.sorter_factory.as_ref(), buffers[i].clone());
                for row in rows {
                    TransitionInvoker::apply_row(d, &mut ts[d.trans_no], arena, &row)?;
                }
            }
            buffers[i].clear();
        }

        let out = self.finalize_group(arena, &ts, key_row, &phase.grouping_sets[i])?;
        self.output.push_back(out);
        arenas.reset_grouping_set(i);
        Ok(())
    }

    /// spec.md §4.1 "Empty input with grouping sets": when the child yields
    /// no rows at all, every empty grouping set (`GroupingSet::is_empty()`)
    /// in `phase` still produces one row with every grouped column forced
    /// to NULL, built from a freshly initialized (never transitioned)
    /// state. Driven by [`AggPlan::empty_grouping_sets`] rather than
    /// re-deriving which grouping sets are empty here.
    fn emit_empty_grouping_sets(&mut self, phase: &crate::plan::Phase, phase_idx: usize) -> Result<()> {
        let empties = self.plan.empty_grouping_sets();
        let Some(indices) = empties.get(&phase_idx) else {
            return Ok(());
        };
        for &idx in indices {
            let gs = &phase.grouping_sets[idx];
            let mut arena = GroupArena::new();
            let trans = self.new_trans_array(&mut arena);
            let out = self.finalize_group(&arena, &trans, &Row::empty(), gs)?;
            self.output.push_back(out);
        }
        Ok(())
    }

    fn run_hashed_phase(&mut self, phase_idx: usize) -> Result<()> {
        let phase = self.plan.phases[phase_idx].clone();
        let n = phase.grouping_sets.len();
        let mut tables: Vec<GroupKeyTable> = (0..n)
            .map(|_| {
                GroupKeyTable::new(
                    self.config.estimated_groups,
                    self.config.estimated_entry_size,
                    self.num_trans_slots,
                    self.config.work_mem / n.max(1),
                    self.config.estimated_groups * 4,
                )
            })
            .collect();
        let mut spill = SpillManager::new();
        let mut saw_any_row = false;

        loop {
            self.interrupt.check()?;
            let row = match self.child.next_row()? {
                Some(r) => r,
                None => break,
            };
            saw_any_row = true;
            self.process_hashed_row(&phase, &mut tables, &mut spill, &row)?;
        }

        if !saw_any_row {
            self.emit_empty_grouping_sets(&phase, phase_idx)?;
        }

        // spec.md §4.6 "finalize_initial_spills()": queue one SpillBatch per
        // non-empty partition for every grouping set that overflowed during
        // the fill loop, before draining in-memory groups.
        for i in 0..n {
            spill.finalize_episode(i)?;
        }

        self.drain_hashed_tables(&phase, &mut tables)?;
        self.drain_spilled_batches(&phase, &mut spill)?;
        Ok(())
    }

    fn process_hashed_row(
        &self,
        phase: &crate::plan::Phase,
        tables: &mut [GroupKeyTable],
        spill: &mut SpillManager,
        row: &Row,
    ) -> Result<()> {
        for (i, gs) in phase.grouping_sets.iter().enumerate() {
            let key = gs.project(row);
            let hash = aggexec_types::hash::hash_row(&key);
            let table = &mut tables[i];

            if !self.config.hashagg_mem_overflow {
                table.check_watermark();
            }

            if table.is_lookup_only() {
                match table.probe_existing(&key, hash) {
                    Some(idx) => {
                        let arena_ptr: *mut GroupArena = table.arena_mut();
                        let group = table.get_mut(idx);
                        for d in &self.descriptors {
                            // SAFETY-free alternative: re-borrow arena each call.
                            let arena = unsafe { &mut *arena_ptr };
                            TransitionInvoker::apply_row(d, &mut group.states[d.trans_no], arena, row)?;
                        }
                    }
                    None => {
                        spill.ensure_episode(
                            i,
                            0,
                            self.config.estimated_groups,
                            self.config.estimated_entry_size,
                            self.config.hash_partition_mem(),
                        )?;
                        // The full row is spilled, not just the grouping key:
                        // refill must re-run transitions over every
                        // aggregate's arguments, which may reach columns
                        // outside the grouping set (spec.md §4.4 "minimal
                        // tuple").
                        spill.write_tuple(i, row, hash)?;
                    }
                }
                continue;
            }

            let num_trans = self.num_trans_slots;
            let descriptors = &self.descriptors;
            let representative = &self.representative_for_trans;
            let idx = table.lookup_or_insert(&key, hash, |arena| {
                (0..num_trans)
                    .map(|t| {
                        let rep = representative[t];
                        PerTransState::init(arena, descriptors[rep].initcond.clone())
                    })
                    .collect()
            });

            if let Some(idx) = idx {
                let arena_ptr: *mut GroupArena = table.arena_mut();
                let group = table.get_mut(idx);
                for d in &self.descriptors {
                    let arena = unsafe { &mut *arena_ptr };
                    TransitionInvoker::apply_row(d, &mut group.states[d.trans_no], arena, row)?;
                }
            }
        }
        Ok(())
    }

    fn drain_hashed_tables(&mut self, phase: &crate::plan::Phase, tables: &mut [GroupKeyTable]) -> Result<()> {
        for (i, table) in tables.iter().enumerate() {
            for (_idx, group) in table.iter() {
                let out = self.finalize_group(table.arena(), &group.states, &group.key, &phase.grouping_sets[i])?;
                self.output.push_back(out);
            }
        }
        Ok(())
    }

    fn drain_spilled_batches(&mut self, phase: &crate::plan::Phase, spill: &mut SpillManager) -> Result<()> {
        while let Some(batch) = spill.pop_next_batch() {
            self.interrupt.check()?;
            self.spilled_batches += 1;
            let gs_idx = batch.grouping_set_id;
            trace!(
                grouping_set_id = gs_idx,
                tuples = batch.tuple_count,
                bit_depth = batch.bit_depth,
                "refilling spill batch"
            );
            let mut table = GroupKeyTable::new(
                self.config.estimated_groups.min(batch.tuple_count.max(1)),
                self.config.estimated_entry_size,
                self.num_trans_slots,
                self.config.work_mem,
                self.config.estimated_groups * 4,
            );

            let mut rows = Vec::with_capacity(batch.tuple_count);
            spill.replay_batch(&batch, |row, _hp| {
                rows.push(row);
                Ok(())
            })?;

            let gs = &phase.grouping_sets[gs_idx];
            for row in &rows {
                let key = gs.project(row);
                let hash = aggexec_types::hash::hash_row(&key);
                let num_trans = self.num_trans_slots;
                let descriptors = &self.descriptors;
                let representative = &self.representative_for_trans;
                let idx = table.lookup_or_insert(&key, hash, |arena| {
                    (0..num_trans)
                        .map(|t| {
                            let rep = representative[t];
                            PerTransState::init(arena, descriptors[rep].initcond.clone())
                        })
                        .collect()
                });
                match idx {
                    Some(idx) => {
                        let arena_ptr: *mut GroupArena = table.arena_mut();
                        let group = table.get_mut(idx);
                        for d in &self.descriptors {
                            let arena = unsafe { &mut *arena_ptr };
                            TransitionInvoker::apply_row(d, &mut group.states[d.trans_no], arena, row)?;
                        }
                    }
                    None => {
                        spill.ensure_episode(gs_idx, batch.bit_depth, rows.len(), self.config.estimated_entry_size, self.config.work_mem)?;
                        spill.write_tuple(gs_idx, row, hash)?;
                    }
                }
            }

            spill.finalize_episode(gs_idx)?;
            spill.release_tape_set(batch.tape_set)?;

            for (_idx, group) in table.iter() {
                let out = self.finalize_group(table.arena(), &group.states, &group.key, &phase.grouping_sets[gs_idx])?;
                self.output.push_back(out);
            }
        }
        Ok(())
    }
}
