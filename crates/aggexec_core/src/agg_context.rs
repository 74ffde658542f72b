//! Support callbacks exposed to user-defined aggregate transition/final
//! functions (spec.md §6): `AggCheckCallContext`, `AggGetAggref`,
//! `AggGetTempMemoryContext`, `AggStateIsShared`, `AggRegisterCallback`.
//!
//! Postgres hands these to a C transition function via `FunctionCallInfo`;
//! here an embedder's [`crate::descriptor::TransFn`] closure that wants
//! them takes an extra `&mut AggContext` argument of its own (this crate's
//! builtins in [`crate::functions`] don't need it and ignore it). The
//! driver constructs one per row per grouping set, borrowing the active
//! [`crate::arena::GroupArena`] and [`crate::arena::MemoryArenas`]
//! callback slot for that grouping set.

use crate::arena::{ArenaCallback, MemoryArenas};

/// Whether the current call is happening inside ordinary grouped
/// aggregation, a window function, or neither (`AggCheckCallContext`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallContextKind {
    Aggregate,
    Window,
    None,
}

/// Stable identity for the aggregate call a [`AggContext`] was constructed
/// for, standing in for Postgres's `Aggref` planner node
/// (`AggGetAggref`). Opaque to this crate; the embedder's planner assigns
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggrefHandle(pub u32);

/// Per-row handle passed to transition/final functions that need more than
/// `(state, args)` (spec.md §6).
pub struct AggContext<'a> {
    kind: CallContextKind,
    aggref: Option<AggrefHandle>,
    shared: bool,
    arenas: &'a mut MemoryArenas,
    grouping_set_idx: Option<usize>,
}

impl<'a> AggContext<'a> {
    pub fn new(
        kind: CallContextKind,
        aggref: Option<AggrefHandle>,
        shared: bool,
        arenas: &'a mut MemoryArenas,
        grouping_set_idx: Option<usize>,
    ) -> Self {
        AggContext {
            kind,
            aggref,
            shared,
            arenas,
            grouping_set_idx,
        }
    }

    /// `AggCheckCallContext`: returns the kind of call this is, plus (via
    /// [`AggContext::current_grouping_set`]) the out-arg grouping-set
    /// arena index spec.md describes as an out-parameter of the same
    /// call.
    pub fn check_call_context(&self) -> CallContextKind {
        self.kind
    }

    /// Index into the driver's per-grouping-set arenas for the group this
    /// call is updating; `None` for the hashed strategy, which keeps all
    /// groups in one shared arena instead.
    pub fn current_grouping_set(&self) -> Option<usize> {
        self.grouping_set_idx
    }

    /// `AggGetAggref`: the planner node for this call, or `None` if this
    /// context isn't running inside an aggregate call at all.
    pub fn get_aggref(&self) -> Option<AggrefHandle> {
        if self.kind == CallContextKind::Aggregate {
            self.aggref
        } else {
            None
        }
    }

    /// `AggStateIsShared`: whether this call's `trans_no` is shared with
    /// another aggregate call (see [`crate::share::ShareDetector`]) — a
    /// transition function that mutates an expanded object in place must
    /// check this before doing so destructively.
    pub fn state_is_shared(&self) -> bool {
        self.shared
    }

    /// `AggGetTempMemoryContext`: a scratch arena a transition function
    /// can use for intermediate allocations that should not outlive this
    /// row (spec.md §5: "child callbacks observing the per-tuple arena
    /// must not retain pointers past the next row boundary"). Modeled as
    /// the hash-table arena when there is no per-group arena (hashed
    /// strategy), and the active group's own arena otherwise — either way
    /// it is reset on the same boundary the real transition state is.
    pub fn temp_memory_context(&mut self) -> &mut crate::arena::GroupArena {
        match self.grouping_set_idx {
            Some(idx) => self.arenas.grouping_set_mut(idx),
            None => self.arenas.hash_arena_mut(),
        }
    }

    /// `AggRegisterCallback`: registers `cb` against the current
    /// grouping-set arena (or the shared hash arena for the hashed
    /// strategy). Fires once, on the next reset/destroy of that arena —
    /// never on an error-unwind path (spec.md §6).
    pub fn register_callback(&mut self, cb: ArenaCallback) {
        match self.grouping_set_idx {
            Some(idx) => self.arenas.register_grouping_set_callback(idx, cb),
            None => self.arenas.register_hash_callback(cb),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn registered_callback_fires_on_reset_not_before() {
        let mut arenas = MemoryArenas::with_grouping_sets(1);
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let mut ctx = AggContext::new(CallContextKind::Aggregate, Some(AggrefHandle(1)), false, &mut arenas, Some(0));
            let fired = fired.clone();
            ctx.register_callback(Box::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }));
            assert_eq!(fired.load(Ordering::SeqCst), 0);
        }
        arenas.reset_grouping_set(0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hashed_strategy_uses_the_shared_arena() {
        let mut arenas = MemoryArenas::with_grouping_sets(0);
        let mut ctx = AggContext::new(CallContextKind::Aggregate, None, true, &mut arenas, None);
        assert!(ctx.state_is_shared());
        assert_eq!(ctx.current_grouping_set(), None);
        let _ = ctx.temp_memory_context();
    }
}
