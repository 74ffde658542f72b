//! C8 — two-level aggregate-call deduplication (spec.md §4.8).

use std::collections::HashMap;

use aggexec_types::datatype::DataTypeId;

use crate::descriptor::SplitMode;

/// Everything the spec says must match for one aggregate call to be
/// identical to another. Expression trees, FILTER clauses, and direct
/// arguments are opaque to this module, so callers pass in a stable hash
/// of each (computed by the external expression builder) rather than the
/// expressions themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggCallSignature {
    pub input_collation: Option<u64>,
    pub transtype: TransTypeTag,
    pub variadic: bool,
    pub agg_kind: u64,
    pub arg_exprs: Vec<u64>,
    pub order_by: Vec<u64>,
    pub distinct: bool,
    pub filter: Option<u64>,
    pub function_id: u64,
    pub result_type: DataTypeId,
    pub result_collation: Option<u64>,
    pub direct_args: Vec<u64>,

    // Per-transition-reuse-only fields (not part of per-aggregate identity
    // beyond the first eight above, but needed to decide trans-state
    // sharing).
    pub transfn_id: u64,
    pub serialfn_id: Option<u64>,
    pub deserialfn_id: Option<u64>,
    pub initcond: Option<u64>,

    /// Whether the expression tree for this call contains a volatile
    /// function. Volatile calls are never shared with anything, including
    /// themselves across positions.
    pub volatile: bool,

    /// Whether this call's final function would mutate the shared
    /// transition state in place (e.g. an expanded-object final function
    /// that consumes its input). Two calls can only share a `trans_no`
    /// when neither's final function modifies state, or when the chosen
    /// split mode never runs a final function at all.
    pub final_modifies_state: bool,
    pub split_mode: SplitMode,
}

/// First eight fields used for per-aggregate identity (spec.md §4.8 item 1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AggKey {
    input_collation: Option<u64>,
    transtype: TransTypeTag,
    variadic: bool,
    agg_kind: u64,
    arg_exprs: Vec<u64>,
    order_by: Vec<u64>,
    distinct: bool,
    filter: Option<u64>,
    function_id: u64,
    result_type: DataTypeId,
    result_collation: Option<u64>,
    direct_args: Vec<u64>,
}

/// First eight of the above plus transfn/transtype/serialize/deserialize/
/// initcond (spec.md §4.8 item 2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TransKey {
    input_collation: Option<u64>,
    transtype: TransTypeTag,
    variadic: bool,
    agg_kind: u64,
    arg_exprs: Vec<u64>,
    order_by: Vec<u64>,
    distinct: bool,
    filter: Option<u64>,
    transfn_id: u64,
    serialfn_id: Option<u64>,
    deserialfn_id: Option<u64>,
    initcond: Option<u64>,
}

/// Opaque tag identifying a transition type well enough for equality
/// comparisons without needing a real type system here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransTypeTag(pub u64);

impl AggCallSignature {
    fn agg_key(&self) -> AggKey {
        AggKey {
            input_collation: self.input_collation,
            transtype: self.transtype,
            variadic: self.variadic,
            agg_kind: self.agg_kind,
            arg_exprs: self.arg_exprs.clone(),
            order_by: self.order_by.clone(),
            distinct: self.distinct,
            filter: self.filter,
            function_id: self.function_id,
            result_type: self.result_type,
            result_collation: self.result_collation,
            direct_args: self.direct_args.clone(),
        }
    }

    fn trans_key(&self) -> TransKey {
        TransKey {
            input_collation: self.input_collation,
            transtype: self.transtype,
            variadic: self.variadic,
            agg_kind: self.agg_kind,
            arg_exprs: self.arg_exprs.clone(),
            order_by: self.order_by.clone(),
            distinct: self.distinct,
            filter: self.filter,
            transfn_id: self.transfn_id,
            serialfn_id: self.serialfn_id,
            deserialfn_id: self.deserialfn_id,
            initcond: self.initcond,
        }
    }
}

/// Output of deduplication: for each input call (by position), which
/// result slot and which shared transition-state slot it maps to.
#[derive(Debug, Clone, Default)]
pub struct SharePlan {
    /// `agg_slot[i]` = result slot for call `i`; ties mean the calls are
    /// literally the same computation and only need to be evaluated once.
    pub agg_slot: Vec<usize>,
    /// `trans_no[i]` = shared transition-state index for call `i`.
    pub trans_no: Vec<usize>,
    /// Number of distinct result slots.
    pub num_agg_slots: usize,
    /// Number of distinct transition states.
    pub num_trans_slots: usize,
}

/// Builds a [`SharePlan`] deterministically from a list of call signatures,
/// in call order (spec.md DESIGN NOTES: "The ShareDetector builds this
/// mapping deterministically at initialization").
#[derive(Debug, Default)]
pub struct ShareDetector;

impl ShareDetector {
    pub fn build(calls: &[AggCallSignature]) -> SharePlan {
        let mut agg_slots: HashMap<AggKey, usize> = HashMap::new();
        let mut trans_slots: HashMap<TransKey, usize> = HashMap::new();
        let mut next_agg_slot = 0usize;
        let mut next_trans_slot = 0usize;

        let mut agg_slot = Vec::with_capacity(calls.len());
        let mut trans_no = Vec::with_capacity(calls.len());

        for call in calls {
            let slot = if call.volatile {
                // Volatile calls never share, even with an identical copy
                // of themselves.
                let id = next_agg_slot;
                next_agg_slot += 1;
                id
            } else {
                let key = call.agg_key();
                *agg_slots.entry(key).or_insert_with(|| {
                    let id = next_agg_slot;
                    next_agg_slot += 1;
                    id
                })
            };
            agg_slot.push(slot);

            // Per-transition reuse additionally requires that neither
            // side's final function mutates the transition state in
            // place, unless the chosen split mode never runs a final
            // function at all.
            let shareable =
                !call.volatile && (!call.split_mode.runs_finalfn() || !call.final_modifies_state);
            let tno = if shareable {
                let key = call.trans_key();
                *trans_slots.entry(key).or_insert_with(|| {
                    let id = next_trans_slot;
                    next_trans_slot += 1;
                    id
                })
            } else {
                let id = next_trans_slot;
                next_trans_slot += 1;
                id
            };
            trans_no.push(tno);
        }

        SharePlan {
            agg_slot,
            trans_no,
            num_agg_slots: next_agg_slot,
            num_trans_slots: next_trans_slot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AggCallSignature {
        AggCallSignature {
            input_collation: None,
            transtype: TransTypeTag(1),
            variadic: false,
            agg_kind: 1,
            arg_exprs: vec![10],
            order_by: vec![],
            distinct: false,
            filter: None,
            function_id: 100,
            result_type: DataTypeId::Int64,
            result_collation: None,
            direct_args: vec![],
            transfn_id: 1000,
            serialfn_id: None,
            deserialfn_id: None,
            initcond: None,
            volatile: false,
            final_modifies_state: false,
            split_mode: SplitMode::Full,
        }
    }

    #[test]
    fn identical_calls_share_both_levels() {
        let calls = vec![base(), base()];
        let plan = ShareDetector::build(&calls);
        assert_eq!(plan.agg_slot[0], plan.agg_slot[1]);
        assert_eq!(plan.trans_no[0], plan.trans_no[1]);
        assert_eq!(plan.num_agg_slots, 1);
    }

    #[test]
    fn different_args_do_not_share() {
        let mut b = base();
        b.arg_exprs = vec![11];
        let calls = vec![base(), b];
        let plan = ShareDetector::build(&calls);
        assert_ne!(plan.agg_slot[0], plan.agg_slot[1]);
    }

    #[test]
    fn volatile_never_shares() {
        let mut a = base();
        a.volatile = true;
        let mut b = base();
        b.volatile = true;
        let plan = ShareDetector::build(&[a, b]);
        assert_ne!(plan.agg_slot[0], plan.agg_slot[1]);
    }

    #[test]
    fn shared_input_different_transfn_shares_agg_not_trans() {
        // Same first-eight fields but distinct transfn -> per-aggregate
        // identity can't match (function_id differs along with transfn),
        // so use a case where only trans-level fields differ: different
        // serialfn but otherwise identical -> per-aggregate slot still
        // splits because function_id differs in realistic plans, but here
        // we only vary serialfn to exercise independent trans sharing.
        let mut b = base();
        b.function_id = 200;
        b.serialfn_id = Some(5);
        let plan = ShareDetector::build(&[base(), b]);
        assert_ne!(plan.agg_slot[0], plan.agg_slot[1]);
        assert_ne!(plan.trans_no[0], plan.trans_no[1]);
    }
}
