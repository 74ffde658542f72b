//! C2 — binds one aggregate call to its function handles.

use std::sync::Arc;

use aggexec_error::Result;
use aggexec_types::datatype::DataTypeId;
use aggexec_types::scalar::OwnedScalarValue;
use aggexec_types::row::Row;

use crate::trans_state::TransValue;

pub type TransFn = Arc<dyn Fn(&TransValue, &Row) -> Result<TransValue> + Send + Sync>;
pub type FinalFn = Arc<dyn Fn(&TransValue, &[OwnedScalarValue]) -> Result<OwnedScalarValue> + Send + Sync>;
pub type SerialFn = Arc<dyn Fn(&TransValue) -> Result<Vec<u8>> + Send + Sync>;
pub type DeserialFn = Arc<dyn Fn(&[u8]) -> Result<TransValue> + Send + Sync>;
pub type CombineFn = Arc<dyn Fn(&TransValue, &TransValue) -> Result<TransValue> + Send + Sync>;

/// Which of {transition, finalize, serialize, deserialize, combine} an
/// invocation performs, i.e. whether this is full or partial aggregation
/// (spec.md GLOSSARY, "split mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// Single-phase: transition then finalize.
    Full,
    /// Transition, then emit the raw (or serialized) transition state
    /// instead of finalizing.
    Partial,
    /// Skip transition; merge upstream partial states with `combinefn`,
    /// then finalize.
    Combine,
    /// Merge upstream partial states with `combinefn`, re-emit the
    /// (possibly re-serialized) transition state without finalizing.
    CombinePartial,
}

impl SplitMode {
    pub fn runs_transfn(self) -> bool {
        matches!(self, SplitMode::Full | SplitMode::Partial)
    }

    pub fn runs_combinefn(self) -> bool {
        matches!(self, SplitMode::Combine | SplitMode::CombinePartial)
    }

    pub fn runs_finalfn(self) -> bool {
        matches!(self, SplitMode::Full | SplitMode::Combine)
    }
}

/// Describes one aggregate call: `SUM(a ORDER BY b) FILTER (...)`, bound to
/// concrete function handles supplied by the embedder's function registry
/// (spec.md §6).
#[derive(Clone)]
pub struct PerAggDescriptor {
    /// Index into the driver's flat `PerTransState[]`
    /// (see [`crate::share::ShareDetector`]): multiple aggregate calls may
    /// share one `trans_no` when their inputs and transition function
    /// match.
    pub trans_no: usize,

    /// Position of this descriptor in the plan's aggregate list; also the
    /// index of its result slot once finalized.
    pub agg_no: usize,

    pub transfn: TransFn,
    pub transfn_strict: bool,

    /// Whether a strict transfn with NULL initcond may skip the first
    /// call entirely and copy the first non-NULL input verbatim into the
    /// arena (spec.md §4.7's `no_trans_value` fast path). Only sound when
    /// the transition type is binary-compatible with the input type
    /// (true for `sum`/`min`/`max`, false for `avg`'s internal running
    /// state).
    pub copy_first_input: bool,

    pub finalfn: Option<FinalFn>,
    pub finalfn_strict: bool,

    pub serialfn: Option<SerialFn>,
    pub deserialfn: Option<DeserialFn>,

    pub combinefn: Option<CombineFn>,
    pub combinefn_strict: bool,

    /// Initial transition value; `None` means NULL initcond.
    pub initcond: Option<OwnedScalarValue>,

    /// Input column indices (into the row as seen by this aggregate,
    /// after any FILTER has been applied upstream) that feed `transfn`.
    pub arg_indices: Vec<usize>,

    /// Direct arguments for ordered-set aggregates, evaluated once per
    /// descriptor rather than per row (SPEC_FULL.md §4 supplement).
    pub direct_args: Vec<OwnedScalarValue>,

    /// DISTINCT / ORDER BY per aggregate (spec.md §4.5). Only meaningful
    /// for the sorted/plain strategies; rejected statically for hashed
    /// aggregates by the planner-facing `validate` below.
    pub distinct: bool,
    pub order_by: Vec<usize>,

    pub split_mode: SplitMode,
    pub result_type: DataTypeId,
}

impl PerAggDescriptor {
    /// §4.7: strict transfn with NULL initcond requires compatible
    /// input/transition types. We can't inspect concrete Rust types behind
    /// the `TransFn` closure, so the embedder's function registry is
    /// expected to have already checked this at plan time; this re-checks
    /// the only thing expressible here: a strict transfn can't be paired
    /// with a non-NULL initcond of the wrong *kind* is left to the
    /// registry, but a strict transfn requires at least one argument to
    /// ever produce a value.
    pub fn validate(&self) -> Result<()> {
        if self.transfn_strict && self.initcond.is_none() && self.arg_indices.is_empty() {
            return Err(aggexec_error::AggExecError::with_kind(
                aggexec_error::ErrorKind::TypeMismatch,
                "strict transition function with NULL initcond requires at least one argument",
            ));
        }
        if matches!(
            self.split_mode,
            SplitMode::Combine | SplitMode::CombinePartial
        ) && self.combinefn.is_none()
        {
            return Err(aggexec_error::AggExecError::with_kind(
                aggexec_error::ErrorKind::Internal,
                "combine split mode requires a combine function",
            ));
        }
        Ok(())
    }

    /// Hashed strategies reject per-aggregate DISTINCT/ORDER BY statically
    /// (spec.md §4.5).
    pub fn reject_for_hashed(&self) -> Result<()> {
        if self.distinct || !self.order_by.is_empty() {
            return Err(aggexec_error::AggExecError::with_kind(
                aggexec_error::ErrorKind::Internal,
                "DISTINCT/ORDER BY aggregates cannot use the hashed strategy",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for PerAggDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerAggDescriptor")
            .field("trans_no", &self.trans_no)
            .field("agg_no", &self.agg_no)
            .field("arg_indices", &self.arg_indices)
            .field("distinct", &self.distinct)
            .field("order_by", &self.order_by)
            .field("split_mode", &self.split_mode)
            .field("result_type", &self.result_type)
            .finish_non_exhaustive()
    }
}
