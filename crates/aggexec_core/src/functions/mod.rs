//! Builtin aggregate function handles.
//!
//! In the style of `functions::aggregate`: a flat registry of builtins
//! (there `BUILTIN_AGGREGATE_FUNCTIONS: Lazy<Vec<Box<dyn
//! AggregateFunction>>>`, built with `once_cell::sync::Lazy`), one file per
//! function family. Those functions operate on whole `Array` batches;
//! these operate row-at-a-time and plug straight into a
//! [`crate::descriptor::PerAggDescriptor`] since this crate's transition
//! semantics are row-oriented (see DESIGN.md).

mod avg;
mod count;
mod minmax;
mod sum;

use once_cell::sync::Lazy;

use aggexec_types::datatype::DataTypeId;
use aggexec_types::scalar::OwnedScalarValue;

use crate::descriptor::{CombineFn, DeserialFn, FinalFn, SerialFn, TransFn};

/// A ready-to-bind aggregate function, independent of any particular call
/// site (arg indices, DISTINCT/ORDER BY, FILTER are added when a
/// [`crate::descriptor::PerAggDescriptor`] is built from this).
pub struct BuiltinAggregate {
    pub name: &'static str,
    /// One entry per argument; `None` means "any type" (used by `count`).
    pub arg_types: Vec<Option<DataTypeId>>,
    pub result_type: DataTypeId,
    pub transfn: TransFn,
    pub transfn_strict: bool,
    pub copy_first_input: bool,
    pub finalfn: Option<FinalFn>,
    pub finalfn_strict: bool,
    pub serialfn: Option<SerialFn>,
    pub deserialfn: Option<DeserialFn>,
    pub combinefn: Option<CombineFn>,
    pub combinefn_strict: bool,
    pub initcond: Option<OwnedScalarValue>,
}

pub static BUILTIN_AGGREGATES: Lazy<Vec<BuiltinAggregate>> = Lazy::new(|| {
    vec![
        count::count_star(),
        count::count(),
        sum::sum_int64(),
        sum::sum_float64(),
        minmax::min_int64(),
        minmax::max_int64(),
        minmax::min_float64(),
        minmax::max_float64(),
        avg::avg_int64(),
    ]
});

pub fn lookup(name: &str, arg_types: &[DataTypeId]) -> Option<&'static BuiltinAggregate> {
    BUILTIN_AGGREGATES.iter().find(|f| {
        f.name.eq_ignore_ascii_case(name)
            && f.arg_types.len() == arg_types.len()
            && f.arg_types
                .iter()
                .zip(arg_types)
                .all(|(expected, actual)| expected.map_or(true, |t| t == *actual))
    })
}
