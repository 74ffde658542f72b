//! C7 — TransitionInvoker: applies one row (or one partial state) to one
//! aggregate's transition state, and finalizes it (spec.md §4.5, §4.7).

use aggexec_error::{AggExecError, ErrorKind, Result};
use aggexec_types::row::{OwnedRow, Row};
use aggexec_types::scalar::OwnedScalarValue;

use crate::arena::GroupArena;
use crate::descriptor::PerAggDescriptor;
use crate::sorter::{dedup_sorted, SorterFactory};
use crate::trans_state::{PerTransState, TransValue};

/// Output of a partial-aggregation step: either the raw transition value
/// (no `serialfn` configured) or its serialized bytes.
#[derive(Debug)]
pub enum PartialOutput {
    Raw(TransValue),
    Serialized(Vec<u8>),
}

pub struct TransitionInvoker;

impl TransitionInvoker {
    /// Applies one already-projected, already-DISTINCT/ORDER-BY-resolved
    /// row to `trans`'s transition state.
    pub fn apply_row(
        descriptor: &PerAggDescriptor,
        trans: &mut PerTransState,
        arena: &mut GroupArena,
        row: &Row,
    ) -> Result<()> {
        if !descriptor.split_mode.runs_transfn() {
            return Ok(());
        }

        let projected = row.project(&descriptor.arg_indices);
        let args_null = projected.iter().any(|v| v.is_null());
        if descriptor.transfn_strict && args_null {
            return Ok(());
        }

        // §4.7 fast path: a strict transfn with NULL initcond adopts the
        // first non-NULL input verbatim instead of calling transfn, but
        // only when doing so is type-safe (single by-value argument).
        if trans.no_trans_value && descriptor.copy_first_input && descriptor.arg_indices.len() == 1 {
            let value = projected[0].clone().into_owned();
            let is_null = value.is_null();
            arena.replace(trans.trans_value, TransValue::Scalar(value));
            trans.no_trans_value = false;
            trans.trans_is_null = is_null;
            return Ok(());
        }

        // §4.5 "poisoned NULL": once a strict transfn's state has gone
        // NULL after becoming valid, it stays NULL forever; the transfn
        // is never called again for this group.
        if descriptor.transfn_strict && trans.trans_is_null {
            return Ok(());
        }

        let current = trans.value(arena).clone();
        let next = (descriptor.transfn)(&current, &projected)?;
        trans.trans_is_null = next.is_null();
        trans.no_trans_value = false;
        arena.replace(trans.trans_value, next);
        Ok(())
    }

    /// Merges an upstream partial state into `trans` (Combine/CombinePartial
    /// split modes).
    pub fn combine_partial(
        descriptor: &PerAggDescriptor,
        trans: &mut PerTransState,
        arena: &mut GroupArena,
        partial: TransValue,
    ) -> Result<()> {
        if !descriptor.split_mode.runs_combinefn() {
            return Ok(());
        }
        let combinefn = descriptor
            .combinefn
            .as_ref()
            .ok_or_else(|| AggExecError::with_kind(ErrorKind::Internal, "combine split mode missing a combine function"))?;

        if descriptor.combinefn_strict && partial.is_null() {
            return Ok(());
        }

        let current = trans.value(arena).clone();
        let next = combinefn(&current, &partial)?;
        trans.trans_is_null = next.is_null();
        trans.no_trans_value = false;
        arena.replace(trans.trans_value, next);
        Ok(())
    }

    /// Full finalization (Full/Combine split modes).
    pub fn finalize(
        descriptor: &PerAggDescriptor,
        trans: &PerTransState,
        arena: &GroupArena,
    ) -> Result<OwnedScalarValue> {
        let current = trans.value(arena);
        if descriptor.finalfn_strict && current.is_null() {
            return Ok(OwnedScalarValue::Null);
        }
        match &descriptor.finalfn {
            Some(finalfn) => finalfn(current, &descriptor.direct_args),
            None => match current {
                TransValue::Scalar(v) => Ok(v.clone()),
                TransValue::Internal(_) => Err(AggExecError::with_kind(
                    ErrorKind::Internal,
                    "aggregate has an internal transition type but no final function",
                )),
            },
        }
    }

    /// Emits this group's transition state for upstream partial aggregation
    /// (Partial/CombinePartial split modes).
    pub fn finalize_partial(
        descriptor: &PerAggDescriptor,
        trans: &PerTransState,
        arena: &GroupArena,
    ) -> Result<PartialOutput> {
        let current = trans.value(arena);
        match &descriptor.serialfn {
            Some(serialfn) => Ok(PartialOutput::Serialized(serialfn(current)?)),
            None => Ok(PartialOutput::Raw(current.clone())),
        }
    }

    pub fn deserialize_partial(descriptor: &PerAggDescriptor, bytes: &[u8]) -> Result<TransValue> {
        descriptor
            .deserialfn
            .as_ref()
            .ok_or_else(|| AggExecError::with_kind(ErrorKind::Internal, "no deserialize function configured"))
            .and_then(|f| f(bytes))
    }
}

/// Resolves one group's DISTINCT/ORDER BY buffer for a single aggregate
/// into the row sequence that should actually be fed to `transfn`
/// (spec.md §4.5). A no-op when the aggregate has neither.
pub fn resolve_distinct_order_by(
    descriptor: &PerAggDescriptor,
    sorter_factory: &dyn SorterFactory,
    buffered_rows: Vec<OwnedRow>,
) -> Vec<OwnedRow> {
    if !descriptor.distinct && descriptor.order_by.is_empty() {
        return buffered_rows;
    }

    let sort_keys = if !descriptor.order_by.is_empty() {
        descriptor.order_by.clone()
    } else {
        descriptor.arg_indices.clone()
    };

    let mut sorter = sorter_factory.create(sort_keys);
    for row in buffered_rows {
        sorter.put(row);
    }
    sorter.perform_sort();

    if descriptor.distinct {
        dedup_sorted(sorter.as_mut(), &descriptor.arg_indices)
    } else {
        let mut out = Vec::new();
        while let Some(row) = sorter.get_tuple() {
            out.push(row);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggexec_types::scalar::ScalarValue;
    use std::sync::Arc;

    fn sum_descriptor() -> PerAggDescriptor {
        PerAggDescriptor {
            trans_no: 0,
            agg_no: 0,
            transfn: Arc::new(|state, row| {
                let current = match state {
                    TransValue::Scalar(OwnedScalarValue::Int64(n)) => *n,
                    _ => 0,
                };
                let input = row[0].as_i64().unwrap_or(0);
                Ok(TransValue::Scalar(OwnedScalarValue::Int64(current + input)))
            }),
            transfn_strict: true,
            copy_first_input: true,
            finalfn: None,
            finalfn_strict: false,
            serialfn: None,
            deserialfn: None,
            combinefn: None,
            combinefn_strict: false,
            initcond: None,
            arg_indices: vec![0],
            direct_args: vec![],
            distinct: false,
            order_by: vec![],
            split_mode: crate::descriptor::SplitMode::Full,
            result_type: aggexec_types::datatype::DataTypeId::Int64,
        }
    }

    #[test]
    fn strict_transfn_skips_null_rows() {
        let descriptor = sum_descriptor();
        let mut arena = GroupArena::new();
        let mut trans = PerTransState::init(&mut arena, None);

        TransitionInvoker::apply_row(&descriptor, &mut trans, &mut arena, &Row::from_iter(vec![ScalarValue::Null])).unwrap();
        assert!(trans.no_trans_value);

        TransitionInvoker::apply_row(&descriptor, &mut trans, &mut arena, &Row::from_iter(vec![ScalarValue::Int64(5)])).unwrap();
        assert!(!trans.no_trans_value);
        TransitionInvoker::apply_row(&descriptor, &mut trans, &mut arena, &Row::from_iter(vec![ScalarValue::Int64(7)])).unwrap();

        let result = TransitionInvoker::finalize(&descriptor, &trans, &arena).unwrap();
        assert_eq!(result, OwnedScalarValue::Int64(12));
    }

    #[test]
    fn distinct_collapses_duplicate_rows() {
        let descriptor = {
            let mut d = sum_descriptor();
            d.distinct = true;
            d
        };
        let factory = crate::sorter::DefaultSorterFactory;
        let rows = vec![
            Row::from_iter(vec![ScalarValue::Int64(3)]),
            Row::from_iter(vec![ScalarValue::Int64(1)]),
            Row::from_iter(vec![ScalarValue::Int64(3)]),
        ];
        let resolved = resolve_distinct_order_by(&descriptor, &factory, rows);
        assert_eq!(resolved.len(), 2);
    }
}
