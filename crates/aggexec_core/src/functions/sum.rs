use std::sync::Arc;

use aggexec_error::{AggExecError, ErrorKind, Result};
use aggexec_types::datatype::DataTypeId;
use aggexec_types::row::Row;
use aggexec_types::scalar::OwnedScalarValue;

use crate::trans_state::TransValue;

use super::BuiltinAggregate;

/// Strict, `NULL` initcond: the transition invoker copies the first
/// non-NULL input verbatim (spec.md §4.7's `no_trans_value` path), so this
/// body only ever sees an already-initialized accumulator.
pub fn sum_int64() -> BuiltinAggregate {
    fn transfn(state: &TransValue, row: &Row) -> Result<TransValue> {
        let current = match state {
            TransValue::Scalar(OwnedScalarValue::Int64(n)) => *n,
            other => {
                return Err(AggExecError::with_kind(
                    ErrorKind::TypeMismatch,
                    format!("sum(int64) transition state was {other:?}"),
                ))
            }
        };
        let input = row[0]
            .as_i64()
            .ok_or_else(|| AggExecError::with_kind(ErrorKind::TypeMismatch, "sum(int64) expects an int64 argument"))?;
        Ok(TransValue::Scalar(OwnedScalarValue::Int64(current + input)))
    }

    fn combinefn(a: &TransValue, b: &TransValue) -> Result<TransValue> {
        // Mirrors the `no_trans_value` fast path transition invocation uses:
        // an uncombined sentinel on either side just adopts the other side.
        match (a, b) {
            (TransValue::Scalar(OwnedScalarValue::Null), _) => Ok(b.clone()),
            (_, TransValue::Scalar(OwnedScalarValue::Null)) => Ok(a.clone()),
            _ => transfn(
                a,
                &Row::from_iter(vec![OwnedScalarValue::Int64(match b {
                    TransValue::Scalar(OwnedScalarValue::Int64(n)) => *n,
                    _ => 0,
                })]),
            ),
        }
    }

    BuiltinAggregate {
        name: "sum",
        arg_types: vec![Some(DataTypeId::Int64)],
        result_type: DataTypeId::Int64,
        transfn: Arc::new(transfn),
        transfn_strict: true,
        copy_first_input: true,
        finalfn: None,
        finalfn_strict: false,
        serialfn: None,
        deserialfn: None,
        combinefn: Some(Arc::new(combinefn)),
        combinefn_strict: true,
        initcond: None,
    }
}

pub fn sum_float64() -> BuiltinAggregate {
    fn transfn(state: &TransValue, row: &Row) -> Result<TransValue> {
        let current = match state {
            TransValue::Scalar(OwnedScalarValue::Float64(n)) => *n,
            other => {
                return Err(AggExecError::with_kind(
                    ErrorKind::TypeMismatch,
                    format!("sum(float64) transition state was {other:?}"),
                ))
            }
        };
        let input = row[0].as_f64().ok_or_else(|| {
            AggExecError::with_kind(ErrorKind::TypeMismatch, "sum(float64) expects a numeric argument")
        })?;
        Ok(TransValue::Scalar(OwnedScalarValue::Float64(current + input)))
    }

    fn combinefn(a: &TransValue, b: &TransValue) -> Result<TransValue> {
        transfn(
            a,
            &Row::from_iter(vec![OwnedScalarValue::Float64(match b {
                TransValue::Scalar(OwnedScalarValue::Float64(n)) => *n,
                _ => 0.0,
            })]),
        )
    }

    BuiltinAggregate {
        name: "sum",
        arg_types: vec![Some(DataTypeId::Float64)],
        result_type: DataTypeId::Float64,
        transfn: Arc::new(transfn),
        transfn_strict: true,
        copy_first_input: true,
        finalfn: None,
        finalfn_strict: false,
        serialfn: None,
        deserialfn: None,
        combinefn: Some(Arc::new(combinefn)),
        combinefn_strict: true,
        initcond: None,
    }
}
