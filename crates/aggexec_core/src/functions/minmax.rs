use std::sync::Arc;

use aggexec_error::{AggExecError, ErrorKind, Result};
use aggexec_types::datatype::DataTypeId;
use aggexec_types::row::Row;
use aggexec_types::scalar::OwnedScalarValue;

use crate::trans_state::TransValue;

use super::BuiltinAggregate;

fn int64_extreme(name: &'static str, keep_left: fn(i64, i64) -> bool) -> BuiltinAggregate {
    let transfn = move |state: &TransValue, row: &Row| -> Result<TransValue> {
        let current = match state {
            TransValue::Scalar(OwnedScalarValue::Int64(n)) => *n,
            other => {
                return Err(AggExecError::with_kind(
                    ErrorKind::TypeMismatch,
                    format!("{name}(int64) transition state was {other:?}"),
                ))
            }
        };
        let input = row[0]
            .as_i64()
            .ok_or_else(|| AggExecError::with_kind(ErrorKind::TypeMismatch, format!("{name}(int64) expects an int64 argument")))?;
        let kept = if keep_left(current, input) { current } else { input };
        Ok(TransValue::Scalar(OwnedScalarValue::Int64(kept)))
    };

    let combinefn = move |a: &TransValue, b: &TransValue| -> Result<TransValue> {
        let av = match a {
            TransValue::Scalar(OwnedScalarValue::Int64(n)) => *n,
            _ => return Ok(b.clone()),
        };
        let bv = match b {
            TransValue::Scalar(OwnedScalarValue::Int64(n)) => *n,
            _ => return Ok(a.clone()),
        };
        Ok(TransValue::Scalar(OwnedScalarValue::Int64(if keep_left(av, bv) { av } else { bv })))
    };

    BuiltinAggregate {
        name,
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

fn float64_extreme(name: &'static str, keep_left: fn(f64, f64) -> bool) -> BuiltinAggregate {
    let transfn = move |state: &TransValue, row: &Row| -> Result<TransValue> {
        let current = match state {
            TransValue::Scalar(OwnedScalarValue::Float64(n)) => *n,
            other => {
                return Err(AggExecError::with_kind(
                    ErrorKind::TypeMismatch,
                    format!("{name}(float64) transition state was {other:?}"),
                ))
            }
        };
        let input = row[0].as_f64().ok_or_else(|| {
            AggExecError::with_kind(ErrorKind::TypeMismatch, format!("{name}(float64) expects a numeric argument"))
        })?;
        let kept = if keep_left(current, input) { current } else { input };
        Ok(TransValue::Scalar(OwnedScalarValue::Float64(kept)))
    };

    let combinefn = move |a: &TransValue, b: &TransValue| -> Result<TransValue> {
        let av = match a {
            TransValue::Scalar(OwnedScalarValue::Float64(n)) => *n,
            _ => return Ok(b.clone()),
        };
        let bv = match b {
            TransValue::Scalar(OwnedScalarValue::Float64(n)) => *n,
            _ => return Ok(a.clone()),
        };
        Ok(TransValue::Scalar(OwnedScalarValue::Float64(if keep_left(av, bv) { av } else { bv })))
    };

    BuiltinAggregate {
        name,
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

pub fn min_int64() -> BuiltinAggregate {
    int64_extreme("min", |a, b| a <= b)
}

pub fn max_int64() -> BuiltinAggregate {
    int64_extreme("max", |a, b| a >= b)
}

pub fn min_float64() -> BuiltinAggregate {
    float64_extreme("min", |a, b| a <= b)
}

pub fn max_float64() -> BuiltinAggregate {
    float64_extreme("max", |a, b| a >= b)
}
