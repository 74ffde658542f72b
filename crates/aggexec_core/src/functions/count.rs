use std::sync::Arc;

use aggexec_types::datatype::DataTypeId;
use aggexec_types::scalar::OwnedScalarValue;

use crate::trans_state::TransValue;

use super::BuiltinAggregate;

fn increment(state: &TransValue, _row: &aggexec_types::row::Row) -> aggexec_error::Result<TransValue> {
    let n = match state {
        TransValue::Scalar(OwnedScalarValue::Int64(n)) => *n,
        _ => 0,
    };
    Ok(TransValue::Scalar(OwnedScalarValue::Int64(n + 1)))
}

fn combine(a: &TransValue, b: &TransValue) -> aggexec_error::Result<TransValue> {
    let av = match a {
        TransValue::Scalar(OwnedScalarValue::Int64(n)) => *n,
        _ => 0,
    };
    let bv = match b {
        TransValue::Scalar(OwnedScalarValue::Int64(n)) => *n,
        _ => 0,
    };
    Ok(TransValue::Scalar(OwnedScalarValue::Int64(av + bv)))
}

/// `count(*)`: non-strict, increments unconditionally.
pub fn count_star() -> BuiltinAggregate {
    BuiltinAggregate {
        name: "count_star",
        arg_types: vec![],
        result_type: DataTypeId::Int64,
        transfn: Arc::new(increment),
        transfn_strict: false,
        copy_first_input: true,
        finalfn: None,
        finalfn_strict: false,
        serialfn: None,
        deserialfn: None,
        combinefn: Some(Arc::new(combine)),
        combinefn_strict: false,
        initcond: Some(OwnedScalarValue::Int64(0)),
    }
}

/// `count(expr)`: strict, the transition invoker only calls `transfn` for
/// non-NULL inputs, so the body is identical to `count(*)`.
pub fn count() -> BuiltinAggregate {
    BuiltinAggregate {
        name: "count",
        arg_types: vec![None],
        result_type: DataTypeId::Int64,
        transfn: Arc::new(increment),
        transfn_strict: true,
        copy_first_input: true,
        finalfn: None,
        finalfn_strict: false,
        serialfn: None,
        deserialfn: None,
        combinefn: Some(Arc::new(combine)),
        combinefn_strict: false,
        initcond: Some(OwnedScalarValue::Int64(0)),
    }
}
