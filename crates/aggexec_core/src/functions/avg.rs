//! `avg(int64)`, grounded on the `internal`-typed running state the
//! teacher's `avg.rs` keeps alongside `sum`/`count` (there backed by a
//! vectorized state struct; here a single [`InternalState`] value per
//! group, matching [`TransValue::Internal`]'s "expanded object" role).

use std::any::Any;
use std::sync::Arc;

use aggexec_error::{AggExecError, ErrorKind, Result};
use aggexec_types::datatype::DataTypeId;
use aggexec_types::row::Row;
use aggexec_types::scalar::OwnedScalarValue;

use crate::trans_state::{InternalState, TransValue};

use super::BuiltinAggregate;

#[derive(Debug, Clone, Copy)]
struct AvgState {
    sum: f64,
    count: i64,
}

impl InternalState for AvgState {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn InternalState> {
        Box::new(*self)
    }

    fn approx_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

fn downcast(state: &TransValue) -> Result<Option<AvgState>> {
    match state {
        // Still the `PerTransState::init` sentinel: no rows seen yet.
        TransValue::Scalar(OwnedScalarValue::Null) => Ok(None),
        TransValue::Internal(boxed) => {
            let avg = boxed
                .as_any()
                .downcast_ref::<AvgState>()
                .ok_or_else(|| AggExecError::with_kind(ErrorKind::TypeMismatch, "avg transition state had the wrong internal type"))?;
            Ok(Some(*avg))
        }
        other => Err(AggExecError::with_kind(
            ErrorKind::TypeMismatch,
            format!("avg transition state was {other:?}"),
        )),
    }
}

pub fn avg_int64() -> BuiltinAggregate {
    fn transfn(state: &TransValue, row: &Row) -> Result<TransValue> {
        let input = row[0]
            .as_i64()
            .ok_or_else(|| AggExecError::with_kind(ErrorKind::TypeMismatch, "avg(int64) expects an int64 argument"))?
            as f64;
        let next = match downcast(state)? {
            Some(AvgState { sum, count }) => AvgState { sum: sum + input, count: count + 1 },
            None => AvgState { sum: input, count: 1 },
        };
        Ok(TransValue::Internal(Box::new(next)))
    }

    fn finalfn(state: &TransValue, _direct_args: &[OwnedScalarValue]) -> Result<OwnedScalarValue> {
        match downcast(state)? {
            Some(AvgState { sum, count }) if count > 0 => Ok(OwnedScalarValue::Float64(sum / count as f64)),
            _ => Ok(OwnedScalarValue::Null),
        }
    }

    fn serialfn(state: &TransValue) -> Result<Vec<u8>> {
        let AvgState { sum, count } = downcast(state)?.unwrap_or(AvgState { sum: 0.0, count: 0 });
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(&sum.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        Ok(out)
    }

    fn deserialfn(bytes: &[u8]) -> Result<TransValue> {
        if bytes.len() != 16 {
            return Err(AggExecError::with_kind(ErrorKind::Internal, "malformed avg serialized state"));
        }
        let sum = f64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let count = i64::from_le_bytes(bytes[8..16].try_into().unwrap());
        Ok(TransValue::Internal(Box::new(AvgState { sum, count })))
    }

    fn combinefn(a: &TransValue, b: &TransValue) -> Result<TransValue> {
        let merged = match (downcast(a)?, downcast(b)?) {
            (Some(x), Some(y)) => AvgState { sum: x.sum + y.sum, count: x.count + y.count },
            (Some(x), None) => x,
            (None, Some(y)) => y,
            (None, None) => AvgState { sum: 0.0, count: 0 },
        };
        Ok(TransValue::Internal(Box::new(merged)))
    }

    BuiltinAggregate {
        name: "avg",
        arg_types: vec![Some(DataTypeId::Int64)],
        result_type: DataTypeId::Float64,
        transfn: Arc::new(transfn),
        transfn_strict: true,
        copy_first_input: false,
        finalfn: Some(Arc::new(finalfn)),
        finalfn_strict: true,
        serialfn: Some(Arc::new(serialfn)),
        deserialfn: Some(Arc::new(deserialfn)),
        combinefn: Some(Arc::new(combinefn)),
        combinefn_strict: false,
        initcond: None,
    }
}
