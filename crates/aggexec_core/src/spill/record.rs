//! Binary encoding for spilled tuples: `[hash:u32][tuple_len:u32][tuple]`
//! (spec.md §4.4). The hash prefix stored is the same 32-bit prefix used by
//! [`crate::group_table::entry`], so a reader can refill a hash table
//! without recomputing hashes.

use std::borrow::Cow;

use aggexec_error::{AggExecError, ErrorKind, Result};
use aggexec_types::row::{OwnedRow, Row};
use aggexec_types::scalar::ScalarValue;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT64: u8 = 2;
const TAG_FLOAT64: u8 = 3;
const TAG_UTF8: u8 = 4;
const TAG_BINARY: u8 = 5;

fn encode_scalar(value: &ScalarValue, out: &mut Vec<u8>) {
    match value {
        ScalarValue::Null => out.push(TAG_NULL),
        ScalarValue::Boolean(b) => {
            out.push(TAG_BOOL);
            out.push(*b as u8);
        }
        ScalarValue::Int64(v) => {
            out.push(TAG_INT64);
            out.extend_from_slice(&v.to_le_bytes());
        }
        ScalarValue::Float64(v) => {
            out.push(TAG_FLOAT64);
            out.extend_from_slice(&v.to_le_bytes());
        }
        ScalarValue::Utf8(s) => {
            out.push(TAG_UTF8);
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        ScalarValue::Binary(b) => {
            out.push(TAG_BINARY);
            out.extend_from_slice(&(b.len() as u32).to_le_bytes());
            out.extend_from_slice(b);
        }
    }
}

fn decode_scalar(buf: &[u8], pos: &mut usize) -> Result<ScalarValue<'static>> {
    let tag = *buf
        .get(*pos)
        .ok_or_else(|| AggExecError::with_kind(ErrorKind::Internal, "truncated spill record"))?;
    *pos += 1;
    let value = match tag {
        TAG_NULL => ScalarValue::Null,
        TAG_BOOL => {
            let b = buf[*pos] != 0;
            *pos += 1;
            ScalarValue::Boolean(b)
        }
        TAG_INT64 => {
            let v = i64::from_le_bytes(buf[*pos..*pos + 8].try_into().unwrap());
            *pos += 8;
            ScalarValue::Int64(v)
        }
        TAG_FLOAT64 => {
            let v = f64::from_le_bytes(buf[*pos..*pos + 8].try_into().unwrap());
            *pos += 8;
            ScalarValue::Float64(v)
        }
        TAG_UTF8 => {
            let len = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap()) as usize;
            *pos += 4;
            let s = std::str::from_utf8(&buf[*pos..*pos + len])
                .map_err(|e| AggExecError::with_kind(ErrorKind::Internal, e.to_string()))?
                .to_owned();
            *pos += len;
            ScalarValue::Utf8(Cow::Owned(s))
        }
        TAG_BINARY => {
            let len = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap()) as usize;
            *pos += 4;
            let b = buf[*pos..*pos + len].to_vec();
            *pos += len;
            ScalarValue::Binary(Cow::Owned(b))
        }
        other => {
            return Err(AggExecError::with_kind(
                ErrorKind::Internal,
                format!("unknown spill scalar tag {other}"),
            ))
        }
    };
    Ok(value)
}

pub fn encode_row(row: &Row) -> Vec<u8> {
    let mut out = Vec::with_capacity(row.len() * 9);
    out.extend_from_slice(&(row.len() as u32).to_le_bytes());
    for value in row.iter() {
        encode_scalar(value, &mut out);
    }
    out
}

pub fn decode_row(buf: &[u8]) -> Result<OwnedRow> {
    let mut pos = 0usize;
    let ncols = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
    pos += 4;
    let mut columns = Vec::with_capacity(ncols);
    for _ in 0..ncols {
        columns.push(decode_scalar(buf, &mut pos)?);
    }
    Ok(OwnedRow::from_iter(columns))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_row() {
        let row = Row::from_iter(vec![
            ScalarValue::Int64(42),
            ScalarValue::Null,
            ScalarValue::Utf8(Cow::Borrowed("hello")),
            ScalarValue::Boolean(true),
        ]);
        let bytes = encode_row(&row);
        let decoded = decode_row(&bytes).unwrap();
        assert_eq!(decoded, row.into_owned());
    }
}
