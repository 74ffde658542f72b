use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use crate::datatype::DataTypeId;

/// A single scalar value flowing through the aggregation executor.
///
/// Borrowed variants (`Utf8`/`Binary`) let a child iterator hand over a row
/// referencing its own buffers without forcing an allocation; anything that
/// needs to outlive the current row (group keys, transition state) goes
/// through [`ScalarValue::into_owned`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue<'a> {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(Cow<'a, str>),
    Binary(Cow<'a, [u8]>),
}

/// A [`ScalarValue`] with no borrowed data.
pub type OwnedScalarValue = ScalarValue<'static>;

impl<'a> ScalarValue<'a> {
    pub fn datatype_id(&self) -> DataTypeId {
        match self {
            Self::Null => DataTypeId::Null,
            Self::Boolean(_) => DataTypeId::Boolean,
            Self::Int64(_) => DataTypeId::Int64,
            Self::Float64(_) => DataTypeId::Float64,
            Self::Utf8(_) => DataTypeId::Utf8,
            Self::Binary(_) => DataTypeId::Binary,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn into_owned(self) -> OwnedScalarValue {
        match self {
            Self::Null => ScalarValue::Null,
            Self::Boolean(v) => ScalarValue::Boolean(v),
            Self::Int64(v) => ScalarValue::Int64(v),
            Self::Float64(v) => ScalarValue::Float64(v),
            Self::Utf8(v) => ScalarValue::Utf8(Cow::Owned(v.into_owned())),
            Self::Binary(v) => ScalarValue::Binary(Cow::Owned(v.into_owned())),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float64(v) => Some(*v),
            Self::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::Binary(v) => write!(f, "{v:?}"),
        }
    }
}

/// Ordering used for ORDER BY / DISTINCT sort buffers. NULLs sort last,
/// matching standard SQL ordered-set comparisons.
impl PartialOrd for ScalarValue<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Null, _) => Some(Ordering::Greater),
            (_, Self::Null) => Some(Ordering::Less),
            (Self::Boolean(a), Self::Boolean(b)) => a.partial_cmp(b),
            (Self::Int64(a), Self::Int64(b)) => a.partial_cmp(b),
            (Self::Float64(a), Self::Float64(b)) => a.partial_cmp(b),
            (Self::Utf8(a), Self::Utf8(b)) => a.partial_cmp(b),
            (Self::Binary(a), Self::Binary(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}
