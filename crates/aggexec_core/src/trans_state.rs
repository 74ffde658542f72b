//! C1 — per-transition-function, per-group state.

use std::any::Any;
use std::fmt;

use aggexec_types::scalar::OwnedScalarValue;

use crate::arena::{ArenaOffset, GroupArena};

/// Opaque transition datum.
///
/// `Scalar` covers by-value transition types (running sums, counts, a
/// single min/max candidate). `Internal` covers by-reference `internal`
/// transition types (e.g. AVG's running `(sum, count)` pair) that are
/// naturally modeled as a boxed Rust value rather than a `ScalarValue` —
/// this plays the role of the source's "expanded object" optimization:
/// the box already lives in the group arena's `Vec`, so adopting a new
/// value in place never requires a copy, only a `replace`.
#[derive(Clone)]
pub enum TransValue {
    Scalar(OwnedScalarValue),
    Internal(Box<dyn InternalState>),
}

/// A boxed `internal`-typed transition value.
pub trait InternalState: fmt::Debug + Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_box(&self) -> Box<dyn InternalState>;
    /// Rough byte estimate for memory accounting.
    fn approx_size(&self) -> usize;
}

impl Clone for Box<dyn InternalState> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl TransValue {
    pub fn approx_size(&self) -> usize {
        match self {
            TransValue::Scalar(s) => std::mem::size_of_val(s)
                + match s {
                    OwnedScalarValue::Utf8(v) => v.len(),
                    OwnedScalarValue::Binary(v) => v.len(),
                    _ => 0,
                },
            TransValue::Internal(b) => b.approx_size(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TransValue::Scalar(OwnedScalarValue::Null))
    }
}

impl fmt::Debug for TransValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransValue::Scalar(s) => write!(f, "Scalar({s:?})"),
            TransValue::Internal(b) => write!(f, "Internal({b:?})"),
        }
    }
}

/// One transition function's state for one active group.
///
/// Invariants (spec.md §3): if the transfn is strict and `initcond` is
/// NULL, the first non-NULL input is copied verbatim into the arena and
/// `no_trans_value` is cleared; thereafter a NULL input is a no-op; a
/// NULL `trans_value` once set propagates forever.
#[derive(Debug, Clone, Copy)]
pub struct PerTransState {
    /// Offset of the live value inside the owning [`GroupArena`].
    pub trans_value: ArenaOffset,
    pub trans_is_null: bool,
    pub no_trans_value: bool,
}

impl PerTransState {
    /// Initialize according to §4.7: copy `initcond` (or NULL) into the
    /// arena, set `is_null`/`no_trans_value` from whether it was NULL.
    pub fn init(arena: &mut GroupArena, initcond: Option<OwnedScalarValue>) -> Self {
        let is_null = initcond.is_none();
        let value = initcond.unwrap_or(OwnedScalarValue::Null);
        let offset = arena.alloc(TransValue::Scalar(value));
        PerTransState {
            trans_value: offset,
            trans_is_null: is_null,
            no_trans_value: is_null,
        }
    }

    pub fn value<'a>(&self, arena: &'a GroupArena) -> &'a TransValue {
        arena.get(self.trans_value)
    }
}
