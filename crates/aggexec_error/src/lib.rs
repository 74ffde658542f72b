//! Error type shared across the aggregation executor crates.

use std::error::Error as StdError;
use std::fmt;

/// Discriminant matching the error policy described for the aggregation
/// executor: most kinds are fatal for the query, a couple unwind via
/// scoped cleanup instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Strict transfn with NULL initcond paired with an incompatible
    /// input/transition type, or a non-strict combine fn over `internal`.
    TypeMismatch,
    /// Caller lacks EXECUTE on a transfn/finalfn/serialfn/deserialfn.
    PermissionDenied,
    /// A new aggregate node appeared after expression initialization.
    NestedAggregate,
    /// Short read/write on a spill tape.
    Io,
    /// Cooperative cancellation tripped.
    Interrupted,
    /// Invariant violation: non-adjacent phase jump, unknown strategy, etc.
    Internal,
    /// Propagated from a user-defined transition/final/serialize/deserialize
    /// function.
    Function,
    /// Anything that doesn't need its own kind for callers to branch on.
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TypeMismatch => "type mismatch",
            Self::PermissionDenied => "permission denied",
            Self::NestedAggregate => "nested aggregate",
            Self::Io => "io error",
            Self::Interrupted => "interrupted",
            Self::Internal => "internal error",
            Self::Function => "function error",
            Self::Other => "error",
        };
        write!(f, "{s}")
    }
}

/// The crate-wide error type.
pub struct AggExecError {
    msg: String,
    kind: ErrorKind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl AggExecError {
    pub fn new(msg: impl Into<String>) -> Self {
        AggExecError {
            msg: msg.into(),
            kind: ErrorKind::Other,
            source: None,
        }
    }

    pub fn with_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        AggExecError {
            msg: msg.into(),
            kind,
            source: None,
        }
    }

    pub fn with_source(
        msg: impl Into<String>,
        source: Box<dyn StdError + Send + Sync + 'static>,
    ) -> Self {
        AggExecError {
            msg: msg.into(),
            kind: ErrorKind::Other,
            source: Some(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn into_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }
}

impl fmt::Display for AggExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.msg, source),
            None => write!(f, "{}", self.msg),
        }
    }
}

impl fmt::Debug for AggExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AggExecError({:?}): {}", self.kind, self.msg)
    }
}

impl StdError for AggExecError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for AggExecError {
    fn from(err: std::io::Error) -> Self {
        AggExecError {
            msg: "io error".to_string(),
            kind: ErrorKind::Io,
            source: Some(Box::new(err)),
        }
    }
}

pub type Result<T, E = AggExecError> = std::result::Result<T, E>;

/// Attach context to a foreign error, converting it into an [`AggExecError`].
pub trait ResultExt<T> {
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| AggExecError::with_source(msg, Box::new(e)))
    }
}

/// Shorthand for returning an "operation not supported" error from the
/// current function.
#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)*) => {
        return Err($crate::AggExecError::new(format!("not implemented: {}", format!($($arg)*))))
    };
}
