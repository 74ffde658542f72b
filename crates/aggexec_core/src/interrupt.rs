//! Cooperative cancellation (spec.md §5: "the driver polls an
//! `InterruptCheck` at row-fetch and spill-read boundaries; no locks are
//! used internally").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use aggexec_error::{AggExecError, ErrorKind, Result};

/// Shared cancellation flag. Cloning shares the same underlying flag, so a
/// caller on another thread can call [`InterruptCheck::trigger`] while the
/// driver is polling [`InterruptCheck::check`] between rows.
#[derive(Debug, Clone, Default)]
pub struct InterruptCheck {
    flag: Arc<AtomicBool>,
}

impl InterruptCheck {
    pub fn new() -> Self {
        InterruptCheck::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Returns `Err(Interrupted)` if cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_triggered() {
            return Err(AggExecError::with_kind(ErrorKind::Interrupted, "aggregation cancelled"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_is_observed_by_clones() {
        let a = InterruptCheck::new();
        let b = a.clone();
        assert!(a.check().is_ok());
        b.trigger();
        assert!(a.check().is_err());
    }
}
