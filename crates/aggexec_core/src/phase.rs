//! C5 — PhaseController: the phase state machine driving mixed hash+sort
//! execution (spec.md §3, §4.6).
//!
//! Phase 0 holds every hashed grouping set; phases 1..N are sorted phases,
//! walked in order. Transitions are forward-only (`k -> k+1`) with one
//! explicit exception: a sorted phase can reset back to phase 0 to refill
//! a spilled hash batch before continuing. Any other jump is a planner bug
//! and raised as `ErrorKind::Internal` rather than silently clamped.

use aggexec_error::{AggExecError, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStage {
    /// Consuming fresh input for the current phase.
    Filling,
    /// Re-consuming a spilled hash batch (phase 0 only, reached via
    /// [`PhaseController::reset_to_hash_refill`]).
    Refilling,
    /// All phases exhausted; the driver should stop pulling from its
    /// child and only drain remaining output.
    Done,
}

#[derive(Debug)]
pub struct PhaseController {
    num_phases: usize,
    current: usize,
    stage: PhaseStage,
}

impl PhaseController {
    pub fn new(num_phases: usize) -> Self {
        assert!(num_phases > 0, "a plan must have at least one phase");
        PhaseController {
            num_phases,
            current: 0,
            stage: PhaseStage::Filling,
        }
    }

    pub fn current_phase(&self) -> usize {
        self.current
    }

    pub fn stage(&self) -> PhaseStage {
        self.stage
    }

    pub fn is_done(&self) -> bool {
        self.stage == PhaseStage::Done
    }

    /// Normal forward progression: phase `k` -> `k + 1`, or `Done` once the
    /// last phase finishes.
    pub fn advance(&mut self) -> Result<()> {
        if self.current + 1 >= self.num_phases {
            self.stage = PhaseStage::Done;
            return Ok(());
        }
        self.current += 1;
        self.stage = PhaseStage::Filling;
        Ok(())
    }

    /// Resets back to phase 0 to refill a spilled hash batch. Only legal
    /// while sitting in phase 1, immediately after phase 0 (the hash
    /// phase) finished filling and before any sorted-phase output has been
    /// produced (spec.md §4.6's mixed-mode loop).
    pub fn reset_to_hash_refill(&mut self) -> Result<()> {
        if self.current != 1 {
            return Err(AggExecError::with_kind(
                ErrorKind::Internal,
                format!("non-adjacent phase jump: phase {} -> 0", self.current),
            ));
        }
        self.current = 0;
        self.stage = PhaseStage::Refilling;
        Ok(())
    }

    /// Returns to phase 1 once a hash refill batch has been fully drained.
    pub fn resume_after_refill(&mut self) -> Result<()> {
        if self.current != 0 || self.stage != PhaseStage::Refilling {
            return Err(AggExecError::with_kind(
                ErrorKind::Internal,
                "resume_after_refill called outside a refill",
            ));
        }
        self.current = 1;
        self.stage = PhaseStage::Filling;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_through_all_phases_then_done() {
        let mut pc = PhaseController::new(3);
        assert_eq!(pc.current_phase(), 0);
        pc.advance().unwrap();
        assert_eq!(pc.current_phase(), 1);
        pc.advance().unwrap();
        assert_eq!(pc.current_phase(), 2);
        pc.advance().unwrap();
        assert!(pc.is_done());
    }

    #[test]
    fn refill_reset_only_legal_from_phase_one() {
        let mut pc = PhaseController::new(2);
        assert!(pc.reset_to_hash_refill().is_err());
        pc.advance().unwrap();
        assert_eq!(pc.current_phase(), 1);
        pc.reset_to_hash_refill().unwrap();
        assert_eq!(pc.current_phase(), 0);
        assert_eq!(pc.stage(), PhaseStage::Refilling);
        pc.resume_after_refill().unwrap();
        assert_eq!(pc.current_phase(), 1);
    }
}
