//! External interfaces the embedder implements (spec.md §6).
//!
//! This crate owns grouping, transition-state management, spilling, and
//! phase sequencing; it does not own row production, expression
//! evaluation, or catalog/function lookup, all of which belong to the
//! surrounding query engine.

use aggexec_error::Result;
use aggexec_types::datatype::DataTypeId;
use aggexec_types::row::OwnedRow;

/// Supplies input rows to one [`crate::driver::AggregationDriver`].
///
/// Mixed hash+sort plans need a second pass over the same input (the hash
/// phase fills its tables from a first pass; the sorted phases then need
/// the input back at the start), so a child able to produce more than one
/// phase's input must support [`ChildIterator::rescan`].
pub trait ChildIterator: std::fmt::Debug {
    /// Returns the next input row, or `None` at end of input.
    fn next_row(&mut self) -> Result<Option<OwnedRow>>;

    /// Restarts iteration from the beginning. Only called by plans with
    /// both hashed and sorted phases; a child that can't support it should
    /// return an `Internal` error (the planner is expected not to produce
    /// such a plan over a non-rescannable child).
    fn rescan(&mut self) -> Result<()>;
}

/// Looks up a builtin (or embedder-registered) aggregate function handle
/// by name and argument types.
pub trait FunctionRegistry {
    fn resolve(&self, name: &str, arg_types: &[DataTypeId]) -> Option<&'static crate::functions::BuiltinAggregate>;
}

/// Default registry: builtins only.
#[derive(Debug, Default)]
pub struct BuiltinFunctionRegistry;

impl FunctionRegistry for BuiltinFunctionRegistry {
    fn resolve(&self, name: &str, arg_types: &[DataTypeId]) -> Option<&'static crate::functions::BuiltinAggregate> {
        crate::functions::lookup(name, arg_types)
    }
}
