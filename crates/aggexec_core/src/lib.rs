//! A multi-strategy grouped aggregation executor.
//!
//! Given a stream of input rows and a set of aggregate call descriptors,
//! [`driver::AggregationDriver`] produces one output row per distinct
//! grouping key, routing through one of three strategies — `plain` (no
//! grouping), `sorted` (presorted input), `hashed` (hash table, spilling
//! partitioned overflow to disk when memory runs out) — and composing them
//! for grouping sets (multiple `GROUP BY` specifications in one pass).
//!
//! Planning, expression compilation, catalog/ACL checks, and row I/O are
//! external collaborators: see [`iface`] for the traits an embedder
//! implements to supply typed function handles and tuple streams.

pub mod agg_context;
pub mod arena;
pub mod config;
pub mod descriptor;
pub mod driver;
pub mod functions;
pub mod group_table;
pub mod iface;
pub mod interrupt;
pub mod phase;
pub mod plan;
pub mod share;
pub mod sorter;
pub mod spill;
pub mod trans_state;
pub mod transition;

pub use agg_context::AggContext;
pub use config::AggregateConfig;
pub use descriptor::{PerAggDescriptor, SplitMode};
pub use driver::{AggregationDriver, GroupOutput};
pub use iface::{BuiltinFunctionRegistry, ChildIterator, FunctionRegistry};
pub use interrupt::InterruptCheck;
pub use plan::{AggPlan, GroupingSet, Phase, Strategy};
pub use share::{AggCallSignature, ShareDetector, SharePlan};
