//! C4 — SpillManager and supporting partition/tape/record machinery
//! (spec.md §4.4).

pub mod manager;
pub mod partition;
pub mod record;
pub mod tape;

pub use manager::{SpillBatch, SpillManager};
pub use tape::{FileTapePool, TapePool, TapeSetId};
