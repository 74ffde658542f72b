//! Minimal row/scalar/hash types shared by the aggregation executor.
//!
//! This crate intentionally covers only the surface the executor needs —
//! a tuple model (`Row`/`OwnedRow`) built from a small `ScalarValue`, plus
//! the hashing and data-type plumbing the grouping and spill paths depend
//! on. Expression evaluation, casting, and the rest of a full columnar
//! type system are out of scope; the driver treats those as already
//! having happened upstream.

pub mod datatype;
pub mod hash;
pub mod row;
pub mod scalar;

pub use datatype::DataTypeId;
pub use row::{OwnedRow, Row};
pub use scalar::ScalarValue;
