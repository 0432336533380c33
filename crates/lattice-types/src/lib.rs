//! Lattice Types
//!
//! This crate defines the value types shared by the Lattice pivot engine and the code that
//! feeds it records. Extractors return a `PivotValue`; the engine infers each column's
//! `FieldKind` from the first value it sees.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_docs)]

mod types;
pub use types::{FieldKind, PivotValue, format_fixed, format_number};
