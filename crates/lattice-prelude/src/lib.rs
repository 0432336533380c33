//! Lattice Prelude
//!
//! This crate re-exports the most frequently used public items from the Lattice
//! ecosystem (currently `lattice-core` and `lattice-types`). Down-stream applications
//! can depend on `lattice-prelude` to avoid long import lists and to stay insulated
//! from internal module reshuffles.

#![deny(warnings)]
#![deny(missing_docs)]

// Value types ----------------------------------------------------------------------------------

pub use lattice_types::{FieldKind, PivotValue};

// Store construction ---------------------------------------------------------------------------

pub use lattice_core::{FieldExtractors, ItemId, Store, build_store};

// Queries --------------------------------------------------------------------------------------

pub use lattice_core::{
    FacetCount, FilterResult, FilterSpec, GroupSpec, GroupingResult, NumericRange, SortDirection,
    SortSpec,
};

// Execution boundary ---------------------------------------------------------------------------

pub use lattice_core::{
    BoundaryConfig, ExecutionMode, PivotBoundary, PivotError, PivotResult, TracingConfig,
    init_tracing,
};
