#![deny(warnings)]
#![allow(missing_docs)]
//! Core functionality for the Lattice pivot data engine.
//!
//! This crate turns a collection of records into a columnar store, builds per-field
//! indexes over it, and answers filter, group-by, sort and facet queries. Queries can run
//! on a background worker behind an asynchronous boundary, falling back to in-process
//! execution when the worker is unavailable.

use tracing::{debug, instrument};

/// Execution boundary: async facade with worker dispatch and synchronous fallback
pub mod boundary;
/// Boundary configuration and environment overrides
pub mod config;
/// Engine-wide defaults
pub mod constants;
/// Error types for boundary operations
pub mod error;
/// Per-value counts over the visible set
pub mod facets;
/// Categorical and numeric filters over the indexes
pub mod filter;
/// Categorical and bucketed numeric grouping
pub mod grouping;
/// Categorical and numeric field indexes
pub mod index;
/// Messages exchanged with the worker
pub mod protocol;
/// Store/index pair owned by each executor
pub mod session;
/// Linear-time operations over sorted id lists
pub mod set_ops;
/// Stable sort of ids by a field's values
pub mod sort;
/// Columnar store construction
pub mod store;
/// Structured logging setup
pub mod tracing_setup;
/// Background worker thread
pub mod worker;

pub use boundary::PivotBoundary;
pub use config::{BoundaryConfig, ExecutionMode};
pub use error::{ErrorSeverity, PivotError, PivotResult};
pub use facets::{FacetCount, facet_counts};
pub use filter::{FilterResult, FilterSpec, NumericRange, apply_filters};
pub use grouping::{GroupResult, GroupSpec, GroupingResult, compute_grouping};
pub use index::{CategoricalIndex, IndexStats, NumericIndex, PivotIndexes, build_indexes};
pub use protocol::{Envelope, OperationKind, RequestId, StoreMessage, WorkerRequest, WorkerResponse};
pub use session::EngineSession;
pub use sort::{SortDirection, SortSpec, collate, sort_ids, sort_ids_by};
pub use store::{Extractor, Field, FieldExtractors, ItemId, Store, build_store};
pub use tracing_setup::{LogFormat, TracingConfig, init_tracing};
pub use worker::PivotWorker;

pub use lattice_types::{FieldKind, PivotValue, format_fixed, format_number};

/// Initialize the core engine components
#[instrument]
pub fn init() -> anyhow::Result<()> {
    debug!("Initializing Lattice pivot engine");
    Ok(())
}
