/// Core system constants used throughout the Lattice pivot engine
///
/// This module centralizes the magic numbers and default settings shared by the
/// engine functions and the execution boundary.
/// Grouping defaults
pub mod grouping {
    /// Number of equal-width buckets used when a numeric `GroupSpec` names none
    pub const DEFAULT_NUMERIC_BUCKETS: usize = 10;

    /// Decimal places used in numeric bucket labels
    pub const BUCKET_LABEL_PRECISION: usize = 1;
}

/// Execution boundary defaults
pub mod boundary {
    /// Name given to the background worker thread
    pub const WORKER_THREAD_NAME: &str = "lattice-pivot-worker";

    /// Name given to the thread that routes worker responses to callers
    pub const RESPONSE_PUMP_THREAD_NAME: &str = "lattice-pivot-responses";

    /// Default wait for a worker response before falling back to in-process execution
    pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 10_000;
}

/// Memory estimation constants
pub mod memory {
    /// Rough per-entry overhead of a hash map bucket
    pub const HASH_ENTRY_OVERHEAD_BYTES: usize = 48;
}
