//! Crate-specific error types for mmap-ipc.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for mmap-ipc operations.
pub type Result<T> = std::result::Result<T, RegionError>;

/// Error type covering region acquisition.
///
/// Only opening a region can fail loudly; every operation on an already
/// opened (or closed) region is total and degrades to defaults instead.
#[derive(Debug, Error)]
pub enum RegionError {
    /// The backing file could not be opened, sized, or mapped.
    #[error("cannot map '{path}': {source}")]
    Open {
        /// Path of the backing file.
        path: PathBuf,
        /// OS error reported at the point of failure.
        #[source]
        source: io::Error,
    },

    /// The requested mapping is larger than [`MAX_REGION_BYTES`](crate::MAX_REGION_BYTES).
    ///
    /// Raised before any OS resource is touched; a rejected open leaves
    /// no file behind.
    #[error("mapping of {requested} bytes exceeds the {limit} byte limit")]
    SizeLimit {
        /// Bytes the mapping would cover, element offset included.
        requested: u64,
        /// Configured upper bound.
        limit: u64,
    },

    /// A mapping with zero elements was requested.
    #[error("element count must be non-zero")]
    EmptyRegion,
}
