//! Error types for the transfer engine.
//!
//! Two levels exist:
//! - `EngineError`: run-level problems that prevent a transfer from starting
//!   (bad destination, not enough space, executor misuse).
//! - `TransferError`: per-task problems. These are recorded against the task
//!   in its `TransferResult` and never abort the rest of the batch, with the
//!   single exception of `Cancelled`.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::model::RunState;

/// Errors that stop a run from being planned or executed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Destination root does not exist
    #[error("Destination not found: {}", path.display())]
    DestinationNotFound { path: PathBuf },

    /// Destination root exists but is a file
    #[error("Destination is not a directory: {}", path.display())]
    DestinationNotDirectory { path: PathBuf },

    /// Destination root cannot be inspected
    #[error("Destination access denied: {}", path.display())]
    DestinationAccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Free space on the destination volume is below the plan's total
    #[error(
        "Insufficient space on {}: {required} bytes required, {available} available",
        path.display()
    )]
    InsufficientSpace {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    /// The executor was asked to run from a state other than Idle
    #[error("Transfer cannot start from state {state}")]
    InvalidState { state: RunState },

    /// The background worker could not be spawned or panicked
    #[error("Transfer worker failed: {message}")]
    Worker { message: String },
}

/// Per-task failure categories.
#[derive(Debug, Clone, Error)]
pub enum TransferError {
    /// Source missing, unreadable, or failed mid-read
    #[error("Cannot read source {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// Permission denied, disk full, or parent directory could not be created
    #[error("Cannot write destination {}: {source}", path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// Verification found source and destination contents differ
    #[error("Checksum mismatch: {} differs from its source", path.display())]
    ChecksumMismatch { path: PathBuf },

    /// The user stopped the run while this task was in progress
    #[error("Cancelled by user")]
    Cancelled,
}

impl TransferError {
    pub(crate) fn source_unreadable(path: impl Into<PathBuf>, err: io::Error) -> Self {
        TransferError::SourceUnreadable {
            path: path.into(),
            source: Arc::new(err),
        }
    }

    pub(crate) fn destination_unwritable(path: impl Into<PathBuf>, err: io::Error) -> Self {
        TransferError::DestinationUnwritable {
            path: path.into(),
            source: Arc::new(err),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }
}
