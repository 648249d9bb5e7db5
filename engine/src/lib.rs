//! # Ferry Engine - Verified File Transfer Library
//!
//! A headless engine for copying selected files and folders to a destination
//! such as a removable drive. Front ends (the `ferry` CLI, or a GUI) only
//! start, observe and cancel transfers; all I/O happens here.
//!
//! ## Overview
//!
//! - Planning turns a selection into an immutable, ordered list of copy tasks
//! - Execution copies in 64 KB chunks on one background thread
//! - Optional checksum verification after each copy
//! - Conflicts are renamed (`name (1).ext`), overwritten, or skipped
//! - One failing file never aborts the batch; cancellation stops it cleanly
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{plan_transfer, spawn_transfer, SelectionEntry, TransferOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = TransferOptions::default();
//! let selection = vec![
//!     SelectionEntry::folder("/home/me/docs"),
//!     SelectionEntry::file("/home/me/notes.txt"),
//! ];
//!
//! let plan = plan_transfer(&selection, "/mnt/usb", &options);
//! println!("Will copy {} files", plan.tasks().len());
//!
//! let handle = spawn_transfer(plan, options)?;
//! let report = handle.join()?;
//! println!(
//!     "{} completed, {} skipped, {} failed",
//!     report.summary.completed, report.summary.skipped, report.summary.failed
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Selection, plan, options and result types
//! - **planner**: Selection expansion into copy tasks
//! - **executor**: Sequential task execution and the run state machine
//! - **worker**: Background thread, progress channel and cancel handle
//! - **fs_ops**: Chunked copy, conflict resolution, directory helpers
//! - **checksums**: Checksum computation and post-copy verification
//! - **progress**: Progress snapshot and callback trait
//! - **cancel**: Cooperative cancellation token
//! - **error**: Run-level and per-task error types

pub mod cancel;
pub mod checksums;
pub mod error;
pub mod executor;
pub mod fs_ops;
pub mod model;
pub mod planner;
pub mod progress;
pub mod worker;

// Re-export main types and functions
pub use cancel::CancelToken;
pub use checksums::{compute_file_checksum, verify_copy, ChecksumAlgorithm, ChecksumValue};
pub use error::{EngineError, TransferError};
pub use executor::{run_transfer, Executor};
pub use fs_ops::check_destination_root;
pub use model::{
    ConflictPolicy, CopyTask, EntryKind, PlanIssue, RunReport, RunState, RunSummary,
    SelectionEntry, TaskStatus, TransferOptions, TransferPlan, TransferResult,
};
pub use planner::plan_transfer;
pub use progress::{ProgressCallback, ProgressSnapshot};
pub use worker::{
    spawn_transfer, spawn_transfer_with_cancel, ProgressUpdate, TransferHandle, PROGRESS_BACKLOG,
};
