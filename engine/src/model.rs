//! Core data model for transfers.
//!
//! This module defines the structures passed between the planner, the
//! executor and whatever front end drives them:
//! - SelectionEntry: a file or folder picked by the user
//! - CopyTask / TransferPlan: the immutable output of planning
//! - TransferOptions, ConflictPolicy: behaviour switches for a run
//! - TransferResult, RunReport, RunState: what a run produced

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::checksums::ChecksumAlgorithm;
use crate::error::TransferError;

/// Whether a selected path is copied as a single file or expanded as a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

/// A source path selected by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl SelectionEntry {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        SelectionEntry {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn folder(path: impl Into<PathBuf>) -> Self {
        SelectionEntry {
            path: path.into(),
            kind: EntryKind::Folder,
        }
    }

    /// Tag a path by looking at what is on disk.
    ///
    /// Symlinks are followed, so a link to a directory becomes a folder entry.
    pub fn detect(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let metadata = fs::metadata(&path)?;
        let kind = if metadata.is_dir() {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        Ok(SelectionEntry { path, kind })
    }
}

/// A single file copy scheduled by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTask {
    /// Absolute (or caller-relative) source path
    pub source: PathBuf,
    /// Intended destination; the executor may pick a renamed sibling
    pub destination: PathBuf,
    /// Source size in bytes at planning time
    pub size: u64,
}

/// A source path that was dropped from the plan.
#[derive(Debug, Clone)]
pub struct PlanIssue {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for PlanIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// The ordered, immutable list of work for one transfer run.
///
/// Built once by [`crate::planner::plan_transfer`]; the executor only ever
/// borrows it, so the task list cannot change while a run is in progress.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    id: Uuid,
    destination_root: PathBuf,
    tasks: Vec<CopyTask>,
    directories: Vec<PathBuf>,
    issues: Vec<PlanIssue>,
}

impl TransferPlan {
    pub(crate) fn new(
        destination_root: PathBuf,
        tasks: Vec<CopyTask>,
        directories: Vec<PathBuf>,
        issues: Vec<PlanIssue>,
    ) -> Self {
        TransferPlan {
            id: Uuid::new_v4(),
            destination_root,
            tasks,
            directories,
            issues,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }

    pub fn tasks(&self) -> &[CopyTask] {
        &self.tasks
    }

    /// Destination directories to create before copying (structure only).
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Sources that could not be read during planning.
    pub fn issues(&self) -> &[PlanIssue] {
        &self.issues
    }

    pub fn total_bytes(&self) -> u64 {
        self.tasks.iter().map(|t| t.size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.directories.is_empty()
    }
}

/// Policy for handling a destination file that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Keep the existing file and write to `name (1).ext`, `name (2).ext`, ...
    #[default]
    Rename,
    /// Truncate and replace the existing file
    Overwrite,
    /// Leave the existing file alone and mark the task skipped
    Skip,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Rename => write!(f, "Rename"),
            ConflictPolicy::Overwrite => write!(f, "Overwrite"),
            ConflictPolicy::Skip => write!(f, "Skip"),
        }
    }
}

/// Switches controlling a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Compare source and destination checksums after each copy
    pub verify: bool,
    /// Keep folder names and relative paths; false gives a flat copy
    pub preserve_structure: bool,
    pub conflict: ConflictPolicy,
    pub checksum_algorithm: ChecksumAlgorithm,
}

impl TransferOptions {
    /// Map the plain overwrite switch: `true` replaces, `false` renames.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.conflict = if overwrite {
            ConflictPolicy::Overwrite
        } else {
            ConflictPolicy::Rename
        };
        self
    }

    pub fn overwrite(&self) -> bool {
        self.conflict == ConflictPolicy::Overwrite
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        TransferOptions {
            verify: true,
            preserve_structure: true,
            conflict: ConflictPolicy::Rename,
            checksum_algorithm: ChecksumAlgorithm::Sha256,
        }
    }
}

/// Final status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Completed,
    Skipped,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Completed => write!(f, "Completed"),
            TaskStatus::Skipped => write!(f, "Skipped"),
            TaskStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Outcome of one copy task, recorded once and never changed afterwards.
#[derive(Debug, Clone)]
pub struct TransferResult {
    /// Position of the task in the plan
    pub task_index: usize,
    pub status: TaskStatus,
    pub bytes_copied: u64,
    /// Set when verification ran and the checksums differed
    pub checksum_mismatch: bool,
    /// Where the data actually went (differs from the task after a rename)
    pub final_destination: Option<PathBuf>,
    pub error: Option<TransferError>,
}

impl TransferResult {
    pub(crate) fn completed(task_index: usize, bytes: u64, destination: PathBuf) -> Self {
        TransferResult {
            task_index,
            status: TaskStatus::Completed,
            bytes_copied: bytes,
            checksum_mismatch: false,
            final_destination: Some(destination),
            error: None,
        }
    }

    pub(crate) fn skipped(task_index: usize) -> Self {
        TransferResult {
            task_index,
            status: TaskStatus::Skipped,
            bytes_copied: 0,
            checksum_mismatch: false,
            final_destination: None,
            error: None,
        }
    }

    pub(crate) fn failed(
        task_index: usize,
        bytes: u64,
        destination: Option<PathBuf>,
        error: TransferError,
    ) -> Self {
        TransferResult {
            task_index,
            status: TaskStatus::Failed,
            bytes_copied: bytes,
            checksum_mismatch: matches!(error, TransferError::ChecksumMismatch { .. }),
            final_destination: destination,
            error: Some(error),
        }
    }
}

/// Lifecycle of a transfer run.
///
/// `Running` is the only state in which file I/O happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    /// Every task completed or was skipped by policy
    Completed,
    /// Stopped by the user; later tasks never ran
    Cancelled,
    /// All tasks ran but at least one failed
    Failed,
}

impl RunState {
    /// Returns true if this state is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Cancelled | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "Idle"),
            RunState::Running => write!(f, "Running"),
            RunState::Completed => write!(f, "Completed"),
            RunState::Cancelled => write!(f, "Cancelled"),
            RunState::Failed => write!(f, "Failed"),
        }
    }
}

/// Counts shown to the user once a run is over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub checksum_mismatches: usize,
    pub bytes_copied: u64,
}

impl RunSummary {
    pub fn from_results(results: &[TransferResult]) -> Self {
        let mut summary = RunSummary::default();
        for result in results {
            match result.status {
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Skipped => summary.skipped += 1,
                TaskStatus::Failed => summary.failed += 1,
            }
            if result.checksum_mismatch {
                summary.checksum_mismatches += 1;
            }
            summary.bytes_copied += result.bytes_copied;
        }
        summary
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,
    /// One entry per task, in plan order
    pub results: Vec<TransferResult>,
    pub summary: RunSummary,
}
