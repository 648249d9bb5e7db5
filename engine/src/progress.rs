//! Progress reporting.
//!
//! The executor keeps a `ProgressSnapshot` up to date and hands it to a
//! `ProgressCallback` at every step, which decouples the engine from any
//! specific front end. The worker module uses the same trait to forward
//! snapshots over a channel.

use std::path::PathBuf;

use crate::model::{CopyTask, RunReport, RunState, TaskStatus, TransferResult};

/// Point-in-time view of a run, written only by the thread doing the I/O.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub state: RunState,
    pub tasks_total: usize,
    /// Tasks with a recorded result (completed, skipped, or failed)
    pub tasks_finished: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_total: u64,
    /// Bytes written so far across all tasks, updated after every chunk
    pub bytes_copied: u64,
    pub current_task: Option<usize>,
    pub current_file: Option<PathBuf>,
}

impl ProgressSnapshot {
    /// Completed fraction in `0.0..=1.0`, by bytes.
    pub fn fraction(&self) -> f64 {
        if self.bytes_total == 0 {
            if self.state.is_terminal() {
                1.0
            } else {
                0.0
            }
        } else {
            (self.bytes_copied as f64 / self.bytes_total as f64).min(1.0)
        }
    }

    pub(crate) fn record(&mut self, result: &TransferResult) {
        self.tasks_finished += 1;
        match result.status {
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Skipped => self.skipped += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }
}

/// Trait for receiving progress updates from a transfer run.
///
/// All methods are called synchronously on the thread executing the run,
/// so implementations should return quickly.
pub trait ProgressCallback: Send + Sync {
    /// Called once when the run enters `Running`.
    fn on_run_started(&self, snapshot: &ProgressSnapshot);

    /// Called when a task is about to be processed.
    fn on_task_started(&self, snapshot: &ProgressSnapshot, task_index: usize, task: &CopyTask);

    /// Called after every chunk written for the current task.
    ///
    /// `bytes_this_task` is the running total for the current task.
    fn on_task_progress(&self, snapshot: &ProgressSnapshot, task_index: usize, bytes_this_task: u64);

    /// Called when a task's result has been recorded.
    fn on_task_finished(&self, snapshot: &ProgressSnapshot, result: &TransferResult);

    /// Called once the run has reached a terminal state.
    fn on_run_finished(&self, snapshot: &ProgressSnapshot, report: &RunReport);
}
