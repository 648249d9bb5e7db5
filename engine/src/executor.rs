//! Transfer execution.
//!
//! The executor walks a `TransferPlan` in order on the calling thread:
//! - Planned directories are created first
//! - Each task is copied in chunks, optionally verified, and given a result
//! - Per-task errors are recorded and the batch moves on
//! - Cancellation is polled between tasks and between chunks
//!
//! Lifecycle: `Idle -> Running -> {Completed | Cancelled | Failed}`.

use std::fs::File;
use std::io;

use log::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::checksums;
use crate::error::{EngineError, TransferError};
use crate::fs_ops::{self, CopyError};
use crate::model::{
    ConflictPolicy, CopyTask, RunReport, RunState, RunSummary, TaskStatus, TransferOptions,
    TransferPlan, TransferResult,
};
use crate::progress::{ProgressCallback, ProgressSnapshot};

/// Run `plan` to completion (or cancellation) on the current thread.
///
/// # Errors
/// Returns EngineError only if the run cannot start. Task-level errors are
/// recorded in the returned report.
pub fn run_transfer(
    plan: &TransferPlan,
    options: TransferOptions,
    cancel: &CancelToken,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<RunReport, EngineError> {
    Executor::new(plan, options, cancel.clone()).run(progress_callback)
}

/// Single-use executor for one plan.
pub struct Executor<'a> {
    plan: &'a TransferPlan,
    options: TransferOptions,
    cancel: CancelToken,
    state: RunState,
    snapshot: ProgressSnapshot,
    results: Vec<TransferResult>,
}

impl<'a> Executor<'a> {
    pub fn new(plan: &'a TransferPlan, options: TransferOptions, cancel: CancelToken) -> Self {
        let snapshot = ProgressSnapshot {
            tasks_total: plan.tasks().len(),
            bytes_total: plan.total_bytes(),
            ..Default::default()
        };
        Executor {
            plan,
            options,
            cancel,
            state: RunState::Idle,
            snapshot,
            results: Vec::with_capacity(plan.tasks().len()),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    /// Execute every task in plan order.
    ///
    /// # Errors
    /// `EngineError::InvalidState` if this executor already ran.
    pub fn run(
        &mut self,
        progress_callback: Option<&dyn ProgressCallback>,
    ) -> Result<RunReport, EngineError> {
        if self.state != RunState::Idle {
            return Err(EngineError::InvalidState { state: self.state });
        }

        self.set_state(RunState::Running);
        info!(
            "Transfer {} started: {} tasks, {} bytes to {}",
            self.plan.id(),
            self.snapshot.tasks_total,
            self.snapshot.bytes_total,
            self.plan.destination_root().display()
        );
        if let Some(callback) = progress_callback {
            callback.on_run_started(&self.snapshot);
        }

        self.create_directories();

        let plan = self.plan;
        let mut cancelled = false;
        for (task_index, task) in plan.tasks().iter().enumerate() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            self.snapshot.current_task = Some(task_index);
            self.snapshot.current_file = Some(task.source.clone());
            if let Some(callback) = progress_callback {
                callback.on_task_started(&self.snapshot, task_index, task);
            }

            let result = self.execute_task(task_index, task, progress_callback);
            cancelled = result.error.as_ref().is_some_and(TransferError::is_cancelled);
            self.record(result, progress_callback);

            if cancelled {
                break;
            }
        }

        if cancelled {
            // Unstarted tasks are accounted for without touching earlier results
            for task_index in self.results.len()..plan.tasks().len() {
                self.record(TransferResult::skipped(task_index), progress_callback);
            }
        }

        self.snapshot.current_task = None;
        self.snapshot.current_file = None;

        let summary = RunSummary::from_results(&self.results);
        let final_state = if cancelled {
            RunState::Cancelled
        } else if summary.failed > 0 {
            RunState::Failed
        } else {
            RunState::Completed
        };
        self.set_state(final_state);

        info!(
            "Transfer {} {}: {} completed, {} skipped, {} failed, {} bytes copied",
            plan.id(),
            final_state,
            summary.completed,
            summary.skipped,
            summary.failed,
            summary.bytes_copied
        );

        let report = RunReport {
            state: final_state,
            results: self.results.clone(),
            summary,
        };
        if let Some(callback) = progress_callback {
            callback.on_run_finished(&self.snapshot, &report);
        }
        Ok(report)
    }

    fn set_state(&mut self, state: RunState) {
        self.state = state;
        self.snapshot.state = state;
    }

    fn record(&mut self, result: TransferResult, progress_callback: Option<&dyn ProgressCallback>) {
        match (&result.status, &result.error) {
            (TaskStatus::Failed, Some(err)) => warn!("Task {} failed: {}", result.task_index, err),
            (status, _) => debug!("Task {} {}", result.task_index, status),
        }
        self.snapshot.record(&result);
        if let Some(callback) = progress_callback {
            callback.on_task_finished(&self.snapshot, &result);
        }
        self.results.push(result);
    }

    /// Reproduce the planned folder structure, including empty folders.
    fn create_directories(&self) {
        for dir in self.plan.directories() {
            if let Err(e) = fs_ops::ensure_dir_exists(dir) {
                warn!("Could not create directory {}: {}", dir.display(), e);
            }
        }
    }

    fn execute_task(
        &mut self,
        task_index: usize,
        task: &CopyTask,
        progress_callback: Option<&dyn ProgressCallback>,
    ) -> TransferResult {
        debug!(
            "Task {}: {} -> {}",
            task_index,
            task.source.display(),
            task.destination.display()
        );

        let mut src_file = match File::open(&task.source) {
            Ok(f) => f,
            Err(e) => {
                let err = TransferError::source_unreadable(&task.source, e);
                return TransferResult::failed(task_index, 0, None, err);
            }
        };
        let src_metadata = match src_file.metadata() {
            Ok(m) => m,
            Err(e) => {
                let err = TransferError::source_unreadable(&task.source, e);
                return TransferResult::failed(task_index, 0, None, err);
            }
        };

        if let Err(e) = fs_ops::ensure_parent_dir_exists(&task.destination) {
            let parent = task.destination.parent().unwrap_or(&task.destination);
            let err = TransferError::destination_unwritable(parent, e);
            return TransferResult::failed(task_index, 0, None, err);
        }

        // Truncating the destination would destroy the source
        if self.options.conflict == ConflictPolicy::Overwrite {
            let clash = match fs_ops::is_same_file(&task.source, &task.destination) {
                Ok(false) => None,
                Ok(true) => Some(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "destination is the source file",
                )),
                Err(e) => Some(e),
            };
            if let Some(e) = clash {
                let err = TransferError::destination_unwritable(&task.destination, e);
                return TransferResult::failed(task_index, 0, None, err);
            }
        }

        let (mut dst_file, destination) =
            match fs_ops::open_destination(&task.destination, self.options.conflict) {
                Ok(Some(opened)) => opened,
                Ok(None) => {
                    debug!("Skipping existing {}", task.destination.display());
                    return TransferResult::skipped(task_index);
                }
                Err(e) => {
                    let err = TransferError::destination_unwritable(&task.destination, e);
                    return TransferResult::failed(task_index, 0, None, err);
                }
            };

        let mut bytes_this_task = 0u64;
        let copy_result = {
            let snapshot = &mut self.snapshot;
            fs_ops::copy_in_chunks(&mut src_file, &mut dst_file, &self.cancel, |n| {
                bytes_this_task += n;
                snapshot.bytes_copied += n;
                if let Some(callback) = progress_callback {
                    callback.on_task_progress(snapshot, task_index, bytes_this_task);
                }
            })
        };

        let failure = match copy_result {
            Ok(_) => dst_file
                .sync_all()
                .err()
                .map(|e| TransferError::destination_unwritable(&destination, e)),
            Err(CopyError::Read(e)) => Some(TransferError::source_unreadable(&task.source, e)),
            Err(CopyError::Write(e)) => {
                Some(TransferError::destination_unwritable(&destination, e))
            }
            Err(CopyError::Cancelled) => {
                info!(
                    "Cancelled during {}; partial file left at {}",
                    task.source.display(),
                    destination.display()
                );
                Some(TransferError::Cancelled)
            }
        };
        drop(dst_file);

        if let Some(err) = failure {
            return TransferResult::failed(task_index, bytes_this_task, Some(destination), err);
        }

        if let Err(e) = fs_ops::preserve_mtime(&src_metadata, &destination) {
            warn!("Could not set modification time on {}: {}", destination.display(), e);
        }

        if self.options.verify {
            match checksums::verify_copy(&task.source, &destination, self.options.checksum_algorithm)
            {
                Ok(verification) => debug!("Verified {}", verification.destination),
                Err(err) => {
                    return TransferResult::failed(
                        task_index,
                        bytes_this_task,
                        Some(destination),
                        err,
                    )
                }
            }
        }

        TransferResult::completed(task_index, bytes_this_task, destination)
    }
}
