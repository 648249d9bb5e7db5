//! Background execution of a transfer.
//!
//! `spawn_transfer` moves a plan onto one worker thread and hands back a
//! `TransferHandle`. The front end never touches the files itself: it can
//! cancel, drain `ProgressUpdate`s from a channel, or poll the latest
//! `ProgressSnapshot`, and finally join for the `RunReport`.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::debug;

use crate::cancel::CancelToken;
use crate::error::EngineError;
use crate::executor::run_transfer;
use crate::model::{CopyTask, RunReport, TransferOptions, TransferPlan, TransferResult};
use crate::progress::{ProgressCallback, ProgressSnapshot};

/// Queued updates above which per-chunk `Progress` events are dropped.
///
/// Lifecycle events are always delivered; the snapshot cell keeps the
/// latest counters for front ends that fall behind or never drain.
pub const PROGRESS_BACKLOG: usize = 64;

/// Events emitted by the worker, in the order they happen.
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    Started(ProgressSnapshot),
    TaskStarted { task_index: usize, task: CopyTask },
    /// Sent after a chunk unless `PROGRESS_BACKLOG` updates are waiting
    Progress(ProgressSnapshot),
    TaskFinished(TransferResult),
    Finished(RunReport),
}

/// Forwards executor callbacks to a channel and a shared snapshot cell.
struct ChannelProgress {
    sender: Sender<ProgressUpdate>,
    latest: Arc<Mutex<ProgressSnapshot>>,
}

impl ChannelProgress {
    fn publish(&self, snapshot: &ProgressSnapshot) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        latest.clone_from(snapshot);
    }

    fn send(&self, update: ProgressUpdate) {
        // Receiver may be gone if the front end stopped listening
        let _ = self.sender.send(update);
    }
}

impl ProgressCallback for ChannelProgress {
    fn on_run_started(&self, snapshot: &ProgressSnapshot) {
        self.publish(snapshot);
        self.send(ProgressUpdate::Started(snapshot.clone()));
    }

    fn on_task_started(&self, snapshot: &ProgressSnapshot, task_index: usize, task: &CopyTask) {
        self.publish(snapshot);
        self.send(ProgressUpdate::TaskStarted {
            task_index,
            task: task.clone(),
        });
    }

    fn on_task_progress(&self, snapshot: &ProgressSnapshot, _task_index: usize, _bytes: u64) {
        self.publish(snapshot);
        if self.sender.len() < PROGRESS_BACKLOG {
            self.send(ProgressUpdate::Progress(snapshot.clone()));
        }
    }

    fn on_task_finished(&self, snapshot: &ProgressSnapshot, result: &TransferResult) {
        self.publish(snapshot);
        self.send(ProgressUpdate::TaskFinished(result.clone()));
    }

    fn on_run_finished(&self, snapshot: &ProgressSnapshot, report: &RunReport) {
        self.publish(snapshot);
        self.send(ProgressUpdate::Finished(report.clone()));
    }
}

/// Front-end side of a running transfer.
pub struct TransferHandle {
    cancel: CancelToken,
    updates: Receiver<ProgressUpdate>,
    latest: Arc<Mutex<ProgressSnapshot>>,
    thread: JoinHandle<Result<RunReport, EngineError>>,
}

impl TransferHandle {
    /// Ask the worker to stop; takes effect within one chunk.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn updates(&self) -> &Receiver<ProgressUpdate> {
        &self.updates
    }

    /// Copy of the most recent progress snapshot.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker and return its report.
    pub fn join(self) -> Result<RunReport, EngineError> {
        self.thread.join().map_err(|_| EngineError::Worker {
            message: "transfer thread panicked".to_string(),
        })?
    }
}

/// Start executing `plan` on a new background thread.
///
/// # Errors
/// Returns EngineError if the thread cannot be spawned.
pub fn spawn_transfer(
    plan: TransferPlan,
    options: TransferOptions,
) -> Result<TransferHandle, EngineError> {
    spawn_transfer_with_cancel(plan, options, CancelToken::new())
}

/// Like [`spawn_transfer`], observing an existing cancellation token.
pub fn spawn_transfer_with_cancel(
    plan: TransferPlan,
    options: TransferOptions,
    cancel: CancelToken,
) -> Result<TransferHandle, EngineError> {
    let (sender, updates) = unbounded::<ProgressUpdate>();
    let latest = Arc::new(Mutex::new(ProgressSnapshot {
        tasks_total: plan.tasks().len(),
        bytes_total: plan.total_bytes(),
        ..Default::default()
    }));

    let callback = ChannelProgress {
        sender,
        latest: Arc::clone(&latest),
    };
    let worker_cancel = cancel.clone();

    let thread = thread::Builder::new()
        .name("ferry-worker".to_string())
        .spawn(move || {
            debug!("Worker started for transfer {}", plan.id());
            run_transfer(&plan, options, &worker_cancel, Some(&callback))
        })
        .map_err(|e| EngineError::Worker {
            message: e.to_string(),
        })?;

    Ok(TransferHandle {
        cancel,
        updates,
        latest,
        thread,
    })
}
