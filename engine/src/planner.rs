//! Transfer planning.
//!
//! Turns the user's selection into an immutable `TransferPlan`: one
//! `CopyTask` per file, in a deterministic depth-first order, plus the
//! destination directories that preserve-structure needs. Unreadable
//! sources become `PlanIssue`s instead of failing the whole plan.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::model::{CopyTask, EntryKind, PlanIssue, SelectionEntry, TransferOptions, TransferPlan};

/// Build the plan for copying `selection` into `destination_root`.
///
/// Destinations are computed as:
/// - file entry: `<root>/<file name>`
/// - folder entry with `preserve_structure`: `<root>/<folder name>/<relative path>`
/// - folder entry without it (flat copy): `<root>/<file name>`
///
/// Conflicts between tasks are not resolved here; two tasks may share a
/// destination and the executor settles it in plan order.
pub fn plan_transfer<P: AsRef<Path>>(
    selection: &[SelectionEntry],
    destination_root: P,
    options: &TransferOptions,
) -> TransferPlan {
    let root = destination_root.as_ref();
    let mut builder = PlanBuilder::default();

    for entry in selection {
        match entry.kind {
            EntryKind::File => builder.add_file(&entry.path, root),
            EntryKind::Folder => builder.add_folder(&entry.path, root, options.preserve_structure),
        }
    }

    let plan = TransferPlan::new(
        root.to_path_buf(),
        builder.tasks,
        builder.directories,
        builder.issues,
    );
    info!(
        "Planned {} tasks ({} bytes), {} directories, {} excluded sources",
        plan.tasks().len(),
        plan.total_bytes(),
        plan.directories().len(),
        plan.issues().len()
    );
    plan
}

#[derive(Default)]
struct PlanBuilder {
    tasks: Vec<CopyTask>,
    directories: Vec<PathBuf>,
    issues: Vec<PlanIssue>,
}

impl PlanBuilder {
    fn issue(&mut self, path: &Path, message: impl Into<String>) {
        let issue = PlanIssue {
            path: path.to_path_buf(),
            message: message.into(),
        };
        warn!("Excluding {}", issue);
        self.issues.push(issue);
    }

    fn add_file(&mut self, path: &Path, root: &Path) {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => return self.issue(path, e.to_string()),
        };
        if metadata.is_dir() {
            return self.issue(path, "selected as a file but is a directory");
        }
        let Some(name) = path.file_name() else {
            return self.issue(path, "path has no file name");
        };

        self.tasks.push(CopyTask {
            source: path.to_path_buf(),
            destination: root.join(name),
            size: metadata.len(),
        });
    }

    fn add_folder(&mut self, path: &Path, root: &Path, preserve_structure: bool) {
        match fs::metadata(path) {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return self.issue(path, "selected as a folder but is not a directory"),
            Err(e) => return self.issue(path, e.to_string()),
        }

        // Copies land under the folder's own name; `.` and friends need resolving first
        let base = if preserve_structure {
            let name = folder_name(path);
            let base = match name {
                Some(name) => root.join(name),
                None => root.to_path_buf(),
            };
            self.directories.push(base.clone());
            Some(base)
        } else {
            None
        };

        let walker = WalkDir::new(path)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let failed = e.path().unwrap_or(path).to_path_buf();
                    self.issue(&failed, e.to_string());
                    continue;
                }
            };

            let relative = match entry.path().strip_prefix(path) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => PathBuf::from(entry.file_name()),
            };

            if entry.file_type().is_dir() {
                if let Some(base) = &base {
                    self.directories.push(base.join(&relative));
                }
                continue;
            }

            if !entry.file_type().is_file() {
                debug!("Ignoring special file {}", entry.path().display());
                continue;
            }

            let size = match entry.metadata() {
                Ok(m) => m.len(),
                Err(e) => {
                    self.issue(entry.path(), e.to_string());
                    continue;
                }
            };

            let destination = match &base {
                Some(base) => base.join(&relative),
                None => root.join(entry.file_name()),
            };

            self.tasks.push(CopyTask {
                source: entry.path().to_path_buf(),
                destination,
                size,
            });
        }
    }
}

/// Name a folder selection is copied under.
fn folder_name(path: &Path) -> Option<OsString> {
    if let Some(name) = path.file_name() {
        return Some(name.to_os_string());
    }
    fs::canonicalize(path)
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_os_string()))
}
