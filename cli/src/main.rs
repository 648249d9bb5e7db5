//! Ferry - Command-line front end for the transfer engine.
//!
//! Plans the selected files and folders, runs the copy on the engine's
//! background worker, renders progress to stderr, and prints a summary.
//! Ctrl-C cancels the transfer after the current chunk.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use engine::{
    check_destination_root, plan_transfer, spawn_transfer_with_cancel, CancelToken,
    ChecksumAlgorithm, ConflictPolicy, CopyTask, ProgressSnapshot, ProgressUpdate, RunReport,
    RunState, RunSummary, SelectionEntry, TaskStatus, TransferOptions, TransferResult,
};
use log::{info, warn, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Ferry - copy files and folders to a drive, with verification
#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(version)]
#[command(about = "Copy files and folders with progress, conflict renaming and checksum verification")]
struct Args {
    /// Files and folders to copy
    #[arg(value_name = "SOURCE", required = true)]
    sources: Vec<PathBuf>,

    /// Destination directory (must already exist)
    #[arg(long, short = 'd', value_name = "PATH")]
    dst: PathBuf,

    /// Put every file directly in the destination, ignoring folder structure
    #[arg(long)]
    flat: bool,

    /// Replace existing files instead of renaming the copy
    #[arg(long, conflicts_with = "skip_existing")]
    overwrite: bool,

    /// Leave existing files alone and skip the copy
    #[arg(long)]
    skip_existing: bool,

    /// Do not compare checksums after copying
    #[arg(long)]
    no_verify: bool,

    /// Checksum algorithm for verification: md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM", default_value = "sha256")]
    hash: ChecksumAlgorithm,

    /// Skip the free-space check on the destination
    #[arg(long)]
    no_space_check: bool,

    /// More output (-v per-file status, -vv debug logging)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn transfer_options(&self) -> TransferOptions {
        let conflict = if self.overwrite {
            ConflictPolicy::Overwrite
        } else if self.skip_existing {
            ConflictPolicy::Skip
        } else {
            ConflictPolicy::Rename
        };
        TransferOptions {
            verify: !self.no_verify,
            preserve_structure: !self.flat,
            conflict,
            checksum_algorithm: self.hash,
        }
    }

    fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

/// Renders worker updates to stderr
struct CliProgress {
    verbose: bool,
    quiet: bool,
    start_time: Instant,
    last_progress_update: Option<Instant>,
}

impl CliProgress {
    fn new(verbose: bool, quiet: bool) -> Self {
        CliProgress {
            verbose,
            quiet,
            start_time: Instant::now(),
            last_progress_update: None,
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn progress_bar(fraction: f64) -> String {
        let percent = (fraction * 100.0).round() as usize;
        let filled = (percent / 5).min(20);
        format!(
            "[{}{}] {:3}%",
            "=".repeat(filled),
            " ".repeat(20 - filled),
            percent
        )
    }

    /// Nothing to report when no file reached the checksum step
    fn verification_line(summary: &RunSummary, verified: bool) -> Option<String> {
        if !verified || summary.completed + summary.checksum_mismatches == 0 {
            return None;
        }
        Some(format!(
            "Verification: {} OK, {} mismatch",
            summary.completed, summary.checksum_mismatches
        ))
    }

    fn handle(&mut self, update: &ProgressUpdate) {
        match update {
            ProgressUpdate::Started(snapshot) => self.started(snapshot),
            ProgressUpdate::TaskStarted { task_index, task } => self.task_started(*task_index, task),
            ProgressUpdate::Progress(snapshot) => self.progress(snapshot),
            ProgressUpdate::TaskFinished(result) => self.task_finished(result),
            ProgressUpdate::Finished(_) => {}
        }
    }

    fn started(&self, snapshot: &ProgressSnapshot) {
        if self.quiet {
            return;
        }
        eprintln!(
            "Copying {} files ({})...",
            snapshot.tasks_total,
            Self::format_bytes(snapshot.bytes_total)
        );
    }

    fn task_started(&self, task_index: usize, task: &CopyTask) {
        if self.verbose {
            eprintln!("\r[{:3}] Copying: {}", task_index, task.source.display());
        }
    }

    fn progress(&mut self, snapshot: &ProgressSnapshot) {
        if self.quiet {
            return;
        }
        // Throttle progress updates to avoid spam (max once per 200ms)
        if let Some(last) = self.last_progress_update {
            if last.elapsed() < Duration::from_millis(200) {
                return;
            }
        }
        self.last_progress_update = Some(Instant::now());

        eprint!(
            "\rProgress: {} | {}/{}",
            Self::progress_bar(snapshot.fraction()),
            Self::format_bytes(snapshot.bytes_copied),
            Self::format_bytes(snapshot.bytes_total)
        );
        let _ = std::io::Write::flush(&mut std::io::stderr());
    }

    fn task_finished(&self, result: &TransferResult) {
        match (&result.status, &result.error) {
            (TaskStatus::Failed, Some(err)) if !err.is_cancelled() => {
                if !self.quiet {
                    eprintln!("\r[{:3}] Failed: {}", result.task_index, err);
                }
            }
            (status, _) if self.verbose => {
                let target = result
                    .final_destination
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                eprintln!("\r[{:3}] {}: {}", result.task_index, status, target);
            }
            _ => {}
        }
    }

    fn summary(&self, report: &RunReport, verified: bool) {
        eprintln!();
        let headline = match report.state {
            RunState::Cancelled => "Transfer cancelled.",
            RunState::Failed => "Transfer finished with errors.",
            _ => "Transfer complete!",
        };
        eprintln!("{}", headline);

        let summary = &report.summary;
        eprintln!(
            "Summary: {} completed, {} skipped, {} failed",
            summary.completed, summary.skipped, summary.failed
        );
        if let Some(line) = Self::verification_line(summary, verified) {
            eprintln!("{}", line);
        }
        eprintln!("Bytes copied: {}", Self::format_bytes(summary.bytes_copied));
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));
    }
}

fn init_logging(level: LevelFilter) {
    // A logger may already be installed (tests run main logic repeatedly)
    let _ = TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto);
}

/// Parse and validate command-line arguments, then run the transfer
fn main() {
    let args = Args::parse();
    init_logging(args.log_level());

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nCancelling transfer...");
        handler_token.cancel();
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    // Per-file failures are reported in the summary, not the exit code
    let exit_code = match run_cli(&args, cancel) {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args, cancel: CancelToken) -> Result<RunReport> {
    let options = args.transfer_options();

    // Unknown paths are tagged as files so the planner reports them
    let selection: Vec<SelectionEntry> = args
        .sources
        .iter()
        .map(|path| SelectionEntry::detect(path).unwrap_or_else(|_| SelectionEntry::file(path)))
        .collect();

    let plan = plan_transfer(&selection, &args.dst, &options);
    for issue in plan.issues() {
        eprintln!("Skipping {}", issue);
    }
    if plan.is_empty() {
        bail!("Nothing to copy");
    }

    let required = if args.no_space_check {
        0
    } else {
        plan.total_bytes()
    };
    check_destination_root(&args.dst, required).context("Destination check failed")?;

    info!(
        "Options: verify={} ({}), preserve_structure={}, conflicts={}",
        options.verify, options.checksum_algorithm, options.preserve_structure, options.conflict
    );

    let handle = spawn_transfer_with_cancel(plan, options, cancel)
        .context("Could not start transfer")?;

    let mut progress = CliProgress::new(args.verbose > 0, args.quiet);
    for update in handle.updates().iter() {
        progress.handle(&update);
    }

    let report = handle.join().context("Transfer worker failed")?;
    if !args.quiet {
        progress.summary(&report, options.verify);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(sources: Vec<PathBuf>, dst: PathBuf) -> Args {
        Args {
            sources,
            dst,
            flat: false,
            overwrite: false,
            skip_existing: false,
            no_verify: false,
            hash: ChecksumAlgorithm::Sha256,
            no_space_check: false,
            verbose: 0,
            quiet: true,
        }
    }

    #[test]
    fn test_cli_copies_folder_with_structure() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let folder = src_dir.path().join("docs");
        std::fs::create_dir(&folder).expect("Failed to create folder");
        std::fs::write(folder.join("test.txt"), "hello").expect("Failed to write file");

        let report = run_cli(&args(vec![folder], dst_dir.path().to_path_buf()), CancelToken::new())
            .expect("CLI should succeed with valid directories");

        assert_eq!(report.state, RunState::Completed);
        let copied = std::fs::read_to_string(dst_dir.path().join("docs").join("test.txt"))
            .expect("Failed to read copy");
        assert_eq!(copied, "hello");
    }

    #[test]
    fn test_cli_flat_copy() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let folder = src_dir.path().join("docs");
        std::fs::create_dir_all(folder.join("nested")).expect("Failed to create folder");
        std::fs::write(folder.join("nested").join("deep.txt"), "x").expect("Failed to write file");

        let mut cli_args = args(vec![folder], dst_dir.path().to_path_buf());
        cli_args.flat = true;
        run_cli(&cli_args, CancelToken::new()).expect("CLI should succeed");

        assert!(dst_dir.path().join("deep.txt").exists());
        assert!(!dst_dir.path().join("docs").exists());
    }

    #[test]
    fn test_cli_renames_by_default() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let file = src_dir.path().join("a.txt");
        std::fs::write(&file, "new").expect("Failed to write file");
        std::fs::write(dst_dir.path().join("a.txt"), "old").expect("Failed to write file");

        run_cli(&args(vec![file], dst_dir.path().to_path_buf()), CancelToken::new())
            .expect("CLI should succeed");

        assert_eq!(std::fs::read_to_string(dst_dir.path().join("a.txt")).unwrap(), "old");
        assert_eq!(std::fs::read_to_string(dst_dir.path().join("a (1).txt")).unwrap(), "new");
    }

    #[test]
    fn test_cli_reports_missing_source_but_copies_rest() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let file = src_dir.path().join("a.txt");
        std::fs::write(&file, "a").expect("Failed to write file");

        let report = run_cli(
            &args(
                vec![PathBuf::from("/nonexistent/path"), file],
                dst_dir.path().to_path_buf(),
            ),
            CancelToken::new(),
        )
        .expect("CLI should copy the readable source");

        assert_eq!(report.summary.completed, 1);
    }

    #[test]
    fn test_cli_rejects_only_missing_sources() {
        let dst_dir = TempDir::new().expect("Failed to create temp dir");

        let result = run_cli(
            &args(vec![PathBuf::from("/nonexistent/path")], dst_dir.path().to_path_buf()),
            CancelToken::new(),
        );
        assert!(result.is_err(), "CLI should reject a selection with nothing to copy");
    }

    #[test]
    fn test_cli_rejects_missing_destination() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let file = src_dir.path().join("a.txt");
        std::fs::write(&file, "a").expect("Failed to write file");

        let result = run_cli(
            &args(vec![file], src_dir.path().join("not-mounted")),
            CancelToken::new(),
        );
        assert!(result.is_err(), "CLI should reject a missing destination");
    }

    #[test]
    fn test_cli_cancelled_before_start() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let file = src_dir.path().join("a.txt");
        std::fs::write(&file, "a").expect("Failed to write file");

        let cancel = CancelToken::new();
        cancel.cancel();
        let report = run_cli(&args(vec![file], dst_dir.path().to_path_buf()), cancel)
            .expect("Cancelled runs still produce a report");

        assert_eq!(report.state, RunState::Cancelled);
        assert!(!dst_dir.path().join("a.txt").exists());
    }

    #[test]
    fn test_args_parse_options() {
        let parsed = Args::try_parse_from([
            "ferry",
            "--dst",
            "/mnt/usb",
            "--overwrite",
            "--no-verify",
            "--hash",
            "blake3",
            "a.txt",
            "docs",
        ])
        .expect("Arguments should parse");

        let options = parsed.transfer_options();
        assert_eq!(parsed.sources.len(), 2);
        assert_eq!(options.conflict, ConflictPolicy::Overwrite);
        assert!(!options.verify);
        assert!(options.preserve_structure);
        assert_eq!(options.checksum_algorithm, ChecksumAlgorithm::Blake3);
    }

    #[test]
    fn test_args_reject_conflicting_policies() {
        let result = Args::try_parse_from([
            "ferry",
            "--dst",
            "/mnt/usb",
            "--overwrite",
            "--skip-existing",
            "a.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_args_reject_invalid_hash_algorithm() {
        let result = Args::try_parse_from(["ferry", "--dst", "/mnt/usb", "--hash", "crc32", "a.txt"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_level() {
        let mut parsed = args(vec![], PathBuf::new());
        assert_eq!(parsed.log_level(), LevelFilter::Error);
        parsed.quiet = false;
        assert_eq!(parsed.log_level(), LevelFilter::Warn);
        parsed.verbose = 2;
        assert_eq!(parsed.log_level(), LevelFilter::Debug);
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(CliProgress::format_bytes(512), "512.00 B");
        assert_eq!(CliProgress::format_bytes(1536), "1.50 KB");
        assert_eq!(CliProgress::format_duration(Duration::from_secs(75)), "1m 15s");
        assert_eq!(CliProgress::progress_bar(0.5), "[==========          ]  50%");
    }

    #[test]
    fn test_verification_line_needs_checked_files() {
        let skipped = RunSummary {
            skipped: 3,
            ..Default::default()
        };
        assert_eq!(CliProgress::verification_line(&skipped, true), None);

        let mixed = RunSummary {
            completed: 2,
            failed: 1,
            checksum_mismatches: 1,
            ..Default::default()
        };
        assert_eq!(
            CliProgress::verification_line(&mixed, true).as_deref(),
            Some("Verification: 2 OK, 1 mismatch")
        );
        assert_eq!(CliProgress::verification_line(&mixed, false), None);
    }
}
