//! Filesystem operations module.
//!
//! This module provides the low-level pieces the executor is built from:
//! - Chunked copying with cancellation between chunks
//! - Opening a destination according to the conflict policy
//! - Creating directories recursively
//! - Preserving modification times
//! - Preflight checks on the destination root

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::cancel::CancelToken;
use crate::error::EngineError;
use crate::model::ConflictPolicy;

/// Size of one read/write block. Also the cancellation granularity.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound on `name (n).ext` candidates tried before giving up.
const MAX_RENAME_ATTEMPTS: u32 = 10_000;

/// Why a chunked copy stopped early.
#[derive(Debug)]
pub enum CopyError {
    Read(io::Error),
    Write(io::Error),
    Cancelled,
}

/// Copy `reader` into `writer` in `CHUNK_SIZE` blocks.
///
/// `on_chunk` receives the length of every block written, after it was
/// written. The cancel token is checked before each block; when it fires,
/// whatever was already written stays in `writer`.
///
/// # Returns
/// Total number of bytes copied
pub fn copy_in_chunks<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    cancel: &CancelToken,
    mut on_chunk: F,
) -> Result<u64, CopyError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    F: FnMut(u64),
{
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        if cancel.is_cancelled() {
            writer.flush().map_err(CopyError::Write)?;
            return Err(CopyError::Cancelled);
        }

        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };

        writer.write_all(&buffer[..n]).map_err(CopyError::Write)?;
        total += n as u64;
        on_chunk(n as u64);
    }

    writer.flush().map_err(CopyError::Write)?;
    Ok(total)
}

/// Build the `n`-th rename candidate: `report.pdf` -> `report (n).pdf`.
///
/// `n == 0` returns the path unchanged. Only the last extension is kept after
/// the suffix, so `a.tar.gz` becomes `a.tar (1).gz`.
pub fn numbered_path(path: &Path, n: u32) -> PathBuf {
    if n == 0 {
        return path.to_path_buf();
    }

    // Built from OsStr pieces so non-UTF-8 names survive
    let mut name = path.file_stem().map(OsString::from).unwrap_or_default();
    name.push(format!(" ({})", n));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// Whether `destination` exists and is the same file as `source`.
///
/// Symlinks are followed and hard links compare equal, so an overwrite can
/// never truncate the file it is about to read.
#[cfg(unix)]
pub fn is_same_file(source: &Path, destination: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let dest_meta = match fs::metadata(destination) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let source_meta = fs::metadata(source)?;
    Ok(source_meta.dev() == dest_meta.dev() && source_meta.ino() == dest_meta.ino())
}

#[cfg(not(unix))]
pub fn is_same_file(source: &Path, destination: &Path) -> io::Result<bool> {
    let dest = match fs::canonicalize(destination) {
        Ok(path) => path,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    Ok(fs::canonicalize(source)? == dest)
}

/// Open the destination file for writing according to `policy`.
///
/// - `Overwrite`: create or truncate `path`.
/// - `Rename`: exclusively create the first free name among `path`,
///   `path (1)`, `path (2)`, ... The exclusive create makes the chosen name
///   unique in its directory at the moment it is claimed.
/// - `Skip`: exclusively create `path`, or return `None` if it exists.
///
/// # Returns
/// The open file and the path actually used, or `None` when skipped.
pub fn open_destination(
    path: &Path,
    policy: ConflictPolicy,
) -> io::Result<Option<(File, PathBuf)>> {
    match policy {
        ConflictPolicy::Overwrite => {
            let file = File::create(path)?;
            Ok(Some((file, path.to_path_buf())))
        }
        ConflictPolicy::Skip => match create_new(path) {
            Ok(file) => Ok(Some((file, path.to_path_buf()))),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e),
        },
        ConflictPolicy::Rename => {
            for n in 0..MAX_RENAME_ATTEMPTS {
                let candidate = numbered_path(path, n);
                match create_new(&candidate) {
                    Ok(file) => {
                        if n > 0 {
                            debug!(
                                "{} exists, writing to {}",
                                path.display(),
                                candidate.display()
                            );
                        }
                        return Ok(Some((file, candidate)));
                    }
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                    Err(e) => return Err(e),
                }
            }
            Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("no free name found for {}", path.display()),
            ))
        }
    }
}

fn create_new(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// Ensure the parent directory of a path exists, creating it if necessary.
pub fn ensure_parent_dir_exists(path: &Path) -> io::Result<()> {
    match path.parent() {
        // Relative single-component paths have an empty parent
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir_exists(parent),
        _ => Ok(()),
    }
}

/// Create `dir` and all missing ancestors; fails if `dir` exists as a file.
pub fn ensure_dir_exists(dir: &Path) -> io::Result<()> {
    match fs::metadata(dir) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists but is not a directory", dir.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir_all(dir),
        Err(e) => Err(e),
    }
}

/// Copy the source's modification time onto the destination.
pub fn preserve_mtime(source_metadata: &fs::Metadata, destination: &Path) -> io::Result<()> {
    let mtime = filetime::FileTime::from_last_modification_time(source_metadata);
    filetime::set_file_mtime(destination, mtime)
}

/// Check that `root` is an existing directory with room for `required` bytes.
///
/// Pass `required = 0` to skip the space check.
pub fn check_destination_root(root: &Path, required: u64) -> Result<(), EngineError> {
    match fs::metadata(root) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(EngineError::DestinationNotDirectory {
                path: root.to_path_buf(),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EngineError::DestinationNotFound {
                path: root.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(EngineError::DestinationAccessDenied {
                path: root.to_path_buf(),
                source: e,
            })
        }
    }

    if required == 0 {
        return Ok(());
    }

    let available = fs2::available_space(root).map_err(|e| EngineError::DestinationAccessDenied {
        path: root.to_path_buf(),
        source: e,
    })?;
    if available < required {
        return Err(EngineError::InsufficientSpace {
            path: root.to_path_buf(),
            required,
            available,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that yields a fixed payload, then fails.
    struct FailingReader {
        sent: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                Err(io::Error::new(io::ErrorKind::Other, "device removed"))
            } else {
                self.sent = true;
                buf[..4].copy_from_slice(b"data");
                Ok(4)
            }
        }
    }

    #[test]
    fn test_copy_in_chunks_reports_every_chunk() {
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 100)).map(|i| (i % 256) as u8).collect();
        let mut out = Vec::new();
        let mut chunks = Vec::new();

        let copied = copy_in_chunks(&mut data.as_slice(), &mut out, &CancelToken::new(), |n| {
            chunks.push(n)
        })
        .expect("Copy should succeed");

        assert_eq!(copied, data.len() as u64);
        assert_eq!(out, data);
        assert_eq!(chunks.iter().sum::<u64>(), data.len() as u64);
        assert!(chunks.iter().all(|&n| n as usize <= CHUNK_SIZE));
    }

    #[test]
    fn test_copy_in_chunks_stops_when_cancelled() {
        let data = vec![7u8; CHUNK_SIZE * 4];
        let mut out = Vec::new();
        let cancel = CancelToken::new();
        let cancel_inner = cancel.clone();

        let result = copy_in_chunks(&mut data.as_slice(), &mut out, &cancel, |_| {
            cancel_inner.cancel()
        });

        assert!(matches!(result, Err(CopyError::Cancelled)));
        // Partial output from before the cancel is kept
        assert_eq!(out.len(), CHUNK_SIZE);
    }

    #[test]
    fn test_copy_in_chunks_read_error() {
        let mut out = Vec::new();
        let result = copy_in_chunks(
            &mut FailingReader { sent: false },
            &mut out,
            &CancelToken::new(),
            |_| {},
        );
        assert!(matches!(result, Err(CopyError::Read(_))));
        assert_eq!(out, b"data");
    }

    #[test]
    fn test_numbered_path() {
        let path = Path::new("/mnt/usb/report.pdf");
        assert_eq!(numbered_path(path, 0), PathBuf::from("/mnt/usb/report.pdf"));
        assert_eq!(numbered_path(path, 1), PathBuf::from("/mnt/usb/report (1).pdf"));
        assert_eq!(numbered_path(path, 12), PathBuf::from("/mnt/usb/report (12).pdf"));
        assert_eq!(
            numbered_path(Path::new("/mnt/usb/Makefile"), 2),
            PathBuf::from("/mnt/usb/Makefile (2)")
        );
        assert_eq!(
            numbered_path(Path::new("a.tar.gz"), 1),
            PathBuf::from("a.tar (1).gz")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_numbered_path_keeps_non_utf8_name() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new("/mnt/usb").join(OsStr::from_bytes(b"caf\xe9.txt"));
        let renamed = numbered_path(&path, 1);
        assert_eq!(
            renamed.file_name().map(OsStr::as_bytes),
            Some(&b"caf\xe9 (1).txt"[..])
        );
    }

    #[test]
    fn test_is_same_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let original = temp_dir.path().join("original.txt");
        let other = temp_dir.path().join("other.txt");
        let linked = temp_dir.path().join("linked.txt");
        fs::write(&original, b"data").expect("Failed to write file");
        fs::write(&other, b"data").expect("Failed to write file");
        fs::hard_link(&original, &linked).expect("Failed to create hard link");

        assert!(is_same_file(&original, &original).unwrap());
        #[cfg(unix)]
        assert!(is_same_file(&original, &linked).unwrap());
        assert!(!is_same_file(&original, &other).unwrap());
        assert!(!is_same_file(&original, &temp_dir.path().join("missing.txt")).unwrap());
    }

    #[test]
    fn test_open_destination_rename_picks_free_name() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let target = temp_dir.path().join("notes.txt");
        fs::write(&target, b"old").expect("Failed to write file");
        fs::write(temp_dir.path().join("notes (1).txt"), b"older").expect("Failed to write file");

        let (_, used) = open_destination(&target, ConflictPolicy::Rename)
            .expect("Open should succeed")
            .expect("Rename never skips");

        assert_eq!(used, temp_dir.path().join("notes (2).txt"));
        assert_eq!(fs::read(&target).unwrap(), b"old");
    }

    #[test]
    fn test_open_destination_rename_names_are_unique() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let target = temp_dir.path().join("photo.jpg");

        let mut used = Vec::new();
        for _ in 0..5 {
            let (_, path) = open_destination(&target, ConflictPolicy::Rename)
                .expect("Open should succeed")
                .expect("Rename never skips");
            assert!(!used.contains(&path));
            used.push(path);
        }
        assert_eq!(used[0], target);
        assert_eq!(used[4], temp_dir.path().join("photo (4).jpg"));
    }

    #[test]
    fn test_open_destination_overwrite_truncates() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let target = temp_dir.path().join("file.txt");
        fs::write(&target, b"existing content").expect("Failed to write file");

        let (mut file, used) = open_destination(&target, ConflictPolicy::Overwrite)
            .expect("Open should succeed")
            .expect("Overwrite never skips");
        file.write_all(b"new").expect("Failed to write");
        drop(file);

        assert_eq!(used, target);
        assert_eq!(fs::read(&target).unwrap(), b"new");
    }

    #[test]
    fn test_open_destination_skip_existing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let target = temp_dir.path().join("file.txt");
        fs::write(&target, b"keep me").expect("Failed to write file");

        let opened = open_destination(&target, ConflictPolicy::Skip).expect("Open should succeed");
        assert!(opened.is_none());
        assert_eq!(fs::read(&target).unwrap(), b"keep me");
    }

    #[test]
    fn test_ensure_parent_dir_exists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("a").join("b").join("file.txt");

        ensure_parent_dir_exists(&path).expect("Failed to create parent");
        assert!(temp_dir.path().join("a").join("b").is_dir());
    }

    #[test]
    fn test_ensure_dir_exists_rejects_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("taken");
        fs::write(&path, b"x").expect("Failed to write file");

        assert!(ensure_dir_exists(&path).is_err());
    }

    #[test]
    fn test_preserve_mtime() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src.txt");
        let dst = temp_dir.path().join("dst.txt");
        fs::write(&src, b"a").expect("Failed to write source");
        fs::write(&dst, b"a").expect("Failed to write dest");
        let past = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&src, past).expect("Failed to set mtime");

        let metadata = fs::metadata(&src).expect("Failed to stat source");
        preserve_mtime(&metadata, &dst).expect("Failed to preserve mtime");

        let dst_meta = fs::metadata(&dst).expect("Failed to stat dest");
        assert_eq!(filetime::FileTime::from_last_modification_time(&dst_meta), past);
    }

    #[test]
    fn test_check_destination_root() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        assert!(check_destination_root(temp_dir.path(), 1).is_ok());

        let missing = temp_dir.path().join("missing");
        assert!(matches!(
            check_destination_root(&missing, 0),
            Err(EngineError::DestinationNotFound { .. })
        ));

        let file = temp_dir.path().join("file");
        fs::write(&file, b"x").expect("Failed to write file");
        assert!(matches!(
            check_destination_root(&file, 0),
            Err(EngineError::DestinationNotDirectory { .. })
        ));

        assert!(matches!(
            check_destination_root(temp_dir.path(), u64::MAX),
            Err(EngineError::InsufficientSpace { .. })
        ));
    }
}
