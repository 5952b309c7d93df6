//! Bulk file operations: copy, move, delete with conflict resolution.
//!
//! Copies go through a temp file that is fsynced and atomically renamed
//! into place, so a failure mid-copy never leaves a truncated target.

mod processor;

pub use processor::{EntrySnapshot, FileOperationProcessor, FileOperationTask};

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::RngCore;

use crate::error::{Result, SearchError};
use crate::options::{ConflictPolicy, FileOperation, FileOperationSpec};
use crate::pool::BufferPools;

const DISK_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DISK_PROBE_MAX_BYTES: u64 = 1024 * 1024;
const RENAME_ATTEMPTS: u32 = 100;

/// Applies `spec` to `path` with a transient buffer pool. Hosts issuing
/// many operations should use a [`FileOperationProcessor`], which reuses
/// its pool across tasks.
pub fn handle_file_operation(path: &Path, spec: &FileOperationSpec) -> Result<()> {
    handle_file_operation_with(path, spec, &BufferPools::new())
}

pub(crate) fn handle_file_operation_with(
    path: &Path,
    spec: &FileOperationSpec,
    pools: &BufferPools,
) -> Result<()> {
    if spec.operation == FileOperation::None {
        return Ok(());
    }
    spec.validate()?;

    let src_meta = fs::metadata(path).map_err(|e| SearchError::from_io(e, path))?;
    check_file_access(path)?;

    if spec.operation != FileOperation::Delete {
        fs::create_dir_all(&spec.target_dir)
            .map_err(|e| SearchError::from_io(e, &spec.target_dir))?;
        check_dir_writable(&spec.target_dir)?;
    }

    match spec.operation {
        FileOperation::None => Ok(()),
        FileOperation::Copy => copy_file(path, spec, &src_meta, pools),
        FileOperation::Move => move_file(path, spec, &src_meta, pools),
        FileOperation::Delete => {
            check_file_writable(path)?;
            fs::remove_file(path).map_err(|e| SearchError::from_io(e, path))
        }
    }
}

/// The file must be openable for reading before anything else happens.
fn check_file_access(path: &Path) -> Result<()> {
    File::open(path)
        .map(drop)
        .map_err(|e| SearchError::from_io(e, path))
}

fn check_file_writable(path: &Path) -> Result<()> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .map(drop)
        .map_err(|e| SearchError::from_io(e, path))
}

/// Proves the directory is writable by creating and removing a probe file
/// with a random name.
fn check_dir_writable(dir: &Path) -> Result<()> {
    tempfile::Builder::new()
        .prefix(".tmp_")
        .tempfile_in(dir)
        .map(drop)
        .map_err(|e| SearchError::from_io(e, dir))
}

/// Resolves the target path under the conflict policy. `None` means "no
/// work": skip chose to leave the existing file alone.
pub(crate) fn resolve_conflict(target: &Path, policy: ConflictPolicy) -> Option<PathBuf> {
    if policy == ConflictPolicy::Overwrite {
        return Some(target.to_path_buf());
    }
    if !target.exists() {
        return Some(target.to_path_buf());
    }
    match policy {
        ConflictPolicy::Skip => None,
        ConflictPolicy::Overwrite => Some(target.to_path_buf()),
        ConflictPolicy::Rename => Some(renamed_target(target)),
    }
}

fn renamed_target(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    for attempt in 1..=RENAME_ATTEMPTS {
        let candidate = target.with_file_name(format!("{stem}_{timestamp}_{attempt}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    let mut random = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut random);
    let hex: String = random.iter().map(|b| format!("{b:02x}")).collect();
    let candidate = target.with_file_name(format!("{stem}_{hex}{ext}"));
    if !candidate.exists() {
        return candidate;
    }

    target.with_file_name(format!("{stem}_{timestamp}{ext}"))
}

/// Removes a half-written temp file unless disarmed.
struct CleanupGuard<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> CleanupGuard<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(self.path);
        }
    }
}

fn temp_sibling(target: &Path) -> PathBuf {
    let mut os = target.to_path_buf().into_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

fn copy_file(src: &Path, spec: &FileOperationSpec, src_meta: &Metadata, pools: &BufferPools) -> Result<()> {
    let Some(name) = src.file_name() else {
        return Err(SearchError::InvalidInput(format!(
            "source has no file name: {}",
            src.display()
        )));
    };
    let target = spec.target_dir.join(name);
    let Some(target) = resolve_conflict(&target, spec.conflict_policy) else {
        return Ok(());
    };

    check_disk_space(&spec.target_dir, src_meta.len())?;

    if src_meta.len() == 0 {
        return copy_empty_file(&target, src_meta);
    }

    let mut buf = pools.copy.take()?;
    let mut src_file = File::open(src).map_err(|e| SearchError::from_io(e, src))?;

    let tmp = temp_sibling(&target);
    let mut dst_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp)
        .map_err(|e| SearchError::from_io(e, &tmp))?;
    let guard = CleanupGuard::new(&tmp);

    let mut written: u64 = 0;
    loop {
        let read = src_file
            .read(&mut buf)
            .map_err(|e| SearchError::from_io(e, src))?;
        if read == 0 {
            break;
        }
        dst_file
            .write_all(&buf[..read])
            .map_err(|e| SearchError::from_io(e, &tmp))?;
        written += read as u64;
    }

    if written != src_meta.len() {
        return Err(SearchError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!(
                "size mismatch copying {}: expected {}, wrote {written}",
                src.display(),
                src_meta.len()
            ),
        )));
    }

    dst_file.sync_all().map_err(|e| SearchError::from_io(e, &tmp))?;
    drop(dst_file);

    fs::rename(&tmp, &target).map_err(|e| SearchError::from_io(e, &target))?;
    guard.disarm();

    fs::set_permissions(&target, src_meta.permissions())
        .map_err(|e| SearchError::from_io(e, &target))?;
    Ok(())
}

fn copy_empty_file(target: &Path, src_meta: &Metadata) -> Result<()> {
    File::create(target).map_err(|e| SearchError::from_io(e, target))?;
    fs::set_permissions(target, src_meta.permissions())
        .map_err(|e| SearchError::from_io(e, target))?;
    Ok(())
}

fn move_file(src: &Path, spec: &FileOperationSpec, src_meta: &Metadata, pools: &BufferPools) -> Result<()> {
    let Some(name) = src.file_name() else {
        return Err(SearchError::InvalidInput(format!(
            "source has no file name: {}",
            src.display()
        )));
    };
    let target = spec.target_dir.join(name);
    let Some(target) = resolve_conflict(&target, spec.conflict_policy) else {
        return Ok(());
    };

    check_file_writable(src)?;

    // Fast path: same-filesystem rename is atomic.
    if fs::rename(src, &target).is_ok() {
        return Ok(());
    }

    // Cross-device or similar; fall back to copy then remove.
    copy_file(src, spec, src_meta, pools)?;
    fs::remove_file(src).map_err(|e| SearchError::from_io(e, src))
}

/// Bounded-time probe that the target filesystem can hold `size` more
/// bytes (up to a 1 MiB reservation). The probe thread is abandoned on
/// timeout rather than joined.
fn check_disk_space(dir: &Path, size: u64) -> Result<()> {
    let (done_tx, done_rx) = crossbeam_channel::bounded::<Result<()>>(1);
    let dir = dir.to_path_buf();
    std::thread::spawn(move || {
        let outcome = tempfile::Builder::new()
            .prefix(".space_check_")
            .tempfile_in(&dir)
            .and_then(|probe| {
                probe
                    .as_file()
                    .set_len(size.min(DISK_PROBE_MAX_BYTES))
                    .map(|()| probe)
            })
            .map(drop)
            .map_err(|e| SearchError::from_io(e, &dir));
        let _ = done_tx.send(outcome);
    });

    crossbeam_channel::select! {
        recv(done_rx) -> outcome => match outcome {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout(DISK_PROBE_TIMEOUT)),
        },
        recv(crossbeam_channel::after(DISK_PROBE_TIMEOUT)) -> _ => {
            Err(SearchError::Timeout(DISK_PROBE_TIMEOUT))
        }
    }
}
