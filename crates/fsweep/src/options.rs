//! Search and file-operation configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

pub const DEFAULT_BUFFER_SIZE: usize = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_MIN_MMAP_SIZE: u64 = 100 * 1024 * 1024;

/// Parameters for a single search run.
///
/// Zero means "default" for the numeric knobs; [`SearchOptions::normalized`]
/// resolves them before the orchestrator wires anything up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Root directories to enumerate.
    pub roots: Vec<PathBuf>,
    /// Name patterns; `*` matches any sequence, everything else is a
    /// substring of the base name.
    pub patterns: Vec<String>,
    /// Extension tokens, with or without the leading dot.
    pub extensions: Vec<String>,
    pub ignore_case: bool,
    /// Matcher worker count; defaults to the logical CPU count.
    pub workers: usize,
    /// Capacity of the path and result channels.
    pub buffer_size: usize,
    /// Size window in bytes; a zero bound is unbounded on that side.
    pub min_size: u64,
    pub max_size: u64,
    /// Age window relative to now; a zero bound is unbounded on that side.
    pub min_age: Duration,
    pub max_age: Duration,
    pub exclude_hidden: bool,
    /// Directory prefixes excluded from the walk.
    pub exclude_dirs: Vec<PathBuf>,
    /// Extensions rejected outright by the quick filter.
    pub skip_extensions: Vec<String>,
    pub follow_symlinks: bool,
    /// Drop results whose fingerprint was already seen.
    pub deduplicate: bool,
    /// Paths handed to each matcher flush.
    pub batch_size: usize,
    /// Memory-map files at or above `min_mmap_size` when fingerprinting.
    pub use_mmap: bool,
    pub min_mmap_size: u64,
    /// Roots whose files are matched ahead of everything else.
    pub priority_dirs: Vec<PathBuf>,
    /// Roots whose files are matched only when nothing else is pending.
    pub low_priority_dirs: Vec<PathBuf>,
    /// Bulk operation applied to every match.
    pub file_op: FileOperationSpec,
}

impl SearchOptions {
    /// Resolves zero-valued knobs to their defaults.
    pub fn normalized(mut self) -> Self {
        if self.buffer_size == 0 {
            self.buffer_size = DEFAULT_BUFFER_SIZE;
        }
        if self.workers == 0 {
            self.workers = logical_cpus();
        }
        if self.batch_size == 0 {
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.min_mmap_size == 0 {
            self.min_mmap_size = DEFAULT_MIN_MMAP_SIZE;
        }
        self
    }
}

pub(crate) fn logical_cpus() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Bulk operation applied to matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    #[default]
    None,
    Copy,
    Move,
    Delete,
}

/// What to do when an operation's computed target already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    #[default]
    Skip,
    Overwrite,
    Rename,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileOperationSpec {
    pub operation: FileOperation,
    pub target_dir: PathBuf,
    pub conflict_policy: ConflictPolicy,
}

impl FileOperationSpec {
    /// Copy and move need somewhere to put the result.
    pub fn validate(&self) -> Result<()> {
        match self.operation {
            FileOperation::Copy | FileOperation::Move if self.target_dir.as_os_str().is_empty() => {
                Err(SearchError::InvalidInput(
                    "copy and move require a target directory".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Tuning for the file-operation processor.
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    pub workers: usize,
    pub max_queue_size: usize,
    pub throttle_interval: Duration,
    pub op_timeout: Duration,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            workers: logical_cpus(),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }
}

impl ProcessorOptions {
    pub fn normalized(mut self) -> Self {
        if self.workers == 0 {
            self.workers = logical_cpus();
        }
        if self.max_queue_size == 0 {
            self.max_queue_size = DEFAULT_MAX_QUEUE_SIZE;
        }
        if self.throttle_interval.is_zero() {
            self.throttle_interval = DEFAULT_THROTTLE_INTERVAL;
        }
        if self.op_timeout.is_zero() {
            self.op_timeout = DEFAULT_OP_TIMEOUT;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_fills_defaults() {
        let opts = SearchOptions::default().normalized();
        assert_eq!(opts.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(opts.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(opts.min_mmap_size, DEFAULT_MIN_MMAP_SIZE);
        assert!(opts.workers >= 1);
    }

    #[test]
    fn copy_without_target_is_rejected() {
        let spec = FileOperationSpec {
            operation: FileOperation::Copy,
            ..Default::default()
        };
        assert!(spec.validate().is_err());

        let spec = FileOperationSpec {
            operation: FileOperation::Delete,
            ..Default::default()
        };
        assert!(spec.validate().is_ok());
    }
}
