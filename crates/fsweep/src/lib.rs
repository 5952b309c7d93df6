//! Concurrent, cancellable filesystem search with bulk file operations.
//!
//! Given one or more root directories and a set of name/extension
//! patterns, [`search`] enumerates the reachable file tree, filters
//! entries against size, age, hidden and pattern constraints, optionally
//! deduplicates by a quick fingerprint, and streams matches to the caller
//! in soft real time. A coupled subsystem applies bulk copy/move/delete
//! operations to matches with conflict resolution and backpressure.
//!
//! ## Architecture
//!
//! Walkers (one per root, with parallel subdirectory descent) feed a set
//! of bounded priority lanes; matcher workers drain the lanes in batches,
//! evaluate the compiled patterns and constraints, fingerprint accepted
//! files, and forward results into a bounded stream. Everything observes a
//! shared cancellation token at each suspension point, and every
//! per-search resource is owned by the orchestrator.
//!
//! ```no_run
//! use fsweep::{search, SearchOptions};
//!
//! let stream = search(SearchOptions {
//!     roots: vec!["/var/log".into()],
//!     patterns: vec!["*.log".to_string()],
//!     ignore_case: true,
//!     ..Default::default()
//! });
//! for result in stream {
//!     println!("{}", result.path.display());
//! }
//! ```

pub mod batch;
pub mod cancel;
pub mod error;
pub mod events;
pub mod fileops;
pub mod fingerprint;
pub mod humanize;
pub mod matcher;
pub mod options;
pub mod pattern;
pub mod pool;
pub mod results;
pub mod search;

mod walker;

pub use cancel::CancellationToken;
pub use error::{Result, SearchError};
pub use events::{EventSink, LogLevel, SharedSink};
pub use fileops::{handle_file_operation, FileOperationProcessor, FileOperationTask};
pub use options::{
    ConflictPolicy, FileOperation, FileOperationSpec, ProcessorOptions, SearchOptions,
};
pub use pattern::CompiledPatterns;
pub use results::{ResultStream, SearchResult};
pub use search::{search, search_with};

/// Crate version, surfaced by the CLI's `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
