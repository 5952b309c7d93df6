//! Search orchestration.
//!
//! `search` wires the pipeline together: walkers enumerate roots into the
//! priority path lanes, matcher workers batch and evaluate paths, accepted
//! files are fingerprinted and forwarded into the result stream, and an
//! optional file-operation processor receives a task per match. The
//! orchestrator owns every per-search resource (compiled patterns, skip
//! cache, buffer pools), and it all drops with the search, so nothing lingers
//! between searches.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use crossbeam_channel::bounded;

use crate::batch::BatchProcessor;
use crate::cancel::CancellationToken;
use crate::events::{EventSink, LogLevel, SharedSink, TracingSink};
use crate::fileops::{EntrySnapshot, FileOperationProcessor, FileOperationTask};
use crate::fingerprint;
use crate::matcher;
use crate::options::{FileOperation, ProcessorOptions, SearchOptions};
use crate::pattern::{CompiledPatterns, FoldCache};
use crate::pool::BufferPools;
use crate::results::{ResultProcessor, ResultStream, SearchResult};
use crate::walker::{path_lanes, SkipDirCache, WalkContext, WalkStats};

/// Runs a search with a fresh cancellation token and the default sink.
/// Returns immediately; results arrive on the stream as they are found.
pub fn search(opts: SearchOptions) -> ResultStream {
    search_with(opts, CancellationToken::new(), Arc::new(TracingSink))
}

/// Runs a search observing the caller's cancellation token and publishing
/// events to the caller's sink.
pub fn search_with(
    opts: SearchOptions,
    cancel: CancellationToken,
    sink: SharedSink,
) -> ResultStream {
    let opts = opts.normalized();
    let (results_tx, results_rx) = bounded(opts.buffer_size);
    let stream = ResultStream::new(results_rx);

    std::thread::spawn(move || {
        let processor = ResultProcessor::new(results_tx, opts.deduplicate, sink.clone());
        run_search(&opts, &cancel, &sink, &processor);
        // Closes exactly once, on every path out of run_search.
        processor.close();
    });

    stream
}

fn run_search(
    opts: &SearchOptions,
    cancel: &CancellationToken,
    sink: &SharedSink,
    processor: &ResultProcessor,
) {
    let fold_cache = FoldCache::new();
    let patterns = CompiledPatterns::compile_with_cache(opts, &fold_cache);
    let skip_cache = SkipDirCache::new();
    let pools = BufferPools::new();
    let stats = WalkStats::default();

    let file_ops = start_file_op_processor(opts, sink);

    let (paths_tx, paths_rx) = path_lanes(opts.buffer_size);

    std::thread::scope(|scope| {
        for _ in 0..opts.workers {
            let worker_rx = paths_rx.clone();
            let patterns = &patterns;
            let pools = &pools;
            let file_ops = file_ops.as_ref();
            let sink = sink.clone();
            scope.spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    let mut batch = BatchProcessor::new(opts.batch_size, |paths| {
                        process_file_batch(
                            paths, opts, patterns, pools, processor, file_ops, cancel, &sink,
                        );
                    });
                    while let Some(path) = worker_rx.recv(cancel) {
                        batch.add(path);
                    }
                    // Drains the tail on normal exit and on cancellation.
                    batch.flush();
                }));
                if outcome.is_err() {
                    sink.log(
                        LogLevel::Error,
                        "matcher worker panicked; its current batch was dropped",
                    );
                }
            });
        }

        for root in &opts.roots {
            let walker_tx = paths_tx.clone();
            let patterns = &patterns;
            let skip_cache = &skip_cache;
            let stats = &stats;
            let sink = sink.clone();
            scope.spawn(move || {
                let ctx = WalkContext {
                    opts,
                    patterns,
                    skip_cache,
                    paths: &walker_tx,
                    cancel,
                    sink: sink.as_ref(),
                    stats,
                };
                walk_directory_root(root, &ctx, sink.as_ref());
            });
        }

        // Walkers hold their own lane clones; once the last walker exits
        // the lanes disconnect and the matchers drain out.
        drop(paths_tx);
    });

    if let Some(proc) = &file_ops {
        // A cancelled search abandons queued operations; a completed one
        // lets the pool drain what the matchers enqueued.
        if cancel.is_cancelled() {
            proc.stop();
        } else {
            proc.finish();
        }
    }

    if pools.total_outstanding() != 0 {
        sink.log(
            LogLevel::Error,
            &format!(
                "buffer pool leak: {} buffers still outstanding after search",
                pools.total_outstanding()
            ),
        );
    }

    sink.log(
        LogLevel::Info,
        &format!(
            "search finished: scanned {} files in {} directories",
            stats.files_scanned(),
            stats.dirs_scanned()
        ),
    );
}

fn walk_directory_root(root: &Path, ctx: &WalkContext<'_>, sink: &dyn EventSink) {
    // An explicitly named root may be a symlink; follow it.
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => crate::walker::walk_directory(root, ctx),
        Ok(_) => sink.log(
            LogLevel::Warning,
            &format!("search root is not a directory: {}", root.display()),
        ),
        Err(error) => sink.log(
            LogLevel::Error,
            &format!("cannot access search root {}: {error}", root.display()),
        ),
    }
}

fn start_file_op_processor(
    opts: &SearchOptions,
    sink: &SharedSink,
) -> Option<FileOperationProcessor> {
    if opts.file_op.operation == FileOperation::None {
        return None;
    }
    if let Err(error) = opts.file_op.validate() {
        sink.log(
            LogLevel::Error,
            &format!("file operation disabled: {error}"),
        );
        return None;
    }
    let proc = FileOperationProcessor::new(
        ProcessorOptions {
            workers: (opts.workers / 2).max(1),
            ..Default::default()
        },
        sink.clone(),
    );
    match proc.start() {
        Ok(()) => Some(proc),
        Err(error) => {
            sink.log(
                LogLevel::Error,
                &format!("failed to start file-operation processor: {error}"),
            );
            None
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn process_file_batch(
    paths: &[std::path::PathBuf],
    opts: &SearchOptions,
    patterns: &CompiledPatterns,
    pools: &BufferPools,
    processor: &ResultProcessor,
    file_ops: Option<&FileOperationProcessor>,
    cancel: &CancellationToken,
    sink: &SharedSink,
) {
    let now = SystemTime::now();
    for path in paths {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(error) => {
                sink.log(
                    LogLevel::Debug,
                    &format!("file vanished or inaccessible: {}: {error}", path.display()),
                );
                continue;
            }
        };
        if meta.file_type().is_symlink() && !opts.follow_symlinks {
            continue;
        }
        if !matcher::matches(path, patterns) {
            continue;
        }
        if !matcher::matches_constraints(&meta, opts, now) {
            continue;
        }

        let (hash, hash_error) = fingerprint_path(path, &meta, opts, pools, sink);
        let mut result = SearchResult::from_metadata(path.clone(), &meta);
        result.hash = hash;
        result.error = hash_error;
        processor.add(result, cancel);

        if let Some(proc) = file_ops {
            let task = FileOperationTask {
                source_path: path.clone(),
                spec: opts.file_op.clone(),
                snapshot: EntrySnapshot::from(&meta),
            };
            if let Err(error) = proc.add(task) {
                sink.log(
                    LogLevel::Warning,
                    &format!(
                        "could not queue file operation for {}: {error}",
                        path.display()
                    ),
                );
            }
        }
    }
}

/// Fingerprints a single accepted file. Large files go through the mmap
/// path when enabled, falling back to the regular read on any failure.
/// A fault never propagates: it is logged and attached to the result.
fn fingerprint_path(
    path: &Path,
    meta: &fs::Metadata,
    opts: &SearchOptions,
    pools: &BufferPools,
    sink: &SharedSink,
) -> (Option<u64>, Option<String>) {
    if opts.use_mmap && meta.len() >= opts.min_mmap_size {
        match panic::catch_unwind(AssertUnwindSafe(|| fingerprint::mmap_hash(path, meta))) {
            Ok(Ok(hash)) => return (Some(hash), None),
            Ok(Err(error)) => sink.log(
                LogLevel::Warning,
                &format!(
                    "mmap fingerprint failed for {}, using regular read: {error}",
                    path.display()
                ),
            ),
            Err(_) => sink.log(
                LogLevel::Error,
                &format!("fingerprint fault for {}", path.display()),
            ),
        }
    }

    let mut scratch = match pools.read.take() {
        Ok(buf) => buf,
        Err(error) => {
            sink.log(
                LogLevel::Error,
                &format!("fingerprint skipped for {}: {error}", path.display()),
            );
            return (None, Some(error.to_string()));
        }
    };
    match panic::catch_unwind(AssertUnwindSafe(|| {
        fingerprint::quick_hash(path, meta, &mut scratch)
    })) {
        Ok(hash) => (Some(hash), None),
        Err(_) => {
            sink.log(
                LogLevel::Error,
                &format!("fingerprint fault for {}", path.display()),
            );
            (None, Some("fingerprint calculation failed".to_string()))
        }
    }
}
