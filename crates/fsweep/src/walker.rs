//! Directory enumeration.
//!
//! One walker runs per search root. Each directory is screened against the
//! skip cache, its files are quick-filtered and batched into the path
//! lanes, and its subdirectories descend in parallel on the global rayon
//! pool, which bounds concurrent subwalkers at the logical CPU count.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use once_cell::sync::Lazy;
use rayon::prelude::*;

use crate::cancel::CancellationToken;
use crate::events::{EventSink, LogLevel};
use crate::matcher::should_process;
use crate::options::SearchOptions;
use crate::pattern::CompiledPatterns;

/// Paths accumulated per directory before draining into the lanes.
const WALK_BATCH_SIZE: usize = 1000;

/// System and tooling directories never worth descending into.
static SKIP_DIRS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "node_modules",
        ".git",
        ".svn",
        "target",
        "build",
        "dist",
        "__pycache__",
        ".idea",
        ".vscode",
        "$RECYCLE.BIN",
        "System Volume Information",
        "Windows",
        "Program Files",
        "Program Files (x86)",
        "ProgramData",
        "AppData",
        "Recovery",
        "Documents and Settings",
        "System32",
        "SysWOW64",
        "WindowsApps",
        "WinSxS",
    ])
});

/// Memoized per-search skip decisions, read-mostly.
#[derive(Debug, Default)]
pub(crate) struct SkipDirCache {
    paths: RwLock<HashMap<PathBuf, bool>>,
}

impl SkipDirCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn should_skip(
        &self,
        dir: &Path,
        opts: &SearchOptions,
        sink: &dyn EventSink,
    ) -> bool {
        if let Ok(cache) = self.paths.read() {
            if let Some(&skip) = cache.get(dir) {
                return skip;
            }
        }

        let base = dir.file_name().map(|n| n.to_string_lossy());
        let hidden = base
            .as_deref()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false);
        let skip = if opts.exclude_hidden && hidden {
            true
        } else if base
            .as_deref()
            .map(|name| SKIP_DIRS.contains(name))
            .unwrap_or(false)
        {
            true
        } else {
            opts.exclude_dirs
                .iter()
                .any(|excluded| dir.starts_with(excluded))
        };

        if let Ok(mut cache) = self.paths.write() {
            cache.insert(dir.to_path_buf(), skip);
        }
        if skip {
            sink.log(LogLevel::Debug, &format!("skipping directory: {}", dir.display()));
        }
        skip
    }
}

/// Matching priority of a file, decided by its root prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Priority {
    High,
    Normal,
    Low,
}

pub(crate) fn path_priority(path: &Path, opts: &SearchOptions) -> Priority {
    if opts.priority_dirs.iter().any(|dir| path.starts_with(dir)) {
        return Priority::High;
    }
    if opts.low_priority_dirs.iter().any(|dir| path.starts_with(dir)) {
        return Priority::Low;
    }
    Priority::Normal
}

/// Sending half of the path lanes. All three senders live and die
/// together, so the receiver side never sees a partially closed set.
#[derive(Debug, Clone)]
pub(crate) struct PathSender {
    high: Sender<PathBuf>,
    normal: Sender<PathBuf>,
    low: Sender<PathBuf>,
}

impl PathSender {
    /// Sends into the lane for `priority`, giving up when the token trips.
    /// Returns `false` on cancellation or when the lanes are gone.
    pub(crate) fn send(
        &self,
        path: PathBuf,
        priority: Priority,
        cancel: &CancellationToken,
    ) -> bool {
        let lane = match priority {
            Priority::High => &self.high,
            Priority::Normal => &self.normal,
            Priority::Low => &self.low,
        };
        crossbeam_channel::select! {
            send(lane, path) -> outcome => outcome.is_ok(),
            recv(cancel.channel()) -> _ => false,
        }
    }
}

/// Receiving half: drains the high lane fully before normal, then low.
/// Starvation of the lower lanes is accepted; priority is user-configured.
#[derive(Debug, Clone)]
pub(crate) struct PathReceiver {
    high: Receiver<PathBuf>,
    normal: Receiver<PathBuf>,
    low: Receiver<PathBuf>,
}

impl PathReceiver {
    /// Next path in priority order; `None` once cancelled or after every
    /// sender is gone and the lanes are drained.
    pub(crate) fn recv(&self, cancel: &CancellationToken) -> Option<PathBuf> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let mut disconnected = 0;
            for lane in [&self.high, &self.normal, &self.low] {
                match lane.try_recv() {
                    Ok(path) => return Some(path),
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => disconnected += 1,
                }
            }
            if disconnected == 3 {
                return None;
            }

            crossbeam_channel::select! {
                recv(self.high) -> r => if let Ok(path) = r { return Some(path) },
                recv(self.normal) -> r => if let Ok(path) = r { return Some(path) },
                recv(self.low) -> r => if let Ok(path) = r { return Some(path) },
                recv(cancel.channel()) -> _ => return None,
            }
        }
    }
}

pub(crate) fn path_lanes(capacity: usize) -> (PathSender, PathReceiver) {
    let (high_tx, high_rx) = bounded(capacity);
    let (normal_tx, normal_rx) = bounded(capacity);
    let (low_tx, low_rx) = bounded(capacity);
    (
        PathSender {
            high: high_tx,
            normal: normal_tx,
            low: low_tx,
        },
        PathReceiver {
            high: high_rx,
            normal: normal_rx,
            low: low_rx,
        },
    )
}

/// Enumeration counters, shared by every walker of a search.
#[derive(Debug, Default)]
pub(crate) struct WalkStats {
    pub files: AtomicUsize,
    pub dirs: AtomicUsize,
}

impl WalkStats {
    pub(crate) fn files_scanned(&self) -> usize {
        self.files.load(Ordering::Relaxed)
    }

    pub(crate) fn dirs_scanned(&self) -> usize {
        self.dirs.load(Ordering::Relaxed)
    }
}

/// Everything a walker needs, owned by the orchestrator for the lifetime of
/// one search.
pub(crate) struct WalkContext<'a> {
    pub opts: &'a SearchOptions,
    pub patterns: &'a CompiledPatterns,
    pub skip_cache: &'a SkipDirCache,
    pub paths: &'a PathSender,
    pub cancel: &'a CancellationToken,
    pub sink: &'a dyn EventSink,
    pub stats: &'a WalkStats,
}

/// Recursively enumerates `dir`, feeding accepted file paths into the
/// lanes. Unreadable directories are logged and skipped; nothing here stops
/// the wider search.
pub(crate) fn walk_directory(dir: &Path, ctx: &WalkContext<'_>) {
    if ctx.cancel.is_cancelled() {
        return;
    }
    if ctx.skip_cache.should_skip(dir, ctx.opts, ctx.sink) {
        return;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            ctx.sink.log(
                LogLevel::Error,
                &format!("failed to read directory {}: {error}", dir.display()),
            );
            return;
        }
    };

    ctx.stats.dirs.fetch_add(1, Ordering::Relaxed);

    let mut batch: Vec<PathBuf> = Vec::with_capacity(WALK_BATCH_SIZE);
    let mut subdirs: Vec<PathBuf> = Vec::new();

    for entry in entries {
        if ctx.cancel.is_cancelled() {
            return;
        }
        let Ok(entry) = entry else {
            continue;
        };
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();

        if file_type.is_dir() {
            subdirs.push(path);
            continue;
        }
        ctx.stats.files.fetch_add(1, Ordering::Relaxed);
        if file_type.is_symlink() {
            if !ctx.opts.follow_symlinks {
                continue;
            }
            // Following: classify by the link target.
            match fs::metadata(&path) {
                Ok(meta) if meta.is_dir() => {
                    subdirs.push(path);
                    continue;
                }
                Ok(_) => {}
                Err(_) => continue,
            }
        }

        if should_process(&path, ctx.opts, ctx.patterns) {
            batch.push(path);
            if batch.len() >= WALK_BATCH_SIZE && !drain_batch(&mut batch, ctx) {
                return;
            }
        }
    }

    if !drain_batch(&mut batch, ctx) {
        return;
    }

    subdirs
        .into_par_iter()
        .for_each(|subdir| walk_directory(&subdir, ctx));
}

fn drain_batch(batch: &mut Vec<PathBuf>, ctx: &WalkContext<'_>) -> bool {
    for path in batch.drain(..) {
        let priority = path_priority(&path, ctx.opts);
        if !ctx.paths.send(path, priority, ctx.cancel) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use std::fs::File;

    fn collect_walk(root: &Path, opts: &SearchOptions) -> Vec<PathBuf> {
        let patterns = CompiledPatterns::compile(opts);
        let skip_cache = SkipDirCache::new();
        let cancel = CancellationToken::new();
        let (tx, rx) = path_lanes(4096);
        let sink = NullSink;
        let stats = WalkStats::default();
        let ctx = WalkContext {
            opts,
            patterns: &patterns,
            skip_cache: &skip_cache,
            paths: &tx,
            cancel: &cancel,
            sink: &sink,
            stats: &stats,
        };
        walk_directory(root, &ctx);
        drop(ctx);
        drop(tx);
        let mut found = Vec::new();
        while let Some(path) = rx.recv(&cancel) {
            found.push(path);
        }
        found.sort();
        found
    }

    #[test]
    fn walks_nested_files() {
        let dir = tempfile::TempDir::new().unwrap();
        File::create(dir.path().join("a.txt")).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("sub/b.txt")).unwrap();

        let opts = SearchOptions::default();
        let found = collect_walk(dir.path(), &opts);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn skips_builtin_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        File::create(dir.path().join("node_modules/dep.js")).unwrap();
        File::create(dir.path().join("app.js")).unwrap();

        let opts = SearchOptions::default();
        let found = collect_walk(dir.path(), &opts);
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("app.js"));
    }

    #[test]
    fn skips_hidden_directories_when_excluded() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".cache")).unwrap();
        File::create(dir.path().join(".cache/blob")).unwrap();
        File::create(dir.path().join("seen.txt")).unwrap();

        let opts = SearchOptions {
            exclude_hidden: true,
            ..Default::default()
        };
        let found = collect_walk(dir.path(), &opts);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn honors_exclude_dir_prefixes() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir(dir.path().join("keep")).unwrap();
        fs::create_dir(dir.path().join("drop")).unwrap();
        File::create(dir.path().join("keep/a")).unwrap();
        File::create(dir.path().join("drop/b")).unwrap();

        let opts = SearchOptions {
            exclude_dirs: vec![dir.path().join("drop")],
            ..Default::default()
        };
        let found = collect_walk(dir.path(), &opts);
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("keep/a"));
    }

    #[test]
    fn cancelled_walk_emits_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        File::create(dir.path().join("a.txt")).unwrap();

        let opts = SearchOptions::default();
        let patterns = CompiledPatterns::compile(&opts);
        let skip_cache = SkipDirCache::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (tx, rx) = path_lanes(16);
        let sink = NullSink;
        let stats = WalkStats::default();
        let ctx = WalkContext {
            opts: &opts,
            patterns: &patterns,
            skip_cache: &skip_cache,
            paths: &tx,
            cancel: &cancel,
            sink: &sink,
            stats: &stats,
        };
        walk_directory(dir.path(), &ctx);
        drop(ctx);
        drop(tx);
        assert!(rx.recv(&cancel).is_none());
    }

    #[test]
    fn priority_lanes_drain_high_first() {
        let (tx, rx) = path_lanes(16);
        let cancel = CancellationToken::new();
        assert!(tx.send(PathBuf::from("/low"), Priority::Low, &cancel));
        assert!(tx.send(PathBuf::from("/normal"), Priority::Normal, &cancel));
        assert!(tx.send(PathBuf::from("/high"), Priority::High, &cancel));
        drop(tx);

        assert_eq!(rx.recv(&cancel), Some(PathBuf::from("/high")));
        assert_eq!(rx.recv(&cancel), Some(PathBuf::from("/normal")));
        assert_eq!(rx.recv(&cancel), Some(PathBuf::from("/low")));
        assert_eq!(rx.recv(&cancel), None);
    }

    #[test]
    fn stats_count_scanned_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        File::create(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("sub/b")).unwrap();

        let opts = SearchOptions::default();
        let patterns = CompiledPatterns::compile(&opts);
        let skip_cache = SkipDirCache::new();
        let cancel = CancellationToken::new();
        let (tx, _rx) = path_lanes(64);
        let sink = NullSink;
        let stats = WalkStats::default();
        let ctx = WalkContext {
            opts: &opts,
            patterns: &patterns,
            skip_cache: &skip_cache,
            paths: &tx,
            cancel: &cancel,
            sink: &sink,
            stats: &stats,
        };
        walk_directory(dir.path(), &ctx);
        assert_eq!(stats.files_scanned(), 2);
        assert_eq!(stats.dirs_scanned(), 2);
    }

    #[test]
    fn skip_cache_memoizes() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("node_modules");
        fs::create_dir(&target).unwrap();
        let opts = SearchOptions::default();
        let cache = SkipDirCache::new();
        assert!(cache.should_skip(&target, &opts, &NullSink));
        assert!(cache.should_skip(&target, &opts, &NullSink));
        assert!(!cache.should_skip(dir.path(), &opts, &NullSink));
    }
}
