//! End-to-end engine scenarios: walk → filter → match → fingerprint →
//! stream, plus the file-operation branch and cancellation behavior.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fsweep::events::{EventSink, LogLevel};
use fsweep::{
    search, search_with, CancellationToken, ConflictPolicy, FileOperation, FileOperationSpec,
    SearchOptions, SearchResult,
};

fn base_options(root: &Path) -> SearchOptions {
    SearchOptions {
        roots: vec![root.to_path_buf()],
        ..Default::default()
    }
}

fn collect(opts: SearchOptions) -> Vec<SearchResult> {
    search(opts).collect()
}

struct RecordingSink {
    errors: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn new() -> Self {
        Self {
            errors: Mutex::new(Vec::new()),
        }
    }
}

impl EventSink for RecordingSink {
    fn log(&self, level: LogLevel, message: &str) {
        if level == LogLevel::Error {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }
}

#[test]
fn yields_matching_files_then_closes() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::write(dir.path().join("a.txt"), b"0123456789").unwrap();
    fs::write(dir.path().join("b.log"), b"0123456789").unwrap();

    let mut opts = base_options(dir.path());
    opts.patterns = vec!["*.txt".to_string()];
    let results = collect(opts);

    assert_eq!(results.len(), 1);
    assert!(results[0].path.ends_with("a.txt"));
    assert_eq!(results[0].size, 10);
    assert!(results[0].hash.is_some());
    assert!(results[0].error.is_none());
}

#[test]
fn case_sensitivity_controls_matching() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::write(dir.path().join("A.TXT"), b"x").unwrap();

    let mut opts = base_options(dir.path());
    opts.patterns = vec!["*.txt".to_string()];
    assert_eq!(collect(opts.clone()).len(), 0);

    opts.ignore_case = true;
    assert_eq!(collect(opts).len(), 1);
}

#[test]
fn size_window_filters_results() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::write(dir.path().join("x"), vec![0u8; 5 * 1024]).unwrap();

    let mut opts = base_options(dir.path());
    opts.min_size = 1024;
    opts.max_size = 10 * 1024;
    assert_eq!(collect(opts.clone()).len(), 1);

    opts.min_size = 6 * 1024;
    assert_eq!(collect(opts).len(), 0);
}

#[cfg(unix)]
#[test]
fn dedup_collapses_identical_fingerprints() {
    let dir = tempfile::TempDir::new().unwrap();
    let original = dir.path().join("a.txt");
    fs::write(&original, b"same bytes, same times").unwrap();
    // A hard link shares size, modtime and content: identical fingerprint.
    fs::hard_link(&original, dir.path().join("b.txt")).unwrap();

    let mut opts = base_options(dir.path());
    assert_eq!(collect(opts.clone()).len(), 2);

    opts.deduplicate = true;
    assert_eq!(collect(opts).len(), 1);
}

#[test]
fn empty_patterns_match_every_file() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::write(dir.path().join("one"), b"1").unwrap();
    fs::write(dir.path().join("two.log"), b"2").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/three.rs"), b"3").unwrap();

    assert_eq!(collect(base_options(dir.path())).len(), 3);
}

#[test]
fn hidden_entries_are_excluded_on_request() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::write(dir.path().join(".secret"), b"s").unwrap();
    fs::create_dir(dir.path().join(".cache")).unwrap();
    fs::write(dir.path().join(".cache/blob"), b"b").unwrap();
    fs::write(dir.path().join("visible.txt"), b"v").unwrap();

    let mut opts = base_options(dir.path());
    opts.exclude_hidden = true;
    let results = collect(opts);
    assert_eq!(results.len(), 1);
    assert!(results[0].path.ends_with("visible.txt"));
}

#[test]
fn multiple_roots_are_all_enumerated() {
    let first = tempfile::TempDir::new().unwrap();
    let second = tempfile::TempDir::new().unwrap();
    fs::write(first.path().join("a.txt"), b"a").unwrap();
    fs::write(second.path().join("b.txt"), b"b").unwrap();

    let opts = SearchOptions {
        roots: vec![first.path().to_path_buf(), second.path().to_path_buf()],
        patterns: vec!["*.txt".to_string()],
        ..Default::default()
    };
    assert_eq!(collect(opts).len(), 2);
}

#[test]
fn no_roots_closes_immediately() {
    let opts = SearchOptions::default();
    assert_eq!(collect(opts).len(), 0);
}

#[test]
fn pre_tripped_cancellation_yields_closed_stream() {
    let dir = tempfile::TempDir::new().unwrap();
    for i in 0..100 {
        fs::write(dir.path().join(format!("f{i}.txt")), b"x").unwrap();
    }

    let cancel = CancellationToken::new();
    cancel.cancel();
    let stream = search_with(
        base_options(dir.path()),
        cancel,
        Arc::new(fsweep::events::NullSink),
    );
    assert_eq!(stream.count(), 0);
}

#[test]
fn mid_run_cancellation_still_closes_the_stream() {
    let dir = tempfile::TempDir::new().unwrap();
    for i in 0..2000 {
        fs::write(dir.path().join(format!("f{i}.txt")), b"x").unwrap();
    }

    let cancel = CancellationToken::new();
    let trip = cancel.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        trip.cancel();
    });

    let stream = search_with(
        base_options(dir.path()),
        cancel,
        Arc::new(fsweep::events::NullSink),
    );
    // The stream must terminate; how much arrived before the trip is
    // timing-dependent.
    let seen = stream.count();
    assert!(seen <= 2000);
}

#[test]
fn search_reports_no_pool_leaks() {
    let dir = tempfile::TempDir::new().unwrap();
    for i in 0..50 {
        fs::write(dir.path().join(format!("f{i}.dat")), vec![i as u8; 2048]).unwrap();
    }

    let sink = Arc::new(RecordingSink::new());
    let stream = search_with(
        base_options(dir.path()),
        CancellationToken::new(),
        sink.clone(),
    );
    assert_eq!(stream.count(), 50);

    let errors = sink.errors.lock().unwrap();
    assert!(
        errors.iter().all(|m| !m.contains("buffer pool leak")),
        "pool leak reported: {errors:?}"
    );
}

#[test]
fn copy_operation_lands_before_the_stream_closes() {
    let src = tempfile::TempDir::new().unwrap();
    let dst = tempfile::TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), b"alpha").unwrap();
    fs::write(src.path().join("b.txt"), b"beta").unwrap();
    fs::write(src.path().join("c.log"), b"noise").unwrap();

    let mut opts = base_options(src.path());
    opts.patterns = vec!["*.txt".to_string()];
    opts.file_op = FileOperationSpec {
        operation: FileOperation::Copy,
        target_dir: dst.path().to_path_buf(),
        conflict_policy: ConflictPolicy::Skip,
    };

    // The stream closes only after the operation queue drains.
    assert_eq!(collect(opts.clone()).len(), 2);
    assert_eq!(fs::read(dst.path().join("a.txt")).unwrap(), b"alpha");
    assert_eq!(fs::read(dst.path().join("b.txt")).unwrap(), b"beta");
    assert!(!dst.path().join("c.log").exists());

    // Running again with skip: no error, nothing rewritten.
    assert_eq!(collect(opts).len(), 2);
    assert_eq!(fs::read(dst.path().join("a.txt")).unwrap(), b"alpha");
}

#[test]
fn move_operation_empties_the_source() {
    let src = tempfile::TempDir::new().unwrap();
    let dst = tempfile::TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), b"gone").unwrap();

    let mut opts = base_options(src.path());
    opts.file_op = FileOperationSpec {
        operation: FileOperation::Move,
        target_dir: dst.path().to_path_buf(),
        conflict_policy: ConflictPolicy::Skip,
    };
    assert_eq!(collect(opts).len(), 1);
    assert!(!src.path().join("a.txt").exists());
    assert_eq!(fs::read(dst.path().join("a.txt")).unwrap(), b"gone");
}

#[test]
fn events_are_published_for_unreadable_roots() {
    let sink = Arc::new(RecordingSink::new());
    let missing = Path::new("/definitely/not/a/real/root");
    let stream = search_with(
        base_options(missing),
        CancellationToken::new(),
        sink.clone(),
    );
    assert_eq!(stream.count(), 0);
    assert!(!sink.errors.lock().unwrap().is_empty());
}

#[test]
fn worker_count_is_respected() {
    let dir = tempfile::TempDir::new().unwrap();
    for i in 0..200 {
        fs::write(dir.path().join(format!("f{i}.txt")), b"x").unwrap();
    }

    let mut opts = base_options(dir.path());
    opts.workers = 1;
    opts.batch_size = 7;
    assert_eq!(collect(opts).len(), 200);
}

#[test]
fn each_match_appears_exactly_once() {
    let dir = tempfile::TempDir::new().unwrap();
    for i in 0..64 {
        fs::write(dir.path().join(format!("f{i}.txt")), format!("{i}")).unwrap();
    }

    let counter = Arc::new(AtomicUsize::new(0));
    let stream = search(base_options(dir.path()));
    for result in stream {
        assert!(result.path.exists());
        counter.fetch_add(1, Ordering::SeqCst);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 64);
}
