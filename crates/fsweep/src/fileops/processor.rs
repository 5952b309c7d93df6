//! Asynchronous file-operation processing.
//!
//! Tasks flow through a bounded queue into a worker pool. Enqueues are
//! paced by a throttle tick; sustained queue-full pressure widens the pool
//! up to twice its starting size, and the pool never shrinks mid-run. Each
//! task runs under its own timeout, and one task's failure never stops the
//! processor.

use std::fs::Metadata;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{after, bounded, tick, Receiver, Sender, TrySendError};

use crate::cancel::CancellationToken;
use crate::error::{Result, SearchError};
use crate::events::{LogLevel, SharedSink};
use crate::options::{FileOperationSpec, ProcessorOptions};
use crate::pool::BufferPools;

use super::handle_file_operation_with;

/// Source metadata captured when the task was enqueued. The operation
/// itself re-stats; this records what the matcher saw.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl From<&Metadata> for EntrySnapshot {
    fn from(meta: &Metadata) -> Self {
        Self {
            size: meta.len(),
            modified: meta.modified().ok(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileOperationTask {
    pub source_path: PathBuf,
    pub spec: FileOperationSpec,
    pub snapshot: EntrySnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    New,
    Started,
    Stopped,
}

struct Shared {
    cancel: CancellationToken,
    sink: SharedSink,
    pools: Arc<BufferPools>,
    op_timeout: Duration,
    max_workers: usize,
    current_workers: AtomicUsize,
}

struct State {
    phase: Phase,
    queue_tx: Option<Sender<FileOperationTask>>,
    queue_rx: Receiver<FileOperationTask>,
    handles: Vec<JoinHandle<()>>,
}

/// Bounded work queue of file operations with a fixed-but-widenable worker
/// pool. Lifecycle is `New → Started → Stopped`; `Stopped` is terminal.
pub struct FileOperationProcessor {
    shared: Arc<Shared>,
    state: Mutex<State>,
    throttle: Receiver<Instant>,
    workers: usize,
}

impl FileOperationProcessor {
    pub fn new(opts: ProcessorOptions, sink: SharedSink) -> Self {
        let opts = opts.normalized();
        let (queue_tx, queue_rx) = bounded(opts.max_queue_size);
        Self {
            shared: Arc::new(Shared {
                cancel: CancellationToken::new(),
                sink,
                pools: Arc::new(BufferPools::new()),
                op_timeout: opts.op_timeout,
                max_workers: opts.workers * 2,
                current_workers: AtomicUsize::new(0),
            }),
            state: Mutex::new(State {
                phase: Phase::New,
                queue_tx: Some(queue_tx),
                queue_rx,
                handles: Vec::new(),
            }),
            throttle: tick(opts.throttle_interval),
            workers: opts.workers,
        }
    }

    /// Spawns the worker pool. Calling twice is a programmer error.
    pub fn start(&self) -> Result<()> {
        let Ok(mut state) = self.state.lock() else {
            return Err(SearchError::Stopped);
        };
        match state.phase {
            Phase::Started => return Err(SearchError::AlreadyStarted),
            Phase::Stopped => return Err(SearchError::Stopped),
            Phase::New => {}
        }
        state.phase = Phase::Started;
        for _ in 0..self.workers {
            let shared = self.shared.clone();
            let queue = state.queue_rx.clone();
            state
                .handles
                .push(std::thread::spawn(move || worker_loop(shared, queue)));
        }
        self.shared
            .current_workers
            .store(self.workers, Ordering::SeqCst);
        Ok(())
    }

    /// Enqueues a task, pacing on the throttle tick first. When the queue
    /// is full and the pool has headroom, one extra worker is spawned and
    /// the enqueue retried once.
    pub fn add(&self, task: FileOperationTask) -> Result<()> {
        let queue_tx = {
            let Ok(state) = self.state.lock() else {
                return Err(SearchError::Stopped);
            };
            if state.phase == Phase::Stopped {
                return Err(SearchError::Stopped);
            }
            match state.queue_tx.clone() {
                Some(tx) => tx,
                None => return Err(SearchError::Stopped),
            }
        };

        crossbeam_channel::select! {
            recv(self.throttle) -> _ => {},
            recv(self.shared.cancel.channel()) -> _ => return Err(SearchError::Stopped),
        }

        match queue_tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Disconnected(_)) => Err(SearchError::Stopped),
            Err(TrySendError::Full(task)) => {
                if !self.spawn_extra_worker() {
                    return Err(SearchError::QueueFull);
                }
                match queue_tx.try_send(task) {
                    Ok(()) => Ok(()),
                    Err(TrySendError::Full(_)) => Err(SearchError::QueueFull),
                    Err(TrySendError::Disconnected(_)) => Err(SearchError::Stopped),
                }
            }
        }
    }

    /// Trips the processor-local cancel, closes the queue, and joins every
    /// worker. Queued tasks that no worker has picked up are abandoned.
    /// Idempotent.
    pub fn stop(&self) {
        self.shutdown(true);
    }

    /// Closes the queue and joins the workers after they drain it. Nothing
    /// already accepted is abandoned. Idempotent; terminal like `stop`.
    pub fn finish(&self) {
        self.shutdown(false);
    }

    fn shutdown(&self, abort: bool) {
        let handles = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.phase == Phase::Stopped {
                return;
            }
            state.phase = Phase::Stopped;
            if abort {
                self.shared.cancel.cancel();
            }
            state.queue_tx.take();
            std::mem::take(&mut state.handles)
        };
        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Workers alive right now; monotone non-decreasing while started.
    pub fn worker_count(&self) -> usize {
        self.shared.current_workers.load(Ordering::SeqCst)
    }

    /// Outstanding buffers in the processor's copy pool.
    pub fn outstanding_buffers(&self) -> usize {
        self.shared.pools.total_outstanding()
    }

    fn spawn_extra_worker(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.phase != Phase::Started {
            return false;
        }
        let current = self.shared.current_workers.load(Ordering::SeqCst);
        if current >= self.shared.max_workers {
            return false;
        }
        let shared = self.shared.clone();
        let queue = state.queue_rx.clone();
        state
            .handles
            .push(std::thread::spawn(move || worker_loop(shared, queue)));
        self.shared
            .current_workers
            .store(current + 1, Ordering::SeqCst);
        self.shared.sink.log(
            LogLevel::Info,
            &format!("widened file-op pool to {} workers", current + 1),
        );
        true
    }
}

impl Drop for FileOperationProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: Arc<Shared>, queue: Receiver<FileOperationTask>) {
    loop {
        crossbeam_channel::select! {
            recv(queue) -> task => {
                let Ok(task) = task else { return };
                run_task(&shared, task);
            },
            recv(shared.cancel.channel()) -> _ => return,
        }
    }
}

/// Runs one task under the per-operation timeout. The operation itself
/// executes on a dedicated thread; on timeout it is abandoned, logged, and
/// the worker moves on.
fn run_task(shared: &Arc<Shared>, task: FileOperationTask) {
    shared.sink.log(
        LogLevel::Debug,
        &format!(
            "queued {:?} for {} ({} bytes)",
            task.spec.operation,
            task.source_path.display(),
            task.snapshot.size
        ),
    );

    let (done_tx, done_rx) = bounded::<Result<()>>(1);
    let pools = shared.pools.clone();
    let path = task.source_path.clone();
    let spec = task.spec.clone();
    std::thread::spawn(move || {
        let _ = done_tx.send(handle_file_operation_with(&path, &spec, &pools));
    });

    crossbeam_channel::select! {
        recv(done_rx) -> outcome => match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => shared.sink.log(
                LogLevel::Error,
                &format!(
                    "file operation failed for {}: {error}",
                    task.source_path.display()
                ),
            ),
            Err(_) => {}
        },
        recv(after(shared.op_timeout)) -> _ => shared.sink.log(
            LogLevel::Error,
            &format!(
                "file operation timed out for {}",
                task.source_path.display()
            ),
        ),
        recv(shared.cancel.channel()) -> _ => {},
    }
}
