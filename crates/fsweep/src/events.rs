//! Event sink: the injected logging seam.
//!
//! The engine never logs directly; it publishes structured records to an
//! [`EventSink`] supplied by the host. Sinks here cover the common hosts:
//! `TracingSink` forwards to the `tracing` ecosystem, `BufferedSink` sheds
//! sub-error records under load, and `RotatingFileSink` writes the classic
//! `[LEVEL] message` log file with size-based rotation.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender, TrySendError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of engine events. Implementations must tolerate concurrent
/// calls; the engine never reads anything back.
pub trait EventSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

pub type SharedSink = Arc<dyn EventSink>;

/// Default sink: forwards each record to the `tracing` subscriber the host
/// installed (or nowhere, if none is installed).
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
    }
}

/// Discards everything. Useful in tests.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Decouples callers from a slow inner sink with a bounded queue drained by
/// a background thread. When the queue is full, debug/info/warning records
/// are dropped; error records block until there is room and are never lost.
pub struct BufferedSink {
    tx: Option<Sender<(LogLevel, String)>>,
    drain: Option<JoinHandle<()>>,
}

impl BufferedSink {
    pub fn new(inner: SharedSink, capacity: usize) -> Self {
        let (tx, rx) = bounded::<(LogLevel, String)>(capacity.max(1));
        let drain = std::thread::spawn(move || {
            for (level, message) in rx {
                inner.log(level, &message);
            }
        });
        Self {
            tx: Some(tx),
            drain: Some(drain),
        }
    }
}

impl EventSink for BufferedSink {
    fn log(&self, level: LogLevel, message: &str) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        if level == LogLevel::Error {
            let _ = tx.send((level, message.to_string()));
            return;
        }
        match tx.try_send((level, message.to_string())) {
            Ok(()) | Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl Drop for BufferedSink {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(drain) = self.drain.take() {
            let _ = drain.join();
        }
    }
}

const ROTATE_MAX_BYTES: u64 = 10 * 1024 * 1024;
const ROTATE_BACKUPS: u32 = 5;

/// Plain-text log file: `[LEVEL] message` per line, rotated at 10 MiB with
/// up to five numbered backups (`log.1` newest, `log.5` oldest).
pub struct RotatingFileSink {
    state: Mutex<FileSinkState>,
    path: PathBuf,
}

struct FileSinkState {
    file: Option<File>,
    written: u64,
}

impl RotatingFileSink {
    pub fn create(path: PathBuf) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            state: Mutex::new(FileSinkState {
                file: Some(file),
                written,
            }),
            path,
        })
    }

    fn backup_path(&self, index: u32) -> PathBuf {
        let mut os = self.path.clone().into_os_string();
        os.push(format!(".{index}"));
        PathBuf::from(os)
    }

    fn rotate(&self, state: &mut FileSinkState) -> std::io::Result<()> {
        state.file.take();
        let _ = fs::remove_file(self.backup_path(ROTATE_BACKUPS));
        for index in (1..ROTATE_BACKUPS).rev() {
            let _ = fs::rename(self.backup_path(index), self.backup_path(index + 1));
        }
        let _ = fs::rename(&self.path, self.backup_path(1));
        state.file = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        state.written = 0;
        Ok(())
    }
}

impl EventSink for RotatingFileSink {
    fn log(&self, level: LogLevel, message: &str) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.written >= ROTATE_MAX_BYTES && self.rotate(&mut state).is_err() {
            return;
        }
        let line = format!("[{level}] {message}\n");
        if let Some(file) = state.file.as_mut() {
            if file.write_all(line.as_bytes()).is_ok() {
                state.written += line.len() as u64;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        total: AtomicUsize,
        errors: AtomicUsize,
    }

    impl EventSink for CountingSink {
        fn log(&self, level: LogLevel, _message: &str) {
            self.total.fetch_add(1, Ordering::SeqCst);
            if level == LogLevel::Error {
                self.errors.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn buffered_sink_never_drops_errors() {
        let inner = Arc::new(CountingSink {
            total: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        });
        let sink = BufferedSink::new(inner.clone(), 4);
        for _ in 0..64 {
            sink.log(LogLevel::Error, "boom");
        }
        drop(sink);
        assert_eq!(inner.errors.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn file_sink_writes_level_prefixed_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("events.log");
        let sink = RotatingFileSink::create(path.clone()).unwrap();
        sink.log(LogLevel::Warning, "low disk");
        sink.log(LogLevel::Info, "done");
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "[WARNING] low disk\n[INFO] done\n");
    }
}
