//! Search results: the stream handed to the caller and the processor that
//! feeds it.

use std::collections::HashSet;
use std::fs::Metadata;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;

use crate::cancel::CancellationToken;
use crate::events::{LogLevel, SharedSink};

/// A single matched file.
///
/// Exactly one of `hash` and `error` is meaningful: a result either carries
/// its fingerprint or the reason fingerprinting failed. The match itself
/// still surfaces either way.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub path: PathBuf,
    pub size: u64,
    pub mode: u32,
    pub modified: Option<SystemTime>,
    pub hash: Option<u64>,
    pub error: Option<String>,
}

impl SearchResult {
    pub(crate) fn from_metadata(path: PathBuf, meta: &Metadata) -> Self {
        Self {
            path,
            size: meta.len(),
            mode: mode_bits(meta),
            modified: meta.modified().ok(),
            hash: None,
            error: None,
        }
    }
}

#[cfg(unix)]
fn mode_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_bits(meta: &Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}

/// The consumer's end of a search: a bounded FIFO of results, closed
/// exactly once after the last producer finishes. Clones share the
/// underlying queue, so multiple consumers each see a disjoint subset.
#[derive(Debug, Clone)]
pub struct ResultStream {
    rx: Receiver<SearchResult>,
}

impl ResultStream {
    pub(crate) fn new(rx: Receiver<SearchResult>) -> Self {
        Self { rx }
    }

    /// Blocks for the next result; `None` once the stream is closed and
    /// drained.
    pub fn recv(&self) -> Option<SearchResult> {
        self.rx.recv().ok()
    }
}

impl Iterator for ResultStream {
    type Item = SearchResult;

    fn next(&mut self) -> Option<SearchResult> {
        self.recv()
    }
}

struct ProcessorState {
    tx: Option<Sender<SearchResult>>,
    seen: HashSet<u64>,
}

/// Forwards results into the stream, optionally dropping fingerprint
/// duplicates. Matcher workers call `add` concurrently; the dedup check and
/// sender lookup sit in a short critical section and the (possibly
/// blocking) send happens outside it.
pub(crate) struct ResultProcessor {
    state: Mutex<ProcessorState>,
    dedupe: bool,
    sink: SharedSink,
}

impl ResultProcessor {
    pub(crate) fn new(tx: Sender<SearchResult>, dedupe: bool, sink: SharedSink) -> Self {
        Self {
            state: Mutex::new(ProcessorState {
                tx: Some(tx),
                seen: HashSet::new(),
            }),
            dedupe,
            sink,
        }
    }

    pub(crate) fn add(&self, result: SearchResult, cancel: &CancellationToken) {
        let tx = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            let Some(tx) = state.tx.clone() else {
                self.sink.log(
                    LogLevel::Error,
                    &format!("result dropped after close: {}", result.path.display()),
                );
                return;
            };
            if self.dedupe {
                if let Some(hash) = result.hash {
                    if !state.seen.insert(hash) {
                        return;
                    }
                }
            }
            tx
        };

        crossbeam_channel::select! {
            send(tx, result) -> _ => {},
            recv(cancel.channel()) -> _ => {},
        }
    }

    /// Closes the stream. Idempotent; later `add` calls are defended no-ops.
    pub(crate) fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.tx.take();
        }
    }
}
