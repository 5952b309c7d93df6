//! Cancellation token shared by walkers, matchers and processors.
//!
//! A token is a broadcast "stop" signal: once tripped it stays tripped for
//! the rest of its life. It is observable two ways: as an atomic flag for
//! tight loops, and as a channel that becomes ready on trip so blocking
//! sends and receives can select against it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};

#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
    rx: Receiver<()>,
}

#[derive(Debug)]
struct Inner {
    tripped: AtomicBool,
    // Dropped on trip, which disconnects every receiver clone at once.
    tx: Mutex<Option<Sender<()>>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded::<()>(0);
        Self {
            inner: Arc::new(Inner {
                tripped: AtomicBool::new(false),
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        }
    }

    /// Trips the token. Idempotent; there is no way back.
    pub fn cancel(&self) {
        self.inner.tripped.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = self.inner.tx.lock() {
            guard.take();
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.tripped.load(Ordering::Relaxed)
    }

    /// A receiver that stays silent until the token trips, then reports
    /// disconnected. Suitable as a `select!` arm guarding a blocking send.
    #[inline]
    pub fn channel(&self) -> &Receiver<()> {
        &self.rx
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
