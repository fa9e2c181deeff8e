//! Signal-driven shutdown with a bounded grace period.
//!
//! The first signal raises the stop flag; the loop notices it at the next
//! cycle boundary and releases the camera through its guard. If the loop is
//! stuck inside a read and has not called `finish` once the grace period
//! runs out, or a second signal arrives, the exit action runs immediately.
//! For `sentineld` that is `process::exit`, which closes the device and
//! unmaps its buffers without waiting for the read.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Longer than any bounded source read, so a stalled read normally returns first.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

struct Inner {
    stop: AtomicBool,
    finished: AtomicBool,
    signals: AtomicU32,
    grace: Duration,
    force_exit: Box<dyn Fn() + Send + Sync>,
}

#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    pub fn new(grace: Duration, force_exit: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                stop: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                signals: AtomicU32::new(0),
                grace,
                force_exit: Box::new(force_exit),
            }),
        }
    }

    /// Flag handed to `Sentinel::run`.
    pub fn stop_flag(&self) -> &AtomicBool {
        &self.inner.stop
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stop.load(Ordering::SeqCst)
    }

    /// Called from the signal handler.
    pub fn trigger(&self) {
        let count = self.inner.signals.fetch_add(1, Ordering::SeqCst) + 1;
        if count > 1 {
            log::warn!("second shutdown signal, exiting without waiting for the camera");
            (self.inner.force_exit)();
            return;
        }

        log::info!(
            "shutdown requested, releasing camera (grace {}ms)",
            self.inner.grace.as_millis()
        );
        self.inner.stop.store(true, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        std::thread::spawn(move || {
            std::thread::sleep(inner.grace);
            if !inner.finished.load(Ordering::SeqCst) {
                log::warn!(
                    "camera still busy after {}ms, exiting",
                    inner.grace.as_millis()
                );
                (inner.force_exit)();
            }
        });
    }

    /// Mark the camera as released; disarms the grace watchdog.
    pub fn finish(&self) {
        self.inner.finished.store(true, Ordering::SeqCst);
    }
}
