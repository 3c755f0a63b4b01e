//! Write-back worker
//!
//! One background thread per chunk moves deadly entries onto the drive.
//!
//! - Wake: `try_send` on a bounded(1) channel. A wake that finds the slot
//!   full is dropped, so any number of overflow signals collapse into one
//!   pending cycle.
//! - Shutdown: dropping the sender. The worker finishes any pending cycle,
//!   sees the channel disconnect, and exits for good.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use tracing::{debug, trace, warn};

use crate::error::{Result, StoreError};
use crate::record::{Key, Record};

use super::Shared;

/// Handle to a running write-back thread.
/// Dropping it stops the thread and waits for it.
pub(crate) struct WriteBackWorker {
    wake: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl WriteBackWorker {
    pub fn spawn<K: Key, V: Record>(name: String, shared: Arc<Shared<K, V>>) -> Result<Self> {
        let (wake, signals) = channel::bounded(1);
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run(shared, signals))
            .map_err(|e| {
                StoreError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to spawn {}: {}", name, e),
                ))
            })?;

        Ok(Self {
            wake: Some(wake),
            thread: Some(thread),
        })
    }

    /// Request a cycle without blocking
    pub fn notify(&self) {
        if let Some(wake) = &self.wake {
            match wake.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => {}
                Err(TrySendError::Disconnected(())) => {
                    warn!("Write-back worker is no longer running");
                }
            }
        }
    }

    /// Stop the thread and wait for it
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.wake.take();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Write-back worker panicked");
            }
        }
    }
}

impl Drop for WriteBackWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<K: Key, V: Record>(shared: Arc<Shared<K, V>>, signals: Receiver<()>) {
    while signals.recv().is_ok() {
        shared.write_back();
    }
    debug!("Write-back worker stopped");
}

impl<K: Key, V: Record> Shared<K, V> {
    /// Flush a snapshot of the deadly tier and retire what was written.
    /// Returns the number of retired entries.
    pub(super) fn write_back(&self) -> usize {
        let snapshot = self.deadly.lock().snapshot();

        let mut written = Vec::with_capacity(snapshot.len());
        if !snapshot.is_empty() {
            let mut drive = self.drive.write();
            if drive.is_disposed() {
                return 0;
            }
            for (key, version, value) in snapshot {
                match drive.store(key.clone(), &value) {
                    Ok(()) => written.push((key, version)),
                    Err(e) => warn!(
                        path = %drive.path().display(),
                        key = ?key,
                        "Write-back failed, entry stays staged: {}",
                        e
                    ),
                }
            }
        }

        let retired = {
            let mut deadly = self.deadly.lock();
            written
                .iter()
                .filter(|(key, version)| deadly.retire(key, *version))
                .count()
        };

        self.write_back_cycles.fetch_add(1, Ordering::AcqRel);
        trace!(written = written.len(), retired, "Write-back cycle finished");
        retired
    }
}
