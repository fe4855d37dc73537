//! Sync/async bridge: a single background worker owning a tokio event
//! loop, with bounded waits on both initialization and every submitted
//! operation.
//!
//! The VM thread submits one future at a time and blocks on a channel
//! with a deadline; the worker performs only network I/O and pure data
//! shaping, never touching VM state.

use crate::error::EvoError;
use std::future::Future;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long `initialize` waits for the worker loop to become runnable.
const INIT_DEADLINE: Duration = Duration::from_secs(5);

/// Sleep between readiness polls. Never busy-wait.
const INIT_POLL: Duration = Duration::from_millis(10);

/// Handle to the background event loop.
pub struct Bridge {
    handle: Option<tokio::runtime::Handle>,
    worker: Option<thread::JoinHandle<()>>,
    stop: Option<tokio::sync::oneshot::Sender<()>>,
}

impl Bridge {
    /// A bridge with no worker; call [`Bridge::initialize`] before use.
    pub fn new() -> Self {
        Self {
            handle: None,
            worker: None,
            stop: None,
        }
    }

    /// True once the worker loop is runnable.
    pub fn is_initialized(&self) -> bool {
        self.handle.is_some()
    }

    /// Start the worker thread and wait, bounded, for its event loop to
    /// come up. Idempotent.
    pub fn initialize(&mut self) -> Result<(), EvoError> {
        if self.handle.is_some() {
            return Ok(());
        }

        let slot: Arc<Mutex<Option<tokio::runtime::Handle>>> = Arc::new(Mutex::new(None));
        let worker_slot = Arc::clone(&slot);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let worker = thread::Builder::new()
            .name("sovereign-llm-bridge".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(error) => {
                        warn!(%error, "bridge runtime build failed");
                        return;
                    }
                };
                if let Ok(mut guard) = worker_slot.lock() {
                    *guard = Some(runtime.handle().clone());
                }
                // Park the loop until shutdown; spawned tasks run here.
                runtime.block_on(async {
                    let _ = stop_rx.await;
                });
            })
            .map_err(|e| EvoError::BridgeInitializationFailed(e.to_string()))?;

        let started = Instant::now();
        loop {
            if let Ok(guard) = slot.lock() {
                if let Some(handle) = guard.clone() {
                    self.handle = Some(handle);
                    break;
                }
            }
            if worker.is_finished() {
                return Err(EvoError::BridgeInitializationFailed(
                    "worker exited before its event loop started".to_string(),
                ));
            }
            if started.elapsed() >= INIT_DEADLINE {
                return Err(EvoError::BridgeInitializationFailed(format!(
                    "event loop not runnable within {INIT_DEADLINE:?}"
                )));
            }
            thread::sleep(INIT_POLL);
        }

        self.worker = Some(worker);
        self.stop = Some(stop_tx);
        debug!("bridge initialized");
        Ok(())
    }

    /// Submit a future to the worker and block for its result, bounded
    /// by `deadline`. A deadline overrun abandons the task (it may still
    /// complete on the worker; its result is discarded).
    pub fn run<F>(&self, future: F, deadline: Duration) -> Result<F::Output, EvoError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = self.handle.as_ref().ok_or(EvoError::NotInitialized)?;
        let (tx, rx) = std::sync::mpsc::channel();
        handle.spawn(async move {
            let _ = tx.send(future.await);
        });
        match rx.recv_timeout(deadline) {
            Ok(output) => Ok(output),
            Err(RecvTimeoutError::Timeout) => Err(EvoError::Timeout(deadline)),
            Err(RecvTimeoutError::Disconnected) => Err(EvoError::BridgeInitializationFailed(
                "worker stopped before completing the request".to_string(),
            )),
        }
    }

    /// Signal the loop to stop, join the worker, and drop the handle.
    /// Spawned-but-unfinished tasks are cancelled with the runtime.
    pub fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.handle = None;
        debug!("bridge shut down");
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}
