//! Background retention sweeper.
//!
//! A worker thread that owns its own connection and runs the retention
//! policy on request, and periodically when the policy sets an interval.
//! Requests go through a bounded channel of capacity one, so a burst of
//! requests while a sweep is pending collapses into that one sweep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rusqlite::Connection;

use crate::clock::Clock;

use super::retention::{sweep_quietly, RetentionPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepRequest {
    Sweep,
    Shutdown,
}

/// Cheap, clonable way to ask the worker for a sweep.
#[derive(Debug, Clone)]
pub struct SweepRequester {
    tx: SyncSender<SweepRequest>,
}

impl SweepRequester {
    /// Never blocks. Returns false when the worker has stopped.
    pub fn request_sweep(&self) -> bool {
        match self.tx.try_send(SweepRequest::Sweep) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Sweep requested after sweeper stopped");
                false
            }
        }
    }
}

/// Handle for the background sweeper thread.
///
/// Shuts the worker down on `shutdown()` or on drop. Requests already
/// queued are processed before the worker exits.
pub struct SweeperHandle {
    requester: SweepRequester,
    sweeps_completed: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn requester(&self) -> SweepRequester {
        self.requester.clone()
    }

    /// Number of sweeps the worker has finished, successful or not.
    pub fn sweeps_completed(&self) -> u64 {
        self.sweeps_completed.load(Ordering::Acquire)
    }

    pub fn shutdown(&mut self) {
        if let Some(h) = self.handle.take() {
            let _ = self.requester.tx.send(SweepRequest::Shutdown);
            if h.join().is_err() {
                tracing::error!("Audit sweeper thread panicked");
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start the sweeper on its own thread. `conn` must point at the same
/// database the audit log writes to.
pub fn start_sweeper(
    conn: Connection,
    policy: RetentionPolicy,
    clock: Arc<dyn Clock>,
) -> SweeperHandle {
    let (tx, rx) = mpsc::sync_channel(1);
    let sweeps_completed = Arc::new(AtomicU64::new(0));
    let counter = sweeps_completed.clone();
    let interval = policy.sweep_interval_secs.map(Duration::from_secs);

    let handle = std::thread::spawn(move || {
        tracing::info!(interval_secs = ?policy.sweep_interval_secs, "Audit sweeper started");
        loop {
            let next = match interval {
                Some(period) => rx.recv_timeout(period),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match next {
                Ok(SweepRequest::Sweep) | Err(RecvTimeoutError::Timeout) => {
                    sweep_quietly(&conn, &policy, clock.now());
                    counter.fetch_add(1, Ordering::Release);
                }
                Ok(SweepRequest::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::info!("Audit sweeper shutting down");
    });

    SweeperHandle {
        requester: SweepRequester { tx },
        sweeps_completed,
        handle: Some(handle),
    }
}
