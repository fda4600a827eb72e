//! Reconcile slots.
//!
//! Each in-flight reconcile holds a [`WorkerPermit`]. The controller acquires
//! one before dequeuing a key and reports the outcome on it when the
//! reconcile finishes. Closing the pool fails every pending acquire, which is
//! how shutdown stops handing out work.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{AuthzError, ErrorCode, Result};

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub max_workers: usize,
    /// How long the controller waits for a free slot before requeueing.
    pub acquire_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 6,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    succeeded: AtomicU64,
    failed: AtomicU64,
    aborted: AtomicU64,
    acquire_timeouts: AtomicU64,
}

impl Counters {
    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::Relaxed);
        gauge!("dbaas_authz_reconciles_in_flight").set(now as f64);
    }

    fn leave(&self, outcome: &AtomicU64) {
        outcome.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_sub(1, Ordering::Relaxed) - 1;
        gauge!("dbaas_authz_reconciles_in_flight").set(now as f64);
    }
}

/// One reconcile slot. Dropping it unmarked counts the reconcile as aborted.
pub struct WorkerPermit {
    _slot: OwnedSemaphorePermit,
    counters: Arc<Counters>,
    reported: bool,
}

impl WorkerPermit {
    pub fn mark_success(mut self) {
        self.reported = true;
        self.counters.leave(&self.counters.succeeded);
    }

    pub fn mark_failure(mut self) {
        self.reported = true;
        self.counters.leave(&self.counters.failed);
    }
}

impl Drop for WorkerPermit {
    fn drop(&mut self) {
        if !self.reported {
            self.counters.leave(&self.counters.aborted);
        }
    }
}

/// Bounds how many reconciles run at once.
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    max_workers: usize,
    acquire_timeout: Duration,
    counters: Arc<Counters>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        tracing::debug!(max_workers = config.max_workers, "Reconcile slots ready");
        Self {
            slots: Arc::new(Semaphore::new(config.max_workers)),
            max_workers: config.max_workers,
            acquire_timeout: config.acquire_timeout,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn available_permits(&self) -> usize {
        self.slots.available_permits()
    }

    /// Wait for a free slot.
    ///
    /// Fails with `ShutdownInProgress` once the pool is closed and with an
    /// internal error after `acquire_timeout`.
    pub async fn acquire(&self) -> Result<WorkerPermit> {
        let slot = match tokio::time::timeout(
            self.acquire_timeout,
            self.slots.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(slot)) => slot,
            Ok(Err(_)) => {
                return Err(AuthzError::new(
                    ErrorCode::ShutdownInProgress,
                    "Reconcile slots are closed",
                ))
            }
            Err(_) => {
                self.counters.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    timeout_ms = self.acquire_timeout.as_millis() as u64,
                    in_flight = self.counters.in_flight.load(Ordering::Relaxed),
                    "No reconcile slot freed up in time"
                );
                return Err(AuthzError::internal(format!(
                    "no reconcile slot within {:?}",
                    self.acquire_timeout
                )));
            }
        };

        self.counters.enter();
        Ok(WorkerPermit {
            _slot: slot,
            counters: self.counters.clone(),
            reported: false,
        })
    }

    /// Fail pending and future acquires.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn stats(&self) -> WorkerPoolStats {
        let c = &self.counters;
        WorkerPoolStats {
            max_workers: self.max_workers,
            in_flight: c.in_flight.load(Ordering::Relaxed),
            peak_in_flight: c.peak_in_flight.load(Ordering::Relaxed),
            succeeded: c.succeeded.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            aborted: c.aborted.load(Ordering::Relaxed),
            acquire_timeouts: c.acquire_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Reconcile counts since the pool was created.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerPoolStats {
    pub max_workers: usize,
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub succeeded: u64,
    pub failed: u64,
    /// Permits dropped without an outcome, e.g. reconciles aborted at shutdown.
    pub aborted: u64,
    pub acquire_timeouts: u64,
}
