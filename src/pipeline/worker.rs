//! Worker threads of the anonymization pool
//!
//! Each worker is spawned once, parks at the barrier immediately, and
//! then loops: read the published block token, anonymize its mod-N slice
//! of the records, park again. A `None` token terminates the loop.
//! Workers allocate nothing on the hot path and keep no state between
//! blocks beyond their id and counters.
//!
//! Corruption found while scanning is recorded in the shared poison slot
//! and the worker parks normally; the controller surfaces the error after
//! the completion rendezvous.

use crate::anon::Anonymizer;
use crate::error::{CorruptError, WorkerError};
use crate::pipeline::barrier::Barrier;
use crate::pipeline::partition::{self, SharedBlock};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Work slot owned by the controller, shared with exactly one worker
///
/// The controller publishes into the slot only while the worker is parked
/// at the barrier; the worker reads it only after a release. The mutex is
/// therefore never contended.
#[derive(Default)]
pub struct WorkSlot {
    block: Mutex<Option<SharedBlock>>,
}

impl WorkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, block: Option<SharedBlock>) {
        *self.block.lock() = block;
    }

    pub fn current(&self) -> Option<SharedBlock> {
        *self.block.lock()
    }
}

/// First corruption error observed by any worker
#[derive(Default)]
pub struct Poison {
    slot: Mutex<Option<CorruptError>>,
}

impl Poison {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error; the first one wins
    pub fn set(&self, err: CorruptError) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub fn take(&self) -> Option<CorruptError> {
        self.slot.lock().take()
    }
}

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// V3 records anonymized
    pub anonymized: AtomicU64,

    /// Known non-flow records skipped
    pub passed: AtomicU64,

    /// Unknown record types skipped
    pub unknown: AtomicU64,
}

/// A worker thread bound to one partition index
pub struct Worker {
    id: usize,
    handle: Option<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a worker that parks at `barrier` and serves `slot`
    pub fn spawn(
        id: usize,
        num_workers: usize,
        slot: Arc<WorkSlot>,
        barrier: Arc<Barrier>,
        anon: Arc<Anonymizer>,
        poison: Arc<Poison>,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("anon-{}", id))
            .spawn(move || {
                worker_loop(id, num_workers, slot, barrier, anon, poison, stats_clone)
            })
            .map_err(|e| WorkerError::SpawnFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Shared handle to this worker's counters, usable after `join`
    pub fn shared_stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| WorkerError::Panicked { id: self.id })?;
        }
        Ok(())
    }
}

fn worker_loop(
    id: usize,
    num_workers: usize,
    slot: Arc<WorkSlot>,
    barrier: Arc<Barrier>,
    anon: Arc<Anonymizer>,
    poison: Arc<Poison>,
    stats: Arc<WorkerStats>,
) {
    debug!(worker = id, "Worker starting");

    // park right after spawn, announcing readiness
    if !barrier.worker_wait() {
        return;
    }

    loop {
        let Some(block) = slot.current() else {
            break;
        };

        match partition::process_block(block, id as u32, num_workers as u32, &anon) {
            Ok(counts) => {
                stats.anonymized.fetch_add(counts.anonymized, Ordering::Relaxed);
                stats.passed.fetch_add(counts.passed, Ordering::Relaxed);
                stats.unknown.fetch_add(counts.unknown, Ordering::Relaxed);
            }
            Err(err) => {
                error!(worker = id, error = %err, "Corrupt data block");
                poison.set(err);
            }
        }

        // wait in barrier for the next block
        if !barrier.worker_wait() {
            return;
        }
    }

    debug!(
        worker = id,
        records = stats.anonymized.load(Ordering::Relaxed),
        "Worker done"
    );
}
