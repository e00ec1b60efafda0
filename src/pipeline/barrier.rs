//! Two-sided fork/join barrier
//!
//! Rendezvous between one controller and a fixed pool of workers:
//!
//! ```text
//! controller                    workers
//! ──────────                    ───────
//! controller_wait()  ◄───────── worker_wait()  (all parked)
//! publish work slots
//! release()          ─────────► (workers run)
//! controller_wait()  ◄───────── worker_wait()  (block done)
//! consume result
//! ```
//!
//! The controller only touches the work slots while every worker is
//! parked, and workers only read them after a release; the barrier's
//! mutex supplies the happens-before edges in both directions, so the
//! slots need no further synchronization.
//!
//! A generation counter makes worker wakeups robust against spurious
//! condition-variable wakeups. `abort` unparks everyone permanently and
//! exists so a partially-spawned pool can be torn down.

use parking_lot::{Condvar, Mutex};

struct BarrierState {
    waiting: usize,
    generation: u64,
    aborted: bool,
}

/// Controller/worker rendezvous point
pub struct Barrier {
    state: Mutex<BarrierState>,
    worker_cv: Condvar,
    controller_cv: Condvar,
    target: usize,
}

impl Barrier {
    /// Create a barrier expecting `target` workers; `target` must be > 0
    pub fn new(target: usize) -> Self {
        assert!(target > 0, "barrier needs at least one worker");
        Self {
            state: Mutex::new(BarrierState {
                waiting: 0,
                generation: 0,
                aborted: false,
            }),
            worker_cv: Condvar::new(),
            controller_cv: Condvar::new(),
            target,
        }
    }

    /// Park the calling worker until the controller releases the pool.
    /// Returns `false` if the barrier was aborted; the worker must exit.
    pub fn worker_wait(&self) -> bool {
        let mut state = self.state.lock();
        state.waiting += 1;
        if state.waiting >= self.target {
            self.controller_cv.notify_one();
        }

        let generation = state.generation;
        while state.generation == generation && !state.aborted {
            self.worker_cv.wait(&mut state);
        }
        !state.aborted
    }

    /// Block the controller until every worker is parked
    pub fn controller_wait(&self) {
        let mut state = self.state.lock();
        while state.waiting < self.target {
            self.controller_cv.wait(&mut state);
        }
    }

    /// Unpark all workers for the next round.
    /// Precondition: all workers parked (i.e. after `controller_wait`).
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.waiting = 0;
        state.generation = state.generation.wrapping_add(1);
        self.worker_cv.notify_all();
    }

    /// Permanently wake every current and future waiter; used to tear
    /// down a pool that failed to spawn completely
    pub fn abort(&self) {
        let mut state = self.state.lock();
        state.aborted = true;
        self.worker_cv.notify_all();
    }
}
