// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::job_engine::job::ScrubJob;

pub type JobId = u64;

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Pending map built, nothing launched yet.
    Idle,
    Admitting,
    /// Jobs in flight and mountpoints still pending.
    Running,
    /// Nothing pending anymore, waiting for the last jobs.
    Draining,
    Aborting,
    Done,
}

/// Everything guarded by the scheduler lock.
#[derive(Debug)]
pub struct SchedulerState {
    /// Devices claimed by in-flight jobs.
    pub running_devices: BTreeSet<String>,
    /// One stop handle per in-flight job.
    pub(crate) kill_callbacks: HashMap<JobId, Arc<dyn ScrubJob>>,
    pub phase: SchedulerPhase,
}

impl SchedulerState {
    pub fn in_flight(&self) -> usize {
        self.kill_callbacks.len()
    }
}

/// State shared between the scheduler thread, the job threads and the
/// cancellation watcher for the duration of one run.
#[derive(Debug)]
pub struct ScrubContext {
    terminate: AtomicBool,
    aggregate: AtomicI32,
    sync_state: (Mutex<SchedulerState>, Condvar),
}

impl ScrubContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            terminate: AtomicBool::new(false),
            aggregate: AtomicI32::new(0),
            sync_state: (
                Mutex::new(SchedulerState {
                    running_devices: BTreeSet::new(),
                    kill_callbacks: HashMap::new(),
                    phase: SchedulerPhase::Idle,
                }),
                Condvar::new(),
            ),
        })
    }

    /// Sets the termination flag and wakes the scheduler, even if no job finished.
    pub fn request_termination(&self) {
        if !self.terminate.swap(true, Ordering::SeqCst) {
            debug!("termination requested");
        }
        // taking the lock orders the flag before a scheduler that is about to wait
        let _state = self.lock();
        self.notify();
    }

    pub fn is_terminating(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    /// Folds one job result into the aggregate.
    pub fn record(&self, code: i32) {
        self.aggregate.fetch_or(code, Ordering::SeqCst);
    }

    pub fn aggregate(&self) -> i32 {
        self.aggregate.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.lock().phase
    }

    pub fn running_devices(&self) -> BTreeSet<String> {
        self.lock().running_devices.clone()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        // a panicking job thread must not wedge the scheduler
        self.sync_state
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wait<'a>(
        &self,
        guard: MutexGuard<'a, SchedulerState>,
    ) -> MutexGuard<'a, SchedulerState> {
        self.sync_state
            .1
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notify(&self) {
        self.sync_state.1.notify_all();
    }
}
