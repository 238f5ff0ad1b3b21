// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Arc, MutexGuard};
use std::thread::{self, JoinHandle};

use log::{debug, error, info};

use crate::job_engine::context::{JobId, SchedulerPhase, SchedulerState, ScrubContext};
use crate::job_engine::job::{JobStatus, ScrubJob};
use crate::mount_map::{MountEntry, MountMap};

/// Builds the job for one mountpoint. Called with the scheduler lock held.
pub type JobFactory = Box<dyn Fn(&MountEntry) -> Arc<dyn ScrubJob> + Send + Sync>;

/// Runs one job per mountpoint, as many at once as possible, while never
/// letting two running jobs share a device.
pub struct Scheduler {
    ctx: Arc<ScrubContext>,
    factory: JobFactory,
}

impl Scheduler {
    pub fn new(ctx: Arc<ScrubContext>, factory: JobFactory) -> Self {
        Self { ctx, factory }
    }

    pub fn context(&self) -> &Arc<ScrubContext> {
        &self.ctx
    }

    /// Schedules every mountpoint and blocks until all jobs are done or the
    /// run was aborted. Returns the aggregated result.
    pub fn run(&self, mut pending: MountMap) -> i32 {
        let mut threads: Vec<JoinHandle<()>> = Vec::new();
        let mut next_id: JobId = 0;

        let mut state = self.ctx.lock();
        loop {
            if self.ctx.is_terminating() {
                state = self.abort(state);
                break;
            }
            if pending.is_empty() && state.in_flight() == 0 {
                break;
            }

            if !pending.is_empty() {
                set_phase(&mut state, SchedulerPhase::Admitting);

                // nothing runs, so take anything to guarantee progress
                if state.in_flight() == 0 && !self.ctx.is_terminating() {
                    if let Some((mountpoint, devices)) = pending.pop_first() {
                        let entry = MountEntry {
                            mountpoint,
                            devices,
                        };
                        threads.extend(self.admit(&mut state, entry, &mut next_id));
                    }
                }

                let admissible: Vec<_> = pending.keys().cloned().collect();
                for mountpoint in admissible {
                    if self.ctx.is_terminating() {
                        break;
                    }
                    let conflict = pending[&mountpoint]
                        .iter()
                        .any(|dev| state.running_devices.contains(dev));
                    if conflict {
                        continue;
                    }
                    if let Some(devices) = pending.remove(&mountpoint) {
                        let entry = MountEntry {
                            mountpoint,
                            devices,
                        };
                        threads.extend(self.admit(&mut state, entry, &mut next_id));
                    }
                }
            }

            if pending.is_empty() {
                set_phase(&mut state, SchedulerPhase::Draining);
            } else {
                set_phase(&mut state, SchedulerPhase::Running);
            }
            if state.in_flight() == 0 {
                // every admission failed to spawn, go around again
                continue;
            }
            // spurious or batched wakeups are fine, the next pass re-scans
            state = self.ctx.wait(state);
        }
        set_phase(&mut state, SchedulerPhase::Done);
        drop(state);

        for handle in threads {
            if handle.join().is_err() {
                error!("a scrub thread panicked");
            }
        }
        self.ctx.aggregate()
    }

    /// Claims the devices, registers the stop handle and starts the job thread.
    fn admit(
        &self,
        state: &mut SchedulerState,
        entry: MountEntry,
        next_id: &mut JobId,
    ) -> Option<JoinHandle<()>> {
        let id = *next_id;
        *next_id += 1;

        let job = (self.factory)(&entry);
        debug!(
            "admitting {} on {:?} as job {}",
            entry.mountpoint.display(),
            entry.devices,
            id
        );
        state.running_devices.extend(entry.devices.iter().cloned());
        state.kill_callbacks.insert(id, job.clone());

        let ctx = self.ctx.clone();
        let mountpoint = entry.mountpoint.clone();
        let devices = entry.devices.clone();
        let spawned = thread::Builder::new()
            .name(format!("scrub-{id}"))
            .spawn(move || run_job(ctx, id, entry, job));
        match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                error!(
                    "could not start a thread for {}: {}",
                    mountpoint.display(),
                    err
                );
                eprintln!("Unable to start scrub tool for {}.", mountpoint.display());
                // the thread never ran, so undo the claim here
                state.kill_callbacks.remove(&id);
                release_devices(state, &devices);
                None
            }
        }
    }

    /// Stops every job registered right now and waits for all of them.
    fn abort<'a>(
        &'a self,
        mut state: MutexGuard<'a, SchedulerState>,
    ) -> MutexGuard<'a, SchedulerState> {
        set_phase(&mut state, SchedulerPhase::Aborting);
        println!("Terminating...");
        let victims: Vec<Arc<dyn ScrubJob>> = state.kill_callbacks.values().cloned().collect();
        // stopping may block on the job, which needs the lock to finish
        drop(state);
        for job in &victims {
            info!("stopping {}", job.desc());
            job.stop();
        }
        let mut state = self.ctx.lock();
        while state.in_flight() > 0 {
            state = self.ctx.wait(state);
        }
        state
    }
}

fn set_phase(state: &mut SchedulerState, phase: SchedulerPhase) {
    if state.phase != phase {
        debug!("scheduler: {:?} -> {:?}", state.phase, phase);
        state.phase = phase;
    }
}

/// Body of a job thread.
fn run_job(ctx: Arc<ScrubContext>, id: JobId, entry: MountEntry, job: Arc<dyn ScrubJob>) {
    // releases the claim even if the job panics
    let _completion = Completion {
        ctx: ctx.clone(),
        id,
        entry: &entry,
    };
    if ctx.is_terminating() {
        debug!("not starting {}, termination requested", job.desc());
        return;
    }
    match job.start() {
        JobStatus::Exited(code) => ctx.record(code),
        JobStatus::LaunchFailed => {
            debug!("{} could not be launched", job.desc());
        }
        JobStatus::Cancelled => {
            debug!("{} was cancelled", job.desc());
        }
    }
}

struct Completion<'a> {
    ctx: Arc<ScrubContext>,
    id: JobId,
    entry: &'a MountEntry,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        let mut state = self.ctx.lock();
        release_devices(&mut state, &self.entry.devices);
        state.kill_callbacks.remove(&self.id);
        self.ctx.notify();
    }
}

fn release_devices<'a>(
    state: &mut SchedulerState,
    devices: impl IntoIterator<Item = &'a String>,
) {
    for dev in devices {
        state.running_devices.remove(dev);
    }
}
