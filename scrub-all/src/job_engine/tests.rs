use crate::job_engine::closure_job::ClosureJob;
use crate::job_engine::context::{SchedulerPhase, ScrubContext};
use crate::job_engine::job::{JobStatus, ScrubJob};
use crate::job_engine::scheduler::Scheduler;
use crate::mount_map::{MountEntry, MountMap};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// What the fake jobs observed, shared between all of them.
#[derive(Default)]
struct Tracker {
    state: Mutex<TrackerState>,
    cvar: Condvar,
}

#[derive(Default)]
struct TrackerState {
    device_users: BTreeMap<String, usize>,
    running: usize,
    max_running: usize,
    conflicts: usize,
    events: Vec<String>,
}

impl Tracker {
    fn enter(&self, name: &str, devices: &BTreeSet<String>) {
        let mut state = self.state.lock().unwrap();
        for dev in devices {
            let users = state.device_users.entry(dev.clone()).or_default();
            *users += 1;
            if *users > 1 {
                state.conflicts += 1;
            }
        }
        state.running += 1;
        state.max_running = state.max_running.max(state.running);
        state.events.push(format!("start {name}"));
        self.cvar.notify_all();
    }

    fn leave(&self, name: &str, devices: &BTreeSet<String>) {
        let mut state = self.state.lock().unwrap();
        for dev in devices {
            *state.device_users.entry(dev.clone()).or_default() -= 1;
        }
        state.running -= 1;
        state.events.push(format!("end {name}"));
        self.cvar.notify_all();
    }

    /// Blocks until `n` jobs have run at the same time. False on timeout.
    fn wait_for_running(&self, n: usize, timeout: Duration) -> bool {
        let state = self.state.lock().unwrap();
        let (state, _) = self
            .cvar
            .wait_timeout_while(state, timeout, |s| s.max_running < n)
            .unwrap();
        state.max_running >= n
    }

    fn position(&self, event: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .events
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("{event} never happened: {:?}", state.events))
    }
}

const CLEAN: JobStatus = JobStatus::Exited(0);

fn ms(millis: u64) -> Hold {
    Hold::For(Duration::from_millis(millis))
}

enum Hold {
    For(Duration),
    /// Until `n` jobs run concurrently (or a timeout hits).
    UntilRunning(usize),
    /// Until stop() is called.
    UntilStopped,
}

struct FakeJob {
    name: String,
    devices: BTreeSet<String>,
    hold: Hold,
    status: JobStatus,
    tracker: Arc<Tracker>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    stopped: (Mutex<bool>, Condvar),
}

impl FakeJob {
    fn new(
        name: &str,
        devices: &[&str],
        hold: Hold,
        status: JobStatus,
        tracker: &Arc<Tracker>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            devices: devices.iter().map(|d| d.to_string()).collect(),
            hold,
            status,
            tracker: tracker.clone(),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            stopped: (Mutex::new(false), Condvar::new()),
        })
    }
}

impl ScrubJob for FakeJob {
    fn desc(&self) -> &str {
        &self.name
    }

    fn start(&self) -> JobStatus {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.tracker.enter(&self.name, &self.devices);
        match self.hold {
            Hold::For(duration) => thread::sleep(duration),
            Hold::UntilRunning(n) => {
                self.tracker.wait_for_running(n, Duration::from_secs(5));
            }
            Hold::UntilStopped => {
                let (lock, cvar) = &self.stopped;
                let stopped = lock.lock().unwrap();
                let _stopped = cvar
                    .wait_timeout_while(stopped, Duration::from_secs(10), |s| !*s)
                    .unwrap();
            }
        }
        self.tracker.leave(&self.name, &self.devices);
        self.status
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let (lock, cvar) = &self.stopped;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }
}

fn mounts_of(jobs: &[&Arc<FakeJob>]) -> MountMap {
    jobs.iter()
        .map(|job| (PathBuf::from(format!("/{}", job.name)), job.devices.clone()))
        .collect()
}

fn scheduler_for(ctx: &Arc<ScrubContext>, jobs: &[&Arc<FakeJob>]) -> Scheduler {
    let by_mount: HashMap<PathBuf, Arc<FakeJob>> = jobs
        .iter()
        .map(|job| (PathBuf::from(format!("/{}", job.name)), (*job).clone()))
        .collect();
    Scheduler::new(
        ctx.clone(),
        Box::new(move |entry: &MountEntry| -> Arc<dyn ScrubJob> {
            by_mount[&entry.mountpoint].clone()
        }),
    )
}

#[test]
fn test_disjoint_mounts_run_concurrently() {
    let tracker = Arc::new(Tracker::default());
    let jobs: Vec<_> = ["a", "b", "c", "d"]
        .iter()
        .map(|name| {
            let dev = format!("sd{name}");
            FakeJob::new(name, &[dev.as_str()], Hold::UntilRunning(4), CLEAN, &tracker)
        })
        .collect();
    let refs: Vec<_> = jobs.iter().collect();

    let ctx = ScrubContext::new();
    let started = Instant::now();
    let result = scheduler_for(&ctx, &refs).run(mounts_of(&refs));

    assert_eq!(result, 0);
    assert_eq!(tracker.state.lock().unwrap().max_running, 4);
    // nobody had to sit out the barrier timeout
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn test_shared_devices_never_overlap() {
    let tracker = Arc::new(Tracker::default());
    let hold = || Hold::For(Duration::from_millis(20));
    let a = FakeJob::new("a", &["sda"], hold(), JobStatus::Exited(0), &tracker);
    let b = FakeJob::new("b", &["sda", "sdb"], hold(), JobStatus::Exited(0), &tracker);
    let c = FakeJob::new("c", &["sdb"], hold(), JobStatus::Exited(0), &tracker);
    let d = FakeJob::new("d", &["sdc"], hold(), JobStatus::Exited(0), &tracker);
    let e = FakeJob::new("e", &["sdc", "sda"], hold(), JobStatus::Exited(0), &tracker);
    let f = FakeJob::new("f", &["sdb", "sdc"], hold(), JobStatus::Exited(0), &tracker);
    let refs = [&a, &b, &c, &d, &e, &f];

    let ctx = ScrubContext::new();
    scheduler_for(&ctx, &refs).run(mounts_of(&refs));

    let state = tracker.state.lock().unwrap();
    assert_eq!(state.conflicts, 0);
    for job in refs {
        assert_eq!(job.starts.load(Ordering::SeqCst), 1, "{} ran once", job.name);
    }
    assert!(ctx.running_devices().is_empty());
    assert_eq!(ctx.phase(), SchedulerPhase::Done);
}

#[test]
fn test_conflicting_mount_waits_for_its_device() {
    let tracker = Arc::new(Tracker::default());
    let a = FakeJob::new("a", &["d1"], ms(100), CLEAN, &tracker);
    let b = FakeJob::new("b", &["d2"], ms(300), CLEAN, &tracker);
    let c = FakeJob::new("c", &["d1", "d3"], ms(10), CLEAN, &tracker);
    let refs = [&a, &b, &c];

    let ctx = ScrubContext::new();
    scheduler_for(&ctx, &refs).run(mounts_of(&refs));

    // a and b start right away and overlap
    assert!(tracker.position("start b") < tracker.position("end a"));
    // c only after a gave d1 back, while b still runs
    assert!(tracker.position("start c") > tracker.position("end a"));
    assert!(tracker.position("start c") < tracker.position("end b"));
    assert_eq!(tracker.state.lock().unwrap().conflicts, 0);
}

#[test]
fn test_fully_overlapping_mounts_still_progress() {
    let tracker = Arc::new(Tracker::default());
    let hold = || Hold::For(Duration::from_millis(5));
    let a = FakeJob::new("a", &["sda"], hold(), JobStatus::Exited(0), &tracker);
    let b = FakeJob::new("b", &["sda"], hold(), JobStatus::Exited(0), &tracker);
    let c = FakeJob::new("c", &["sda"], hold(), JobStatus::Exited(0), &tracker);
    let refs = [&a, &b, &c];

    let ctx = ScrubContext::new();
    scheduler_for(&ctx, &refs).run(mounts_of(&refs));

    let state = tracker.state.lock().unwrap();
    assert_eq!(state.max_running, 1);
    assert_eq!(state.events.len(), 6);
}

#[test]
fn test_results_are_ored_together() {
    let tracker = Arc::new(Tracker::default());
    let hold = || Hold::For(Duration::from_millis(1));
    let a = FakeJob::new("a", &["sda"], hold(), JobStatus::Exited(1), &tracker);
    let b = FakeJob::new("b", &["sdb"], hold(), JobStatus::Exited(4), &tracker);
    let c = FakeJob::new("c", &["sdc"], hold(), JobStatus::Exited(0), &tracker);
    let d = FakeJob::new("d", &["sdd"], hold(), JobStatus::Exited(1), &tracker);
    let e = FakeJob::new("e", &["sde"], hold(), JobStatus::LaunchFailed, &tracker);
    let refs = [&a, &b, &c, &d, &e];

    let ctx = ScrubContext::new();
    assert_eq!(scheduler_for(&ctx, &refs).run(mounts_of(&refs)), 5);
}

#[test]
fn test_launch_failure_alone_keeps_result_clean() {
    let tracker = Arc::new(Tracker::default());
    let a = FakeJob::new("a", &["sda"], ms(0), JobStatus::LaunchFailed, &tracker);
    let ctx = ScrubContext::new();
    assert_eq!(scheduler_for(&ctx, &[&a]).run(mounts_of(&[&a])), 0);
}

#[test]
fn test_cancelled_jobs_leave_no_result() {
    let tracker = Arc::new(Tracker::default());
    let a = FakeJob::new("a", &["sda"], ms(1), JobStatus::Cancelled, &tracker);
    let b = FakeJob::new("b", &["sdb"], ms(1), JobStatus::Exited(8), &tracker);
    let refs = [&a, &b];

    let ctx = ScrubContext::new();
    assert_eq!(scheduler_for(&ctx, &refs).run(mounts_of(&refs)), 8);
}

#[test]
fn test_termination_stops_running_jobs_once() {
    let tracker = Arc::new(Tracker::default());
    let a = FakeJob::new("a", &["sda"], Hold::UntilStopped, JobStatus::Exited(0), &tracker);
    let b = FakeJob::new("b", &["sdb"], Hold::UntilStopped, JobStatus::Exited(0), &tracker);
    let c = FakeJob::new("c", &["sda"], Hold::UntilStopped, JobStatus::Exited(0), &tracker);
    let d = FakeJob::new("d", &["sdb", "sdc"], Hold::UntilStopped, CLEAN, &tracker);
    let refs = [&a, &b, &c, &d];

    let ctx = ScrubContext::new();
    let canceller = {
        let ctx = ctx.clone();
        let tracker = tracker.clone();
        thread::spawn(move || {
            assert!(tracker.wait_for_running(2, Duration::from_secs(5)));
            ctx.request_termination();
        })
    };
    let started = Instant::now();
    scheduler_for(&ctx, &refs).run(mounts_of(&refs));
    canceller.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(a.stops.load(Ordering::SeqCst), 1);
    assert_eq!(b.stops.load(Ordering::SeqCst), 1);
    // conflicting mounts were never admitted
    assert_eq!(c.starts.load(Ordering::SeqCst), 0);
    assert_eq!(d.starts.load(Ordering::SeqCst), 0);
    assert_eq!(c.stops.load(Ordering::SeqCst), 0);
    assert!(ctx.running_devices().is_empty());
    assert_eq!(ctx.phase(), SchedulerPhase::Done);
}

#[test]
fn test_termination_before_run_admits_nothing() {
    let tracker = Arc::new(Tracker::default());
    let a = FakeJob::new("a", &["sda"], Hold::For(Duration::ZERO), JobStatus::Exited(1), &tracker);
    let ctx = ScrubContext::new();
    ctx.request_termination();
    assert_eq!(scheduler_for(&ctx, &[&a]).run(mounts_of(&[&a])), 0);
    assert_eq!(a.starts.load(Ordering::SeqCst), 0);
}

#[test]
fn test_empty_map_finishes_immediately() {
    let ctx = ScrubContext::new();
    let scheduler = scheduler_for(&ctx, &[]);
    assert_eq!(scheduler.run(MountMap::new()), 0);
    assert_eq!(ctx.phase(), SchedulerPhase::Done);
}

#[test]
fn test_panicking_job_releases_its_devices() {
    let ctx = ScrubContext::new();
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_in_job = ran.clone();
    let scheduler = Scheduler::new(
        ctx.clone(),
        Box::new(move |entry: &MountEntry| -> Arc<dyn ScrubJob> {
            let ran = ran_in_job.clone();
            if entry.mountpoint == PathBuf::from("/a") {
                Arc::new(ClosureJob::new("boom", || panic!("checker exploded"), || {}))
            } else {
                Arc::new(ClosureJob::new(
                    "fine",
                    move || {
                        ran.fetch_add(1, Ordering::SeqCst);
                        JobStatus::Exited(2)
                    },
                    || {},
                ))
            }
        }),
    );
    let mut mounts = MountMap::new();
    mounts.insert(PathBuf::from("/a"), BTreeSet::from(["sda".to_string()]));
    mounts.insert(PathBuf::from("/b"), BTreeSet::from(["sda".to_string()]));

    assert_eq!(scheduler.run(mounts), 2);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert!(ctx.running_devices().is_empty());
}

#[test]
fn test_result_combination_is_order_independent() {
    let ctx = ScrubContext::new();
    for code in [0, 1, 1, 4, 0] {
        ctx.record(code);
    }
    let other = ScrubContext::new();
    for code in [4, 0, 1] {
        other.record(code);
    }
    assert_eq!(ctx.aggregate(), 5);
    assert_eq!(ctx.aggregate(), other.aggregate());
}
