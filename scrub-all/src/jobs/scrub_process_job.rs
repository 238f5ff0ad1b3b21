// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error};

use crate::job_engine::job::{JobStatus, ScrubJob};
use crate::process_tools;

#[derive(Debug, Default)]
struct ChildState {
    stopped: bool,
    pid: Option<u32>,
}

/// Runs the checker binary directly: `<checker> <args...> <mountpoint>`.
#[derive(Debug)]
pub struct ScrubProcessJob {
    desc: String,
    checker: PathBuf,
    args: Vec<String>,
    mountpoint: PathBuf,
    child: Mutex<ChildState>,
}

impl ScrubProcessJob {
    pub fn new(checker: impl Into<PathBuf>, args: Vec<String>, mountpoint: &Path) -> Self {
        let checker = checker.into();
        Self {
            desc: format!("{} {}", checker.display(), mountpoint.display()),
            checker,
            args,
            mountpoint: mountpoint.to_path_buf(),
            child: Mutex::new(ChildState::default()),
        }
    }

    fn child(&self) -> MutexGuard<'_, ChildState> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ScrubJob for ScrubProcessJob {
    fn desc(&self) -> &str {
        &self.desc
    }

    fn start(&self) -> JobStatus {
        let mut child = {
            let mut state = self.child();
            if state.stopped {
                debug!("{} was stopped before it started", self.desc);
                return JobStatus::Cancelled;
            }
            debug!(
                "running {} {} {}",
                self.checker.display(),
                self.args.join(" "),
                self.mountpoint.display()
            );
            let spawned = process_tools::command(&self.checker)
                .args(&self.args)
                .arg(&self.mountpoint)
                .spawn();
            match spawned {
                Ok(child) => {
                    state.pid = Some(child.id());
                    child
                }
                Err(err) => {
                    error!("could not run {}: {}", self.checker.display(), err);
                    eprintln!("{}: {}", self.checker.display(), err);
                    return JobStatus::LaunchFailed;
                }
            }
        };

        let status = child.wait();
        let stopped = {
            let mut state = self.child();
            state.pid = None;
            state.stopped
        };
        match status {
            // killed on our request: not a result of the checker
            Ok(status) if stopped && status.signal().is_some() => {
                debug!("{} was terminated", self.desc);
                JobStatus::Cancelled
            }
            Ok(status) => JobStatus::Exited(process_tools::exit_code(status)),
            Err(err) => {
                error!("waiting for {} failed: {}", self.desc, err);
                JobStatus::LaunchFailed
            }
        }
    }

    fn stop(&self) {
        let mut state = self.child();
        state.stopped = true;
        if let Some(pid) = state.pid {
            debug!("sending SIGTERM to {} ({})", self.desc, pid);
            process_tools::request_termination(pid);
        }
    }
}
