// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::job_engine::job::{JobStatus, ScrubJob};
use crate::service_control::control_plane::ControlPlane;
use crate::service_control::controller::{ControllerTiming, ServiceController};
use crate::service_control::unit_name;

#[derive(Debug, Default)]
struct RunState {
    stopped: bool,
    started: bool,
}

/// Scrubs a mountpoint by starting the matching instance of a template unit.
pub struct ScrubServiceJob {
    desc: String,
    plane: Arc<dyn ControlPlane>,
    template: String,
    mountpoint: PathBuf,
    timing: ControllerTiming,
    controller: Mutex<Option<Arc<ServiceController>>>,
    run_state: Mutex<RunState>,
}

impl ScrubServiceJob {
    pub fn new(
        plane: Arc<dyn ControlPlane>,
        template: impl Into<String>,
        mountpoint: &Path,
        timing: ControllerTiming,
    ) -> Self {
        Self {
            desc: format!("service scrub of {}", mountpoint.display()),
            plane,
            template: template.into(),
            mountpoint: mountpoint.to_path_buf(),
            timing,
            controller: Mutex::new(None),
            run_state: Mutex::new(RunState::default()),
        }
    }

    /// Resolves the unit and binds to it.
    fn bind(&self) -> Option<Arc<ServiceController>> {
        let unit = match unit_name::instance_for_path(&self.template, &self.mountpoint) {
            Ok(unit) => unit,
            Err(err) => {
                warn!("{err:#}");
                return None;
            }
        };
        match ServiceController::bind(self.plane.clone(), unit.as_str(), self.timing) {
            Ok(controller) => Some(Arc::new(controller)),
            Err(err) => {
                warn!("could not bind to {}: {}", unit, err);
                eprintln!("{err}");
                None
            }
        }
    }

    fn run_state(&self) -> MutexGuard<'_, RunState> {
        self.run_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `status`, or `Cancelled` if the job was stopped in the meantime.
    fn unless_stopped(&self, status: JobStatus) -> JobStatus {
        if self.run_state().stopped {
            JobStatus::Cancelled
        } else {
            status
        }
    }

    fn controller(&self) -> Option<Arc<ServiceController>> {
        self.controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ScrubJob for ScrubServiceJob {
    fn desc(&self) -> &str {
        &self.desc
    }

    fn start(&self) -> JobStatus {
        if self.run_state().stopped {
            debug!("{} was stopped before it started", self.desc);
            return JobStatus::Cancelled;
        }
        // no lock across the retrying calls, stop() only flags the job meanwhile
        let Some(controller) = self.bind() else {
            return self.unless_stopped(JobStatus::LaunchFailed);
        };
        *self.controller.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(controller.clone());
        if self.run_state().stopped {
            return JobStatus::Cancelled;
        }
        if controller.request_start().is_err() {
            return self.unless_stopped(JobStatus::LaunchFailed);
        }

        let stopped_meanwhile = {
            let mut run_state = self.run_state();
            run_state.started = true;
            run_state.stopped
        };
        if stopped_meanwhile {
            // stop() came while the start directive was in flight and left it to us
            debug!("stopping {} right after its start", controller.unit());
            controller.stop();
            return JobStatus::Cancelled;
        }
        let code = controller.wait();
        self.unless_stopped(JobStatus::Exited(code))
    }

    fn stop(&self) {
        let started = {
            let mut run_state = self.run_state();
            run_state.stopped = true;
            run_state.started
        };
        if !started {
            return;
        }
        if let Some(controller) = self.controller() {
            debug!("stopping {}", controller.unit());
            controller.stop();
        }
    }
}
