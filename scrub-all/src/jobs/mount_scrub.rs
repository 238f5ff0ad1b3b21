// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::job_engine::context::ScrubContext;
use crate::job_engine::job::{JobStatus, ScrubJob};

/// The job registered with the scheduler for one mountpoint. Tries its
/// runners in order until one of them actually runs.
pub struct MountScrub {
    desc: String,
    mountpoint: PathBuf,
    runners: Vec<Arc<dyn ScrubJob>>,
    ctx: Arc<ScrubContext>,
}

impl MountScrub {
    pub fn new(
        mountpoint: &Path,
        runners: Vec<Arc<dyn ScrubJob>>,
        ctx: Arc<ScrubContext>,
    ) -> Self {
        Self {
            desc: format!("scrub of {}", mountpoint.display()),
            mountpoint: mountpoint.to_path_buf(),
            runners,
            ctx,
        }
    }
}

impl ScrubJob for MountScrub {
    fn desc(&self) -> &str {
        &self.desc
    }

    fn start(&self) -> JobStatus {
        println!("Scrubbing {}...", self.mountpoint.display());
        let _ = std::io::stdout().flush();
        for runner in &self.runners {
            if self.ctx.is_terminating() {
                debug!("not trying {}, termination requested", runner.desc());
                return JobStatus::Cancelled;
            }
            match runner.start() {
                JobStatus::Exited(code) => {
                    println!("Scrubbing {} done, (err={})", self.mountpoint.display(), code);
                    let _ = std::io::stdout().flush();
                    return JobStatus::Exited(code);
                }
                JobStatus::LaunchFailed => {
                    debug!("{} could not be launched", runner.desc());
                }
                JobStatus::Cancelled => return JobStatus::Cancelled,
            }
        }
        eprintln!("Unable to start scrub tool for {}.", self.mountpoint.display());
        JobStatus::LaunchFailed
    }

    /// Stops the active runner and keeps the remaining ones from launching.
    fn stop(&self) {
        for runner in &self.runners {
            runner.stop();
        }
    }
}
