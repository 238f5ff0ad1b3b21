// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

/// Result of running one scrub job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// The job could not be launched at all (environment or binding failure).
    LaunchFailed,
    /// The job ran. 0 is clean, anything else means problems were found.
    Exited(i32),
    /// The job was stopped before it finished on its own. Carries no result.
    Cancelled,
}

impl JobStatus {
    /// -1 if the job did not finish on its own, the job's own code otherwise.
    pub fn code(&self) -> i32 {
        match self {
            JobStatus::LaunchFailed | JobStatus::Cancelled => -1,
            JobStatus::Exited(code) => *code,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

pub trait ScrubJob: Send + Sync + 'static {
    /// Free-form description, used for logging or debugging
    fn desc(&self) -> &str;

    /// Runs the job to completion. Blocks the calling thread.
    fn start(&self) -> JobStatus;

    /// Asks a running job to terminate. May be called from another thread
    /// while `start` blocks, and also before `start`, in which case `start`
    /// must not launch anything and returns `Cancelled`.
    fn stop(&self);
}

impl std::fmt::Debug for dyn ScrubJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrubJob")
            .field("desc", &self.desc())
            .finish()
    }
}
