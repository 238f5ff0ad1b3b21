// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use crate::job_engine::job::{JobStatus, ScrubJob};

type StartFn = Box<dyn Fn() -> JobStatus + Send + Sync + 'static>;
type StopFn = Box<dyn Fn() + Send + Sync + 'static>;

/// A job assembled from two closures, for ad-hoc jobs in tests.
pub struct ClosureJob {
    desc: String,
    start_fn: StartFn,
    stop_fn: StopFn,
}

impl ClosureJob {
    pub fn new(
        desc: impl Into<String>,
        start_fn: impl Fn() -> JobStatus + Send + Sync + 'static,
        stop_fn: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            desc: desc.into(),
            start_fn: Box::new(start_fn),
            stop_fn: Box::new(stop_fn),
        }
    }
}

impl ScrubJob for ClosureJob {
    fn desc(&self) -> &str {
        &self.desc
    }

    fn start(&self) -> JobStatus {
        (self.start_fn)()
    }

    fn stop(&self) {
        (self.stop_fn)()
    }
}
