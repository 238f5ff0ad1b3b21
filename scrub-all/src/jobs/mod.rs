// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;

use crate::config::{LaunchStrategy, ScrubConfig};
use crate::job_engine::context::ScrubContext;
use crate::job_engine::job::ScrubJob;
use crate::job_engine::scheduler::JobFactory;
use crate::mount_map::MountEntry;
use crate::service_control::control_plane::ControlPlane;
use crate::service_control::controller::ControllerTiming;

pub mod mount_scrub;
pub mod scrub_process_job;
pub mod scrub_service_job;

use mount_scrub::MountScrub;
use scrub_process_job::ScrubProcessJob;
use scrub_service_job::ScrubServiceJob;

/// Builds the per-mountpoint jobs of a run from the configured launch strategies.
pub fn job_factory(
    config: Arc<ScrubConfig>,
    plane: Arc<dyn ControlPlane>,
    ctx: Arc<ScrubContext>,
) -> JobFactory {
    let strategies = config.launch_strategies();
    let timing = ControllerTiming {
        poll_interval: config.poll_interval,
        backoff_unit: config.backoff_unit,
        backoff_cap: config.backoff_cap,
    };
    Box::new(move |entry: &MountEntry| -> Arc<dyn ScrubJob> {
        let runners = strategies
            .iter()
            .map(|strategy| -> Arc<dyn ScrubJob> {
                match strategy {
                    LaunchStrategy::Service => Arc::new(ScrubServiceJob::new(
                        plane.clone(),
                        config.unit_template.as_str(),
                        &entry.mountpoint,
                        timing,
                    )),
                    LaunchStrategy::Process => Arc::new(ScrubProcessJob::new(
                        &config.checker,
                        config.checker_args.clone(),
                        &entry.mountpoint,
                    )),
                }
            })
            .collect();
        Arc::new(MountScrub::new(&entry.mountpoint, runners, ctx.clone()))
    })
}
