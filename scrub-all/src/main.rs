// SPDX-License-Identifier: MIT
// scrub_all: scrub every mounted filesystem of one type
//
// - Finds the mounted filesystems and the disks behind them (lsblk).
// - Runs one checker per filesystem, in parallel unless two share a disk.
// - In service mode the checker runs as a templated systemd unit.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;
use std::thread;

use clap::Parser;
use log::{debug, info};

use scrub_all::cancellation;
use scrub_all::config::{final_exit_code, ScrubConfig};
use scrub_all::job_engine::context::ScrubContext;
use scrub_all::job_engine::scheduler::Scheduler;
use scrub_all::jobs::job_factory;
use scrub_all::mount_map;
use scrub_all::service_control::control_plane::SystemctlControlPlane;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Print diagnostic output
    #[arg(short, long)]
    debug: bool,
}

fn main() -> std::io::Result<()> {
    let args = Args::parse();
    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = Arc::new(ScrubConfig::from_env(args.debug));
    debug!("{:?}", config);

    let ctx = ScrubContext::new();
    // before any other thread exists, so every thread inherits the mask
    cancellation::spawn_signal_watcher(ctx.clone())?;

    let mounts = mount_map::build_mount_map(&config.lsblk, &config.fstype);
    info!("found {} {} filesystem(s)", mounts.len(), config.fstype);

    let plane = Arc::new(SystemctlControlPlane::new(&config.systemctl));
    let scheduler = Scheduler::new(ctx.clone(), job_factory(config.clone(), plane, ctx));
    let aggregate = scheduler.run(mounts);

    if config.service_mode {
        // give the journal a chance to attribute our last lines to this pid
        thread::sleep(config.service_exit_delay);
    }
    std::process::exit(final_exit_code(aggregate, config.service_mode));
}
