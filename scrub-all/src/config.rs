// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::path::PathBuf;
use std::time::Duration;

/// Presence of this variable switches the tool into managed-service mode.
pub const SERVICE_MODE_ENV: &str = "SERVICE_MODE";

/// How a single mountpoint gets scrubbed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LaunchStrategy {
    /// Run the checker binary as a direct child process.
    Process,
    /// Delegate to a templated service unit of the service manager.
    Service,
}

/// Settings of one scheduling run. Built once in main() and handed to every
/// component by `Arc`.
#[derive(Debug, Clone)]
pub struct ScrubConfig {
    pub debug: bool,
    pub service_mode: bool,
    /// Only mountpoints of this filesystem type are scrubbed.
    pub fstype: String,
    pub checker: PathBuf,
    pub checker_args: Vec<String>,
    /// Template unit, e.g. `xfs_scrub@.service`.
    pub unit_template: String,
    pub systemctl: PathBuf,
    pub lsblk: PathBuf,
    pub poll_interval: Duration,
    /// One step of the Fibonacci backoff sequence.
    pub backoff_unit: Duration,
    /// Largest Fibonacci term (in `backoff_unit`s) still used for a retry.
    pub backoff_cap: u64,
    /// Grace period before exit in service mode, so the journal can still
    /// attribute late log lines to our pid.
    pub service_exit_delay: Duration,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            debug: false,
            service_mode: false,
            fstype: "xfs".to_string(),
            checker: PathBuf::from("xfs_scrub"),
            checker_args: vec!["-b".to_string()],
            unit_template: "xfs_scrub@.service".to_string(),
            systemctl: PathBuf::from("systemctl"),
            lsblk: PathBuf::from("lsblk"),
            poll_interval: Duration::from_secs(1),
            backoff_unit: Duration::from_secs(1),
            backoff_cap: 30,
            service_exit_delay: Duration::from_secs(2),
        }
    }
}

impl ScrubConfig {
    /// Defaults plus the bits that come from the command line and the
    /// process environment.
    pub fn from_env(debug: bool) -> Self {
        Self {
            debug,
            service_mode: std::env::var_os(SERVICE_MODE_ENV).is_some(),
            ..Self::default()
        }
    }

    /// The strategies tried, in order, for every mountpoint. Decided once per run.
    pub fn launch_strategies(&self) -> Vec<LaunchStrategy> {
        if self.service_mode {
            vec![LaunchStrategy::Service, LaunchStrategy::Process]
        } else {
            vec![LaunchStrategy::Process]
        }
    }
}

/// The process exit code for an aggregated scrub result. Service mode only
/// knows "clean" and "not clean".
pub fn final_exit_code(aggregate: i32, service_mode: bool) -> i32 {
    if service_mode && aggregate != 0 {
        1
    } else {
        aggregate
    }
}
