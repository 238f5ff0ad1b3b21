// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;
use thiserror::Error;

use crate::process_tools;

#[derive(Debug, Error)]
pub enum ControlError {
    /// Talking to the service manager failed; rebinding and retrying may help.
    #[error("service manager communication failed: {0}")]
    Transient(String),
    #[error("unit {0} does not exist")]
    UnitNotFound(String),
    #[error("could not invoke {binary}: {source}")]
    Unavailable {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ControlError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ControlError::Transient(_))
    }
}

/// How a start/stop directive is queued relative to pending jobs of the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    Replace,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Replace => "replace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveState {
    Active,
    Reloading,
    Inactive,
    Failed,
    Activating,
    Deactivating,
    /// Anything newer service managers report that we do not know about.
    Other(String),
}

impl ActiveState {
    /// The unit is not running anymore.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActiveState::Inactive | ActiveState::Failed)
    }
}

impl FromStr for ActiveState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "active" => ActiveState::Active,
            "reloading" => ActiveState::Reloading,
            "inactive" => ActiveState::Inactive,
            "failed" => ActiveState::Failed,
            "activating" => ActiveState::Activating,
            "deactivating" => ActiveState::Deactivating,
            other => ActiveState::Other(other.to_string()),
        })
    }
}

/// Connection to a service manager.
pub trait ControlPlane: Send + Sync {
    /// Resolves a unit by name and binds to it.
    fn load_unit(&self, unit: &str) -> Result<Box<dyn UnitHandle>, ControlError>;
}

/// Binding to one unit. Thrown away and rebuilt after a transient failure.
pub trait UnitHandle: Send {
    fn start(&self, mode: JobMode) -> Result<(), ControlError>;
    fn stop(&self, mode: JobMode) -> Result<(), ControlError>;
    fn active_state(&self) -> Result<ActiveState, ControlError>;
}

/// Drives systemd through `systemctl`.
#[derive(Debug, Clone)]
pub struct SystemctlControlPlane {
    systemctl: PathBuf,
}

impl SystemctlControlPlane {
    pub fn new(systemctl: impl Into<PathBuf>) -> Self {
        Self {
            systemctl: systemctl.into(),
        }
    }
}

fn systemctl(binary: &Path, args: &[&str]) -> Result<String, ControlError> {
    debug!("running {} {}", binary.display(), args.join(" "));
    let output = process_tools::command(binary)
        .args(args)
        .output()
        .map_err(|source| ControlError::Unavailable {
            binary: binary.to_path_buf(),
            source,
        })?;
    if !output.status.success() {
        return Err(ControlError::Transient(format!(
            "systemctl {} exited with {}: {}",
            args.join(" "),
            process_tools::exit_code(output.status),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Picks `key=value` out of `systemctl show` output.
fn property<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    output.lines().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        (k == key).then_some(v.trim())
    })
}

impl ControlPlane for SystemctlControlPlane {
    fn load_unit(&self, unit: &str) -> Result<Box<dyn UnitHandle>, ControlError> {
        let output = systemctl(
            &self.systemctl,
            &["show", "--property=Id,LoadState", "--", unit],
        )?;
        match property(&output, "LoadState") {
            Some("not-found") => Err(ControlError::UnitNotFound(unit.to_string())),
            Some(_) => {
                let id = property(&output, "Id").unwrap_or(unit).to_string();
                Ok(Box::new(SystemctlUnit {
                    systemctl: self.systemctl.clone(),
                    id,
                }))
            }
            None => Err(ControlError::Transient(format!(
                "no LoadState reported for {unit}"
            ))),
        }
    }
}

#[derive(Debug)]
struct SystemctlUnit {
    systemctl: PathBuf,
    id: String,
}

impl UnitHandle for SystemctlUnit {
    fn start(&self, mode: JobMode) -> Result<(), ControlError> {
        let job_mode = format!("--job-mode={}", mode.as_str());
        systemctl(
            &self.systemctl,
            &["start", "--no-block", job_mode.as_str(), "--", self.id.as_str()],
        )
        .map(|_| ())
    }

    fn stop(&self, mode: JobMode) -> Result<(), ControlError> {
        let job_mode = format!("--job-mode={}", mode.as_str());
        systemctl(
            &self.systemctl,
            &["stop", "--no-block", job_mode.as_str(), "--", self.id.as_str()],
        )
        .map(|_| ())
    }

    fn active_state(&self) -> Result<ActiveState, ControlError> {
        let output = systemctl(
            &self.systemctl,
            &["show", "--property=ActiveState", "--value", "--", self.id.as_str()],
        )?;
        Ok(output.parse().unwrap_or(ActiveState::Failed))
    }
}
