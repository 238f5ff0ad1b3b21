// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, error, warn};

use crate::service_control::backoff::Backoff;
use crate::service_control::control_plane::{
    ActiveState, ControlError, ControlPlane, JobMode, UnitHandle,
};

/// Timing knobs of a controller.
#[derive(Debug, Clone, Copy)]
pub struct ControllerTiming {
    pub poll_interval: Duration,
    pub backoff_unit: Duration,
    pub backoff_cap: u64,
}

/// Drives one unit through the service manager, retrying every call with
/// Fibonacci backoff and a fresh binding after each transient failure.
pub struct ServiceController {
    plane: Arc<dyn ControlPlane>,
    unit: String,
    handle: Mutex<Option<Box<dyn UnitHandle>>>,
    timing: ControllerTiming,
}

impl ServiceController {
    /// Binds to `unit`. Fails if the unit cannot be resolved even after retrying.
    pub fn bind(
        plane: Arc<dyn ControlPlane>,
        unit: impl Into<String>,
        timing: ControllerTiming,
    ) -> Result<Self, ControlError> {
        let controller = Self {
            plane,
            unit: unit.into(),
            handle: Mutex::new(None),
            timing,
        };
        controller.call(|_| Ok(()))?;
        Ok(controller)
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Issues the start directive without waiting for the unit.
    pub fn request_start(&self) -> Result<(), ControlError> {
        self.call(|unit| unit.start(JobMode::Replace))
            .inspect_err(|err| {
                error!("could not start {}: {}", self.unit, err);
                eprintln!("{err}");
            })
    }

    /// Stops the unit and waits until it is down.
    pub fn stop(&self) {
        match self.call(|unit| unit.stop(JobMode::Replace)) {
            Ok(()) => {
                self.wait();
            }
            Err(err) => {
                error!("could not stop {}: {}", self.unit, err);
                eprintln!("{err}");
            }
        }
    }

    /// Polls until the unit is inactive or failed. 1 if it failed, 0 otherwise.
    pub fn wait(&self) -> i32 {
        loop {
            // right after a start directive the unit may still report inactive
            thread::sleep(self.timing.poll_interval);
            let state = self.state();
            debug!("{} is {:?}", self.unit, state);
            if state.is_terminal() {
                return i32::from(state == ActiveState::Failed);
            }
        }
    }

    /// Current active state. A state that cannot be read counts as failed.
    pub fn state(&self) -> ActiveState {
        self.call(|unit| unit.active_state())
            .unwrap_or_else(|err| {
                warn!("could not read the state of {}: {}", self.unit, err);
                ActiveState::Failed
            })
    }

    fn call<T>(
        &self,
        f: impl Fn(&dyn UnitHandle) -> Result<T, ControlError>,
    ) -> Result<T, ControlError> {
        let delays = Backoff::fibonacci(self.timing.backoff_cap).delays(self.timing.backoff_unit);
        for delay in delays {
            match self.try_call(&f) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    debug!("{}: {}, retrying in {:?}", self.unit, err, delay);
                    thread::sleep(delay);
                    self.unbind();
                }
                Err(err) => return Err(err),
            }
        }
        self.try_call(&f)
    }

    fn try_call<T>(
        &self,
        f: &impl Fn(&dyn UnitHandle) -> Result<T, ControlError>,
    ) -> Result<T, ControlError> {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        let unit = match handle.take() {
            Some(unit) => unit,
            None => self.plane.load_unit(&self.unit)?,
        };
        let result = f(unit.as_ref());
        *handle = Some(unit);
        result
    }

    fn unbind(&self) {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
