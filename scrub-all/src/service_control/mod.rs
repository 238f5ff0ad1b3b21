// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Talking to the service manager: unit naming, retry with backoff and the
//! start/poll/stop state machine of a single unit.

pub mod backoff;
pub mod control_plane;
pub mod controller;
pub mod unit_name;
