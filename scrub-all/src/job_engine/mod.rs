// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Design: Conflict-Aware Scrub Scheduler (threads + condvar)
//!
//! ## Overview
//! - Every mountpoint becomes one job; every job runs on its own OS thread.
//! - A job is admitted only if none of its devices is claimed by a running job.
//! - If nothing runs, the next pending mountpoint is admitted unconditionally.
//! - Job threads release their devices and notify the condvar when done; the
//!   scheduler re-scans the pending map after every wakeup.
//! - Termination (signal) wakes the scheduler through the same condvar; the
//!   scheduler then calls `stop()` on every registered job and waits.
//!
//! ```text
//!         +--------------------------------------+
//!         |      Scheduler (main thread)         |
//!         |  pending map / running devices       |
//!         +----------+-----------+---------------+
//!                    |           |        ^ notify (job done / SIGTERM)
//!                    v           v        |
//!              +---------+  +---------+   |
//!              | job sda |  | job sdb |---+
//!              | thread  |  | thread  |
//!              +---------+  +---------+
//! ```

#[cfg(test)]
pub(crate) mod closure_job;
pub mod context;
pub mod job;
pub mod scheduler;

#[cfg(test)]
mod tests;
