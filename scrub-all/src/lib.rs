// SPDX-License-Identifier: MIT
// scrub-all: runs one filesystem scrub per mounted filesystem, in parallel
// wherever the filesystems do not share a disk.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

pub mod cancellation;
pub mod config;
pub mod job_engine;
pub mod jobs;
pub mod mount_map;
pub mod process_tools;
pub mod service_control;
