// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    End,
}

/// One line written by fake-scrub.
#[derive(Serialize, Deserialize, Debug)]
pub struct CheckerEvent {
    pub mountpoint: String,
    pub phase: Phase,
    pub pid: u32,
    pub at_micros: u128,
}

/// When a checker ran. `end` is None if it never finished on its own.
#[derive(Debug, Clone, Copy)]
pub struct Interval {
    pub start: u128,
    pub end: Option<u128>,
}

impl Interval {
    pub fn overlaps(&self, other: &Interval) -> bool {
        let self_end = self.end.unwrap_or(u128::MAX);
        let other_end = other.end.unwrap_or(u128::MAX);
        self.start < other_end && other.start < self_end
    }
}

pub fn now_micros() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or_default()
}

/// Appends one event as a JSON line. A single short append is atomic, so
/// concurrent checkers can share the file.
pub fn append(path: &Path, mountpoint: &str, phase: Phase) -> io::Result<()> {
    let event = CheckerEvent {
        mountpoint: mountpoint.to_string(),
        phase,
        pid: std::process::id(),
        at_micros: now_micros(),
    };
    let mut line = serde_json::to_string(&event).map_err(io::Error::other)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}

pub fn read(path: &Path) -> io::Result<Vec<CheckerEvent>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(io::Error::other))
        .collect()
}

pub fn intervals(events: &[CheckerEvent]) -> BTreeMap<String, Interval> {
    let mut result: BTreeMap<String, Interval> = BTreeMap::new();
    for event in events {
        match event.phase {
            Phase::Start => {
                result.insert(
                    event.mountpoint.clone(),
                    Interval {
                        start: event.at_micros,
                        end: None,
                    },
                );
            }
            Phase::End => {
                if let Some(interval) = result.get_mut(&event.mountpoint) {
                    interval.end = Some(event.at_micros);
                }
            }
        }
    }
    result
}
