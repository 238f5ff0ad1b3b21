// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Stands in for a filesystem checker: logs when it runs, sleeps, and exits
//! with a chosen code.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::debug;
use scrub_all_tests::checker_log::{self, Phase};

#[derive(Debug, Parser)]
struct Args {
    /// How long to "scrub"
    #[arg(long, default_value_t = 0)]
    sleep_ms: u64,

    /// MOUNTPOINT=MILLIS, may be repeated
    #[arg(long, value_parser = parse_override)]
    sleep_ms_for: Vec<(String, i32)>,

    /// Exit code for every mountpoint not listed in --exit-code-for
    #[arg(long, default_value_t = 0)]
    exit_code: i32,

    /// MOUNTPOINT=CODE, may be repeated
    #[arg(long, value_parser = parse_override)]
    exit_code_for: Vec<(String, i32)>,

    /// JSON-lines file that records start and end of every run
    #[arg(long)]
    log: Option<PathBuf>,

    mountpoint: String,
}

fn parse_override(s: &str) -> Result<(String, i32), String> {
    let (mountpoint, value) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected MOUNTPOINT=VALUE, got {s}"))?;
    let value = value.parse().map_err(|e| format!("bad value in {s}: {e}"))?;
    Ok((mountpoint.to_string(), value))
}

fn lookup(overrides: &[(String, i32)], mountpoint: &str) -> Option<i32> {
    overrides
        .iter()
        .find(|(m, _)| m == mountpoint)
        .map(|(_, value)| *value)
}

fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    debug!("{:?}", args);

    if let Some(log) = &args.log {
        checker_log::append(log, &args.mountpoint, Phase::Start)?;
    }
    let sleep_ms = lookup(&args.sleep_ms_for, &args.mountpoint)
        .map(|ms| ms.max(0) as u64)
        .unwrap_or(args.sleep_ms);
    thread::sleep(Duration::from_millis(sleep_ms));
    if let Some(log) = &args.log {
        checker_log::append(log, &args.mountpoint, Phase::End)?;
    }

    let code = lookup(&args.exit_code_for, &args.mountpoint).unwrap_or(args.exit_code);
    std::process::exit(code);
}
