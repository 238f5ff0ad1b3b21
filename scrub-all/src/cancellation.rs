// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! SIGINT/SIGTERM handling. The signals stay blocked everywhere and one
//! watcher thread picks them up with sigwait, so no code ever runs in
//! signal-handler context.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info};

use crate::job_engine::context::ScrubContext;
use crate::process_tools::termination_signals;

/// Blocks SIGINT/SIGTERM for the calling thread and every thread it spawns
/// afterwards. Call it before any other thread exists.
pub fn block_termination_signals() -> nix::Result<()> {
    termination_signals().thread_block()
}

/// Starts the thread that turns SIGINT/SIGTERM into a termination request.
pub fn spawn_signal_watcher(ctx: Arc<ScrubContext>) -> std::io::Result<JoinHandle<()>> {
    // the watcher inherits the mask, so a signal can't slip in before it waits
    block_termination_signals().map_err(std::io::Error::from)?;
    thread::Builder::new()
        .name("signal-watcher".to_string())
        .spawn(move || {
            let signals = termination_signals();
            loop {
                match signals.wait() {
                    Ok(signal) => {
                        info!("received {:?}", signal);
                        ctx.request_termination();
                    }
                    Err(err) => {
                        error!("waiting for signals failed: {}", err);
                        break;
                    }
                }
            }
        })
}
