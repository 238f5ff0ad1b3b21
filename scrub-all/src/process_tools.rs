// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::ffi::OsStr;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, ExitStatus};

use log::debug;
use nix::sys::signal::{self, SigSet, SigmaskHow, Signal};
use nix::unistd::Pid;

/// The signals that the cancellation watcher consumes. They are blocked in
/// every thread of this process.
pub fn termination_signals() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTERM);
    set
}

/// A `Command` whose child gets SIGINT/SIGTERM back. The signal mask is
/// inherited across exec, so without this a child could not be stopped.
pub fn command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    unsafe {
        // only async-signal-safe calls between fork and exec
        cmd.pre_exec(|| {
            signal::sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&termination_signals()), None)
                .map_err(std::io::Error::from)
        });
    }
    cmd
}

/// Exit code of a finished child, shell style: `128 + signo` if it was killed.
pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signo)) => 128 + signo,
        (None, None) => 1,
    }
}

/// Asks a child process to terminate gracefully.
pub fn request_termination(pid: u32) {
    let pid = Pid::from_raw(pid as i32);
    if let Err(err) = signal::kill(pid, Signal::SIGTERM) {
        debug!("could not send SIGTERM to {}: {}", pid, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_of_normal_exit() {
        let status = command("sh").args(["-c", "exit 3"]).status().unwrap();
        assert_eq!(exit_code(status), 3);
    }

    #[test]
    fn exit_code_of_killed_child() {
        let mut child = command("sleep").arg("30").spawn().unwrap();
        request_termination(child.id());
        let status = child.wait().unwrap();
        assert_eq!(exit_code(status), 128 + Signal::SIGTERM as i32);
    }
}
