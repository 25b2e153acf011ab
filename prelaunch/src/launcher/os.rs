//! Thin wrappers over the signal and wait primitives

use std::io;

use log::error;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};

use crate::domain::Pid;

/// Send `signal` to `pid`, logging failures. Returns true on success.
pub(crate) fn send_signal(pid: Pid, signal: Signal) -> bool {
    match kill(pid.into(), signal) {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to send {signal} to {pid}: {e}");
            false
        }
    }
}

/// Block until `pid` changes state, retrying when interrupted.
pub(crate) fn wait_pid(pid: Pid, options: Option<WaitPidFlag>) -> io::Result<WaitStatus> {
    loop {
        match waitpid(nix::unistd::Pid::from(pid), options) {
            Err(Errno::EINTR) => {}
            result => return result.map_err(io::Error::from),
        }
    }
}
