//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep raw `pid_t` values from leaking through the
//! public API as bare integers.

use std::fmt;

/// Process ID
///
/// Represents a process ID in the system. Only meaningful while the
/// process it names has not been reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub i32);

impl Pid {
    /// PID of the calling process
    #[must_use]
    pub fn current() -> Self {
        nix::unistd::getpid().into()
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<i32> for Pid {
    fn from(pid: i32) -> Self {
        Pid(pid)
    }
}

impl From<Pid> for i32 {
    fn from(pid: Pid) -> Self {
        pid.0
    }
}

impl From<nix::unistd::Pid> for Pid {
    fn from(pid: nix::unistd::Pid) -> Self {
        Pid(pid.as_raw())
    }
}

impl From<Pid> for nix::unistd::Pid {
    fn from(pid: Pid) -> Self {
        nix::unistd::Pid::from_raw(pid.0)
    }
}

/// Lifecycle of the child owned by a launcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// No child has been created (or the last one was reaped)
    NotStarted,
    /// Forked and parked before exec
    StoppedBeforeExec,
    /// Resumed into the target program
    Running,
    /// Gone: failed to reach the rendezvous, or was killed and reaped
    Terminated,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::NotStarted => "not started",
            ProcessState::StoppedBeforeExec => "stopped before exec",
            ProcessState::Running => "running",
            ProcessState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Notifications emitted by the recording control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The recorder acknowledged the start command
    Started,
    /// A command was requested while no channel was open
    NoChannel,
}
