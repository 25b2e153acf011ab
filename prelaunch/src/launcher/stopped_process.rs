//! # Initially-stopped child process
//!
//! Forks a child that parks itself with `SIGSTOP` before exec, so a
//! recorder can attach to its PID before the target runs any code.
//!
//! ## Lifecycle
//!
//! ```text
//! create_and_stop ──▶ StoppedBeforeExec ──continue_stopped──▶ Running
//!        │                    │                                  │
//!        │                    └──(child died)──▶ Terminated ◀────┘ kill
//!        └──(fork failed)──▶ no child recorded
//! ```
//!
//! The parent only resumes the child after `waitpid(WUNTRACED)` has reported
//! it stopped, so there is no window in which the target can run early.

#![allow(unsafe_code)] // fork/exec require unsafe

use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use log::{debug, info, warn};
use nix::sys::signal::{self, pthread_sigmask, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::{access, chdir, fork, AccessFlags, ForkResult};

use super::os::{send_signal, wait_pid};
use super::program::program_candidates;
use crate::domain::{LaunchError, Pid, ProcessState};

/// Exit status of a child whose program could not be found or executed
pub const EXIT_EXEC_FAILED: i32 = 127;

/// Owns at most one child process that starts out stopped before exec.
#[derive(Debug)]
pub struct StoppedProcess {
    pid: Option<Pid>,
    state: ProcessState,
}

impl Default for StoppedProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl StoppedProcess {
    #[must_use]
    pub fn new() -> Self {
        Self { pid: None, state: ProcessState::NotStarted }
    }

    /// PID of the child, or `None` if no child is recorded
    #[must_use]
    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Kill any previous child, then fork a new one that changes into
    /// `working_dir`, stops itself, and execs `program` with `args` once
    /// continued.
    ///
    /// A program that cannot be found makes the child exit before it stops;
    /// that surfaces as an error from [`continue_stopped`](Self::continue_stopped),
    /// not from this call.
    ///
    /// # Errors
    /// Returns an error if an argument contains a NUL byte or `fork` fails.
    pub fn create_and_stop(
        &mut self,
        program: &Path,
        args: &[OsString],
        working_dir: Option<&Path>,
    ) -> Result<Pid, LaunchError> {
        self.kill();

        let path_var = std::env::var_os("PATH");
        let plan = ChildPlan::new(program, args, working_dir, path_var.as_deref())?;

        // SAFETY: the child only touches pre-allocated data and calls
        // async-signal-safe functions before exec or _exit
        match unsafe { fork() } {
            Err(errno) => {
                log::error!("Failed to fork: {errno}");
                Err(LaunchError::Fork(errno.into()))
            }
            // SAFETY: we are the freshly forked child
            Ok(ForkResult::Child) => unsafe { plan.run_in_child() },
            Ok(ForkResult::Parent { child }) => {
                let pid = Pid::from(child);
                info!("Created stopped process {pid} for {}", program.display());
                self.pid = Some(pid);
                self.state = ProcessState::StoppedBeforeExec;
                Ok(pid)
            }
        }
    }

    /// Wait for the child to reach its stop point, then send `SIGCONT`.
    ///
    /// Blocks the calling thread in `waitpid` until the child stops or exits.
    /// If it exited (e.g. the program was not found) the recorded PID is
    /// cleared.
    ///
    /// # Errors
    /// Returns an error if no child is recorded or the child did not stop.
    pub fn continue_stopped(&mut self) -> Result<Pid, LaunchError> {
        let pid = self.pid.ok_or(LaunchError::NoProcess)?;

        if self.state == ProcessState::Running {
            warn!("{pid} is already running");
            return Ok(pid);
        }

        let status = match wait_pid(pid, Some(WaitPidFlag::WUNTRACED)) {
            Ok(status) => status,
            Err(source) => {
                warn!("Failed to wait on process {pid}: {source}");
                self.forget();
                return Err(LaunchError::Wait { pid, source });
            }
        };

        if !matches!(status, WaitStatus::Stopped(..)) {
            info!("{pid} never reached the stop point: {status:?}");
            self.forget();
            return Err(LaunchError::NotStopped { pid, status });
        }

        send_signal(pid, Signal::SIGCONT);
        self.state = ProcessState::Running;
        info!("Continued {pid}");
        Ok(pid)
    }

    /// Ask the child to exit with `SIGTERM`. Does not wait.
    pub fn terminate(&self) {
        if let Some(pid) = self.pid {
            debug!("Sending SIGTERM to {pid}");
            send_signal(pid, Signal::SIGTERM);
        }
    }

    /// Kill the child with `SIGKILL` and reap it. No-op without a child.
    pub fn kill(&mut self) {
        let Some(pid) = self.pid.take() else {
            return;
        };
        send_signal(pid, Signal::SIGKILL);
        match wait_pid(pid, None) {
            Ok(status) => debug!("Reaped {pid}: {status:?}"),
            Err(e) => warn!("Failed to wait on {pid}: {e}"),
        }
        self.state = ProcessState::Terminated;
    }

    fn forget(&mut self) {
        self.pid = None;
        self.state = ProcessState::Terminated;
    }
}

impl Drop for StoppedProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Everything the child needs, allocated before `fork`
struct ChildPlan {
    /// Kept alive for the pointers in `argv`
    _args: Vec<CString>,
    argv: Vec<*const libc::c_char>,
    candidates: Vec<CString>,
    working_dir: Option<CString>,
    chdir_failed: Vec<u8>,
    not_found: Vec<u8>,
    stop_failed: Vec<u8>,
    exec_failed: Vec<u8>,
}

impl ChildPlan {
    fn new(
        program: &Path,
        args: &[OsString],
        working_dir: Option<&Path>,
        path_var: Option<&OsStr>,
    ) -> Result<Self, LaunchError> {
        let c_args = std::iter::once(program.as_os_str())
            .chain(args.iter().map(OsString::as_os_str))
            .map(to_cstring)
            .collect::<Result<Vec<_>, _>>()?;
        let argv = c_args.iter().map(|a| a.as_ptr()).chain(std::iter::once(ptr::null())).collect();

        let candidates = program_candidates(program, path_var)
            .iter()
            .map(|p| to_cstring(p.as_os_str()))
            .collect::<Result<Vec<_>, _>>()?;

        let working_dir =
            working_dir.filter(|wd| !wd.as_os_str().is_empty()).map(|wd| to_cstring(wd.as_os_str())).transpose()?;

        let wd_display = working_dir.as_deref().map(|wd| wd.to_string_lossy().into_owned()).unwrap_or_default();
        let program_display = program.display();
        let chdir_failed =
            format!("prelaunch: failed to change working directory to {wd_display}\n").into_bytes();
        Ok(Self {
            _args: c_args,
            argv,
            candidates,
            working_dir,
            chdir_failed,
            not_found: format!("prelaunch: {program_display}: command not found\n").into_bytes(),
            stop_failed: b"prelaunch: failed to raise SIGSTOP\n".to_vec(),
            exec_failed: format!("prelaunch: failed to exec {program_display}\n").into_bytes(),
        })
    }

    /// Child side of the fork. Never returns.
    ///
    /// # Safety
    /// Must only be called in the child immediately after `fork`.
    unsafe fn run_in_child(&self) -> ! {
        // The Rust runtime ignores SIGPIPE and ignored dispositions survive
        // exec; restore the default together with an empty signal mask.
        let _ = signal::signal(Signal::SIGPIPE, SigHandler::SigDfl);
        let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None);

        if let Some(wd) = &self.working_dir {
            if chdir(wd.as_c_str()).is_err() {
                write_stderr(&self.chdir_failed);
            }
        }

        if !self.candidates.iter().any(|c| access(c.as_c_str(), AccessFlags::X_OK).is_ok()) {
            write_stderr(&self.not_found);
            libc::_exit(EXIT_EXEC_FAILED);
        }

        if signal::raise(Signal::SIGSTOP).is_err() {
            write_stderr(&self.stop_failed);
        }

        // execv, not nix's wrapper: the argv pointer array is built before
        // fork so nothing is allocated here

        for candidate in &self.candidates {
            libc::execv(candidate.as_ptr(), self.argv.as_ptr());
        }
        write_stderr(&self.exec_failed);
        libc::_exit(EXIT_EXEC_FAILED)
    }
}

fn to_cstring(s: &OsStr) -> Result<CString, LaunchError> {
    CString::new(s.as_bytes()).map_err(|_| LaunchError::InvalidArgument(s.to_string_lossy().into_owned()))
}

/// Async-signal-safe diagnostic output for the forked child
unsafe fn write_stderr(msg: &[u8]) {
    libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
}
