//! # Recording session
//!
//! Wires the launcher and the control channel to an external recorder:
//!
//! 1. fork the target and park it before exec
//! 2. open the control/ack FIFOs
//! 3. spawn the recorder against the parked PID with sampling disabled
//!    (`-D -1`) and the FIFOs as its control interface
//! 4. send `enable`; once acknowledged, resume the target
//!
//! Teardown runs in dependency order: pending notifications are disarmed,
//! the target is killed and reaped, the FIFOs are closed and removed, and
//! the recorder is killed if it is still alive.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{info, warn};
use nix::sys::signal::Signal;
use serde::Serialize;
use tokio::process::{Child, Command};

use crate::control::{ControlChannel, FifoLocation, FifoPaths};
use crate::domain::{ChannelEvent, LaunchError, Pid, SessionError};
use crate::launcher::{send_signal, LaunchSpec, StoppedProcess};

/// How to run the recorder and what to record
#[derive(Debug, Clone)]
pub struct RecordConfig {
    /// Recorder binary (normally `perf`)
    pub recorder: PathBuf,
    /// Recorder output file
    pub output: PathBuf,
    /// Extra options passed to `record` before the session's own
    pub recorder_options: Vec<OsString>,
    pub target: LaunchSpec,
    pub fifo_location: FifoLocation,
}

/// Something the caller needs to react to
#[derive(Debug)]
pub enum SessionEvent {
    /// The recorder acknowledged the start and the target was resumed
    TargetRunning(Pid),
    /// The target exited before reaching its stop point
    TargetLaunchFailed(LaunchError),
    /// A command was sent while the control channel was closed
    ChannelBroken,
    /// The recorder process exited (`None` if its status could not be read)
    RecorderExited(Option<ExitStatus>),
}

/// Machine-readable description of a running session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub target_pid: Option<i32>,
    pub recorder_pid: Option<u32>,
    pub control_fifo: Option<PathBuf>,
    pub ack_fifo: Option<PathBuf>,
    pub output: PathBuf,
}

/// Build the recorder command line:
/// `record -o <output> <options...> --pid <pid> -D -1 --control fifo:<ctl>,<ack>`
#[must_use]
pub fn recorder_args(config: &RecordConfig, pid: Pid, paths: &FifoPaths) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["record".into(), "-o".into(), config.output.clone().into()];
    args.extend(config.recorder_options.iter().cloned());
    args.extend([
        "--pid".into(),
        pid.0.to_string().into(),
        // Start with sampling disabled until `enable` arrives
        "-D".into(),
        "-1".into(),
        "--control".into(),
        paths.control_option(),
    ]);
    args
}

/// A parked target, its control channel and the recorder attached to it
#[derive(Debug)]
pub struct RecordSession {
    launcher: StoppedProcess,
    channel: ControlChannel,
    recorder: Option<Child>,
    output: PathBuf,
}

impl RecordSession {
    /// Launch the target stopped, open the channel, spawn the recorder and
    /// request the start of sampling.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns an error if any of the three resources cannot be created;
    /// whatever was already created is torn down.
    pub fn start(config: &RecordConfig) -> Result<Self, SessionError> {
        let mut launcher = StoppedProcess::new();
        let target = &config.target;
        let pid =
            launcher.create_and_stop(&target.program, &target.args, target.working_dir.as_deref())?;

        let channel = ControlChannel::new(config.fifo_location.clone());
        let mut session = Self { launcher, channel, recorder: None, output: config.output.clone() };

        let paths = session.channel.open()?;

        let args = recorder_args(config, pid, &paths);
        info!("Spawning recorder: {} {:?}", config.recorder.display(), args);
        let recorder = Command::new(&config.recorder)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SessionError::SpawnRecorder { binary: config.recorder.clone(), source })?;
        session.recorder = Some(recorder);

        session.channel.request_start();
        Ok(session)
    }

    #[must_use]
    pub fn target_pid(&self) -> Option<Pid> {
        self.launcher.pid()
    }

    #[must_use]
    pub fn fifo_paths(&self) -> Option<&FifoPaths> {
        self.channel.paths()
    }

    #[must_use]
    pub fn recorder_pid(&self) -> Option<u32> {
        self.recorder.as_ref().and_then(Child::id)
    }

    #[must_use]
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            target_pid: self.target_pid().map(i32::from),
            recorder_pid: self.recorder_pid(),
            control_fifo: self.fifo_paths().map(|p| p.control.clone()),
            ack_fifo: self.fifo_paths().map(|p| p.ack.clone()),
            output: self.output.clone(),
        }
    }

    /// Wait for the next channel notification or recorder exit.
    ///
    /// A `Started` acknowledgement resumes the target before returning.
    pub async fn next_event(&mut self) -> SessionEvent {
        tokio::select! {
            event = self.channel.next_event() => match event {
                ChannelEvent::Started => match self.launcher.continue_stopped() {
                    Ok(pid) => SessionEvent::TargetRunning(pid),
                    Err(e) => SessionEvent::TargetLaunchFailed(e),
                },
                ChannelEvent::NoChannel => SessionEvent::ChannelBroken,
            },
            status = wait_child(&mut self.recorder), if self.recorder.is_some() => {
                self.recorder = None;
                match status {
                    Ok(status) => {
                        info!("Recorder exited: {status}");
                        SessionEvent::RecorderExited(Some(status))
                    }
                    Err(e) => {
                        warn!("Failed to wait on recorder: {e}");
                        SessionEvent::RecorderExited(None)
                    }
                }
            }
        }
    }

    /// Ask the recorder to stop sampling and the target to exit.
    ///
    /// Without an open channel the recorder itself is told to terminate.
    pub fn stop(&mut self) {
        if self.channel.is_open() {
            self.channel.request_stop();
            self.launcher.terminate();
        } else if let Some(pid) = self.recorder_pid() {
            #[allow(clippy::cast_possible_wrap)]
            send_signal(Pid(pid as i32), Signal::SIGTERM);
        }
    }

    /// Give the recorder up to `grace` to exit on its own, then kill it.
    pub async fn finish_recorder(&mut self, grace: Duration) -> Option<ExitStatus> {
        let mut recorder = self.recorder.take()?;
        match tokio::time::timeout(grace, recorder.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                warn!("Failed to wait on recorder: {e}");
                None
            }
            Err(_elapsed) => {
                warn!("Recorder did not exit within {grace:?}, killing it");
                recorder.kill().await.ok();
                recorder.try_wait().ok().flatten()
            }
        }
    }

    /// Release everything in dependency order. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        self.channel.disarm();
        self.launcher.kill();
        self.channel.close();
        if let Some(mut recorder) = self.recorder.take() {
            if let Err(e) = recorder.start_kill() {
                warn!("Failed to kill recorder: {e}");
            }
        }
    }
}

impl Drop for RecordSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn wait_child(child: &mut Option<Child>) -> std::io::Result<ExitStatus> {
    match child {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}
