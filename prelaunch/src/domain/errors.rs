//! Structured error types for prelaunch
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;

use nix::sys::wait::WaitStatus;
use thiserror::Error;

use super::types::Pid;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to fork: {0}")]
    Fork(#[source] std::io::Error),

    #[error("Invalid argument (contains NUL byte): {0}")]
    InvalidArgument(String),

    #[error("No stopped process to continue")]
    NoProcess,

    #[error("Process {pid} did not reach the stop point: {status:?}")]
    NotStopped { pid: Pid, status: WaitStatus },

    #[error("Failed to wait on process {pid}: {source}")]
    Wait {
        pid: Pid,
        #[source]
        source: std::io::Error,
    },
}

/// Problems found before anything is forked
#[derive(Error, Debug)]
pub enum PreflightError {
    #[error(
        "Target program not found: {}\n\n\
         Make sure the path is correct, the file is executable, or that it is on $PATH.",
        .0.display()
    )]
    TargetNotFound(PathBuf),

    #[error(
        "Recorder not found: {}\n\n\
         Install perf (linux-tools) or point --recorder at the binary.",
        .0.display()
    )]
    RecorderNotFound(PathBuf),

    #[error("Working directory not found: {}\n\n--cwd must point to an existing directory.", .0.display())]
    WorkingDirNotFound(PathBuf),
}

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Control channel must be opened from within a Tokio runtime")]
    NoRuntime,

    #[error("Invalid fifo path: {0}")]
    InvalidPath(PathBuf),

    #[error("Cannot create fifo {path}: {source}")]
    CreateFifo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open fifo {path}: {source}")]
    OpenFifo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to prepare a stopped process: {0}")]
    Launch(#[from] LaunchError),

    #[error("Failed to create recorder control fifos: {0}")]
    Channel(#[from] ChannelError),

    #[error("Failed to spawn recorder {binary}: {source}")]
    SpawnRecorder {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
