//! FIFO location and naming
//!
//! Both are pure functions of their inputs; only [`FifoLocation::from_env`]
//! reads the environment.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::domain::Pid;

const FIFO_PREFIX: &str = "prelaunch";
const CONTROL_SUFFIX: &str = "-control.fifo";
const ACK_SUFFIX: &str = "-ack.fifo";

/// Pick the directory the FIFOs live in.
///
/// Prefers the per-user runtime directory (volatile, owner-only) when it
/// names an existing directory, else falls back to `temp_dir`.
#[must_use]
pub fn fifo_parent_dir(runtime_dir: Option<&OsStr>, temp_dir: &Path) -> PathBuf {
    runtime_dir
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .filter(|dir| dir.is_dir())
        .unwrap_or_else(|| temp_dir.to_path_buf())
}

/// Where a channel creates its FIFOs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FifoLocation {
    dir: PathBuf,
}

impl FifoLocation {
    /// `$XDG_RUNTIME_DIR`, falling back to the system temp directory
    #[must_use]
    pub fn from_env() -> Self {
        let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR");
        Self { dir: fifo_parent_dir(runtime_dir.as_deref(), &std::env::temp_dir()) }
    }

    #[must_use]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fresh, collision-free paths for one channel session
    #[must_use]
    pub fn new_paths(&self) -> FifoPaths {
        let token = uuid::Uuid::new_v4().simple().to_string();
        FifoPaths::new(&self.dir, Pid::current(), &token)
    }
}

impl Default for FifoLocation {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Paths of the control and acknowledgement FIFOs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FifoPaths {
    pub control: PathBuf,
    pub ack: PathBuf,
}

impl FifoPaths {
    /// `<dir>/prelaunch-<pid>-<token>-perf-{control,ack}.fifo`
    #[must_use]
    pub fn new(dir: &Path, pid: Pid, token: &str) -> Self {
        let base = format!("{FIFO_PREFIX}-{}-{token}-perf", pid.0);
        Self {
            control: dir.join(format!("{base}{CONTROL_SUFFIX}")),
            ack: dir.join(format!("{base}{ACK_SUFFIX}")),
        }
    }

    /// Value for the recorder's `--control` option: `fifo:<control>,<ack>`
    #[must_use]
    pub fn control_option(&self) -> OsString {
        let mut opt = OsString::from("fifo:");
        opt.push(&self.control);
        opt.push(",");
        opt.push(&self.ack);
        opt
    }
}
