//! Suspended process launcher
//!
//! - `stopped_process`: fork a child that stops itself before exec
//! - `program`: `$PATH` lookup computed ahead of the fork
//! - `os`: signal and wait wrappers

mod os;
pub mod program;
pub mod stopped_process;

use std::ffi::OsString;
use std::path::PathBuf;

pub(crate) use os::send_signal;
pub use program::{program_candidates, resolve_program};
pub use stopped_process::{StoppedProcess, EXIT_EXEC_FAILED};

/// What to launch: program, arguments and optional working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
}

impl LaunchSpec {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), working_dir: None }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}
