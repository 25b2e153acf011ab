//! CLI argument definitions

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::control::FifoLocation;
use crate::launcher::LaunchSpec;
use crate::session::RecordConfig;

#[derive(Parser, Debug)]
#[command(
    name = "prelaunch",
    about = "Launch a program stopped before exec and record it from its first instruction",
    after_help = "\
EXAMPLES:
    prelaunch ./my-app --flag                 Record ./my-app into perf.data
    prelaunch -o run.data -- my-app           Custom output file
    prelaunch --record-arg=--call-graph --record-arg=dwarf -- ./my-app
    prelaunch --json --duration 10 -- ./my-app"
)]
pub struct Args {
    /// Recorder binary; must support `record --control fifo:...`
    #[arg(long, default_value = "perf", value_name = "PATH")]
    pub recorder: PathBuf,

    /// Recorder output file
    #[arg(short, long, default_value = "perf.data", value_name = "FILE")]
    pub output: PathBuf,

    /// Extra option passed to `<recorder> record` (repeatable)
    #[arg(long = "record-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub record_args: Vec<OsString>,

    /// Working directory for the target program
    #[arg(short = 'C', long = "cwd", value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Directory for the control FIFOs (default: $XDG_RUNTIME_DIR, else temp dir)
    #[arg(long, value_name = "DIR")]
    pub fifo_dir: Option<PathBuf>,

    /// Stop recording after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Seconds to wait for the recorder to exit after stopping
    #[arg(long, default_value = "5", value_name = "SECS")]
    pub grace: u64,

    /// Print the session (PIDs and FIFO paths) as JSON once started
    #[arg(long)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,

    /// Program to launch, followed by its arguments
    #[arg(
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "PROGRAM"
    )]
    pub command: Vec<OsString>,
}

impl Args {
    /// The target program (first word of the command)
    #[must_use]
    pub fn program(&self) -> PathBuf {
        self.command.first().map(PathBuf::from).unwrap_or_default()
    }

    #[must_use]
    pub fn launch_spec(&self) -> LaunchSpec {
        let mut spec = LaunchSpec::new(self.program()).args(self.command.iter().skip(1).cloned());
        if let Some(dir) = &self.working_dir {
            spec = spec.working_dir(dir);
        }
        spec
    }

    #[must_use]
    pub fn record_config(&self) -> RecordConfig {
        RecordConfig {
            recorder: self.recorder.clone(),
            output: self.output.clone(),
            recorder_options: self.record_args.clone(),
            target: self.launch_spec(),
            fifo_location: self
                .fifo_dir
                .as_ref()
                .map_or_else(FifoLocation::from_env, FifoLocation::in_dir),
        }
    }
}
