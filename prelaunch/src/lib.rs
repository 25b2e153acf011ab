//! # prelaunch - record a program from its very first instruction
//!
//! A sampling recorder attached to an already-running process misses its
//! startup; one that launches the process itself often needs privileges the
//! target should not get. prelaunch sidesteps both: it forks the target,
//! parks it before exec, lets the recorder attach to the parked PID, and
//! resumes it only after the recorder confirms sampling is enabled.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────┐  fork + SIGSTOP   ┌──────────────────────┐
//! │   StoppedProcess     │──────────────────▶│  target (parked)     │
//! │   (launcher)         │  waitpid + SIGCONT│                      │
//! └──────────┬───────────┘──────────────────▶└──────────▲───────────┘
//!            │ pid                                      │ --pid
//!            ▼                                          │
//! ┌──────────────────────┐  enable\n / stop\n ┌─────────┴────────────┐
//! │   ControlChannel     │───── control ─────▶│  recorder (perf)     │
//! │   (FIFO pair)        │◀──── ack ──────────│                      │
//! └──────────────────────┘                    └──────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`launcher`]: fork a child that stops itself before exec; continue,
//!   terminate and kill it
//! - [`control`]: create the control/ack FIFOs, send start/stop commands,
//!   and report the start acknowledgement asynchronously
//! - [`session`]: lifecycle glue between target, channel and recorder
//! - [`preflight`]: validate the target and recorder before launching
//! - [`cli`]: command-line argument parsing and configuration
//! - [`domain`]: core domain types (Pid, process state, events) and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Record ./my-app from its first instruction into perf.data
//! prelaunch ./my-app --some-flag
//!
//! # Print PIDs and FIFO paths for another tool to pick up
//! prelaunch --json -- ./my-app
//! ```

pub mod cli;
pub mod control;
pub mod domain;
pub mod launcher;
pub mod preflight;
pub mod session;
