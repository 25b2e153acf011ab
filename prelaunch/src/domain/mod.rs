//! Domain model for prelaunch
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{ChannelEvent, Pid, ProcessState};

/// Decoded `waitpid` result, as reported in [`LaunchError::NotStopped`]
pub use nix::sys::wait::WaitStatus;

pub use errors::{ChannelError, LaunchError, PreflightError, SessionError};
