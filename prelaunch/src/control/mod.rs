//! Recording control channel
//!
//! - `channel`: control/ack FIFO pair and the start/stop protocol
//! - `ack_watch`: one-shot readiness notification on the ack FIFO
//! - `paths`: FIFO directory discovery and naming
//! - `fifo`: `mkfifo` and non-blocking open helpers

pub mod ack_watch;
pub mod channel;
mod fifo;
pub mod paths;

pub use ack_watch::{AckWatch, ACK_READ_LIMIT};
pub use channel::{ControlChannel, START_COMMAND, STOP_COMMAND};
pub use paths::{fifo_parent_dir, FifoLocation, FifoPaths};
