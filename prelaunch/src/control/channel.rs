//! # Recording control channel
//!
//! Drives a recorder's FIFO control interface (`perf record --control
//! fifo:<ctl>,<ack>`): `enable\n` starts sampling, `stop\n` stops it, and any
//! bytes on the ack FIFO confirm the start.
//!
//! ```text
//!  ControlChannel                          recorder
//!  ──────────────                          ────────
//!  request_start ──"enable\n"──▶ control ──▶ read
//!  next_event    ◀────────────── ack     ◀── write "ack\n"
//!     └─▶ ChannelEvent::Started
//!  request_stop  ──"stop\n"────▶ control ──▶ read
//! ```
//!
//! Notifications are delivered by [`ControlChannel::next_event`], which the
//! owner polls from its own loop. The channel is the only holder of its
//! descriptors, so [`ControlChannel::close`] releases them before returning.
//!
//! Write and read failures are logged, never returned: a lost command shows
//! up as a missing `Started` event or as the recorder's own exit.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;

use log::{debug, info, warn};

use super::ack_watch::AckWatch;
use super::fifo::{make_fifo, open_ack, open_ack_writer, open_control, remove_fifo};
use super::paths::{FifoLocation, FifoPaths};
use crate::domain::{ChannelError, ChannelEvent};

/// Command that enables sampling
pub const START_COMMAND: &[u8] = b"enable\n";
/// Command that stops sampling
pub const STOP_COMMAND: &[u8] = b"stop\n";

/// Both FIFOs, created and opened together
#[derive(Debug)]
struct OpenFifos {
    paths: FifoPaths,
    control: File,
    ack: AckWatch,
}

/// Control/ack FIFO pair for an external recorder.
#[derive(Debug)]
pub struct ControlChannel {
    location: FifoLocation,
    fifos: Option<OpenFifos>,
    /// A start request is waiting for its acknowledgement
    ack_armed: bool,
    pending: VecDeque<ChannelEvent>,
}

impl ControlChannel {
    #[must_use]
    pub fn new(location: FifoLocation) -> Self {
        Self { location, fifos: None, ack_armed: false, pending: VecDeque::new() }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.fifos.is_some()
    }

    /// Paths of the open FIFOs
    #[must_use]
    pub fn paths(&self) -> Option<&FifoPaths> {
        self.fifos.as_ref().map(|f| &f.paths)
    }

    /// `fifo:<control>,<ack>` for the recorder's command line
    #[must_use]
    pub fn control_option(&self) -> Option<std::ffi::OsString> {
        self.paths().map(FifoPaths::control_option)
    }

    /// True while a start request is waiting for its acknowledgement
    #[must_use]
    pub fn has_pending_ack(&self) -> bool {
        self.ack_armed && self.is_open()
    }

    /// Close any existing channel and create a fresh FIFO pair.
    ///
    /// Must be called from within a Tokio runtime; the ack FIFO is
    /// registered with its reactor. Later calls need no runtime context.
    ///
    /// Returns the paths of the new FIFOs.
    ///
    /// # Errors
    /// Returns an error if either FIFO cannot be created or opened. No files
    /// or descriptors are left behind in that case.
    pub fn open(&mut self) -> Result<FifoPaths, ChannelError> {
        self.close();

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ChannelError::NoRuntime);
        }

        let paths = self.location.new_paths();
        match create(paths) {
            Ok(fifos) => {
                info!(
                    "Opened control fifo {} and ack fifo {}",
                    fifos.paths.control.display(),
                    fifos.paths.ack.display()
                );
                let paths = fifos.paths.clone();
                self.fifos = Some(fifos);
                Ok(paths)
            }
            Err(e) => {
                log::error!("{e}");
                Err(e)
            }
        }
    }

    /// Ask the recorder to start sampling.
    ///
    /// Arms a one-shot wait on the ack FIFO (replacing any previous one) and
    /// writes the start command. Queues [`ChannelEvent::NoChannel`] if the
    /// channel is not open.
    pub fn request_start(&mut self) {
        let Some(fifos) = self.fifos.as_mut() else {
            self.notify(ChannelEvent::NoChannel);
            return;
        };

        self.ack_armed = true;
        write_command(fifos, START_COMMAND);
    }

    /// Ask the recorder to stop sampling. No acknowledgement is awaited.
    ///
    /// Queues [`ChannelEvent::NoChannel`] if the channel is not open.
    pub fn request_stop(&mut self) {
        let Some(fifos) = self.fifos.as_mut() else {
            self.notify(ChannelEvent::NoChannel);
            return;
        };
        write_command(fifos, STOP_COMMAND);
    }

    /// Wait for the next notification.
    ///
    /// Queued events come first. Otherwise, with a start request armed, this
    /// resolves once the recorder writes to the ack FIFO, retiring the
    /// request. With nothing armed it never resolves.
    ///
    /// Cancel safe, so it can sit in a `tokio::select!` loop.
    pub async fn next_event(&mut self) -> ChannelEvent {
        if let Some(event) = self.pending.pop_front() {
            return event;
        }

        let Some(fifos) = self.fifos.as_ref().filter(|_| self.ack_armed) else {
            return std::future::pending().await;
        };
        match fifos.ack.wait().await {
            Ok(n) => debug!("Received {n} byte acknowledgement"),
            Err(e) => warn!("Failed to read message from ack fifo: {e}"),
        }
        self.ack_armed = false;
        ChannelEvent::Started
    }

    /// Retire a pending start acknowledgement without closing the FIFOs
    pub fn disarm(&mut self) {
        self.ack_armed = false;
    }

    /// Disarm any pending wait, close both FIFOs and delete them.
    /// Safe to call repeatedly.
    pub fn close(&mut self) {
        self.disarm();
        if let Some(fifos) = self.fifos.take() {
            let OpenFifos { paths, control, ack } = fifos;
            drop(control);
            drop(ack);
            remove_fifo(&paths.control);
            remove_fifo(&paths.ack);
            info!("Closed control fifos");
        }
    }

    fn notify(&mut self, event: ChannelEvent) {
        debug!("Channel event: {event:?}");
        self.pending.push_back(event);
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Make both FIFOs and open them. Only FIFOs made here are removed again on
/// failure; a path that already existed is left alone.
fn create(paths: FifoPaths) -> Result<OpenFifos, ChannelError> {
    make_fifo(&paths.control)?;
    if let Err(e) = make_fifo(&paths.ack) {
        remove_fifo(&paths.control);
        return Err(e);
    }

    let opened = open_control(&paths.control).and_then(|control| {
        let reader = open_ack(&paths.ack)?;
        let writer = open_ack_writer(&paths.ack)?;
        let ack = AckWatch::register(reader, writer)
            .map_err(|source| ChannelError::OpenFifo { path: paths.ack.clone(), source })?;
        Ok((control, ack))
    });
    match opened {
        Ok((control, ack)) => Ok(OpenFifos { paths, control, ack }),
        Err(e) => {
            remove_fifo(&paths.control);
            remove_fifo(&paths.ack);
            Err(e)
        }
    }
}

fn write_command(fifos: &mut OpenFifos, command: &[u8]) {
    let printable = String::from_utf8_lossy(command);
    match fifos.control.write_all(command) {
        Ok(()) => debug!("Wrote {:?} to {}", printable.trim_end(), fifos.paths.control.display()),
        Err(e) => warn!(
            "Failed to write {:?} to fifo {}: {e}",
            printable.trim_end(),
            fifos.paths.control.display()
        ),
    }
}
