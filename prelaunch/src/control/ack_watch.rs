//! Readiness on the acknowledgement FIFO
//!
//! [`AckWatch`] owns both ends of the ack FIFO it registered with the Tokio
//! reactor. Waiting on it drains up to [`ACK_READ_LIMIT`] bytes once the
//! recorder writes. Nothing is spawned: the future only makes progress while
//! its owner polls it, and dropping the watch closes the descriptors on the
//! spot.

#![allow(unsafe_code)] // AsyncFd registration

use std::fs::File;
use std::io::{self, Read};

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

/// Upper bound on bytes consumed per acknowledgement
pub const ACK_READ_LIMIT: usize = 10;

/// Read end of the ack FIFO, registered for readability.
#[derive(Debug)]
pub struct AckWatch {
    reader: AsyncFd<File>,
    // Keeps the FIFO from ever reporting hangup to `reader`
    _writer: File,
}

impl AckWatch {
    /// Register `reader` with the current Tokio reactor.
    ///
    /// `writer` is a write end of the same FIFO held for the watch's lifetime.
    ///
    /// # Panics
    /// Panics outside a Tokio runtime; callers check for one first.
    pub(crate) fn register(reader: File, writer: File) -> io::Result<Self> {
        // SAFETY: the File owns its descriptor and moves into the AsyncFd,
        // which keeps it open until the AsyncFd is dropped
        let reader = unsafe { AsyncFd::register_with_interest(reader, Interest::READABLE) }?;
        Ok(Self { reader, _writer: writer })
    }

    /// Wait until the recorder has written to the ack FIFO and drain up to
    /// [`ACK_READ_LIMIT`] bytes. Returns the number of bytes read.
    ///
    /// Cancel safe: bytes are only consumed in the poll that returns them.
    pub async fn wait(&self) -> io::Result<usize> {
        let mut buf = [0u8; ACK_READ_LIMIT];
        loop {
            let mut guard = self.reader.readable().await?;
            if let Ok(result) = guard.try_io(|fd| fd.get_ref().read(&mut buf)) {
                return result;
            }
        }
    }
}
