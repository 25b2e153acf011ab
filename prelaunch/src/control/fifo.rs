//! Named pipe creation and opening

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

use crate::domain::ChannelError;

/// Create an owner read/write only named pipe at `path`
pub(crate) fn make_fifo(path: &Path) -> Result<(), ChannelError> {
    match mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR) {
        Ok(()) => {
            debug!("Created fifo {}", path.display());
            Ok(())
        }
        Err(Errno::EINVAL) if path.as_os_str().as_encoded_bytes().contains(&0) => {
            Err(ChannelError::InvalidPath(path.to_path_buf()))
        }
        Err(errno) => Err(ChannelError::CreateFifo { path: path.to_path_buf(), source: errno.into() }),
    }
}

/// Open the control FIFO read-write, non-blocking.
///
/// Holding both ends keeps the open from waiting for the recorder and keeps
/// writes from failing with `EPIPE` before it connects.
pub(crate) fn open_control(path: &Path) -> Result<File, ChannelError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(path)
        .map_err(|source| ChannelError::OpenFifo { path: path.to_path_buf(), source })
}

/// Open the acknowledgement FIFO read-only, non-blocking
pub(crate) fn open_ack(path: &Path) -> Result<File, ChannelError> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(path)
        .map_err(|source| ChannelError::OpenFifo { path: path.to_path_buf(), source })
}

/// Open a write end of the acknowledgement FIFO for the channel itself.
///
/// With a writer always present the reader never sees end-of-file, so a
/// recorder that connects and disconnects leaves the FIFO idle rather than
/// permanently readable. Requires the read end to be open already.
pub(crate) fn open_ack_writer(path: &Path) -> Result<File, ChannelError> {
    OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(path)
        .map_err(|source| ChannelError::OpenFifo { path: path.to_path_buf(), source })
}

/// Remove a FIFO from the filesystem, ignoring one that is already gone
pub(crate) fn remove_fifo(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed fifo {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove fifo {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};

    #[test]
    fn test_make_fifo_is_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.fifo");
        make_fifo(&path).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.file_type().is_fifo());
        assert_eq!(meta.permissions().mode() & 0o077, 0);
    }

    #[test]
    fn test_make_fifo_fails_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.fifo");
        make_fifo(&path).unwrap();
        let err = make_fifo(&path).unwrap_err();
        assert!(matches!(err, ChannelError::CreateFifo { .. }));
    }

    #[test]
    fn test_open_ack_does_not_block_without_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ack.fifo");
        make_fifo(&path).unwrap();
        assert!(open_ack(&path).is_ok());
        assert!(open_control(&path).is_ok());
    }

    #[test]
    fn test_ack_writer_needs_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ack.fifo");
        make_fifo(&path).unwrap();
        // ENXIO without a reader
        assert!(open_ack_writer(&path).is_err());
        let _reader = open_ack(&path).unwrap();
        assert!(open_ack_writer(&path).is_ok());
    }

    #[test]
    fn test_remove_missing_fifo_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        remove_fifo(&dir.path().join("never-created.fifo"));
    }
}
