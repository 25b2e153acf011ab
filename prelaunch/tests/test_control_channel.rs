use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::Path;
use std::time::Duration;

use prelaunch::control::{ControlChannel, FifoLocation};
use prelaunch::domain::{ChannelError, ChannelEvent};

fn is_fifo(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.file_type().is_fifo())
}

/// Read whatever is pending on a FIFO, from the recorder's side
fn drain(path: &Path) -> Vec<u8> {
    let mut reader = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .unwrap();
    let mut buf = [0u8; 64];
    match reader.read(&mut buf) {
        Ok(n) => buf[..n].to_vec(),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Vec::new(),
        Err(e) => panic!("read failed: {e}"),
    }
}

/// Answer on the ack FIFO the way the recorder does
fn send_ack(path: &Path, bytes: &[u8]) {
    let mut writer = OpenOptions::new().write(true).open(path).unwrap();
    writer.write_all(bytes).unwrap();
}

async fn next_event(channel: &mut ControlChannel, within: Duration) -> Option<ChannelEvent> {
    tokio::time::timeout(within, channel.next_event()).await.ok()
}

/// Descriptors of this process that point at `path`, deleted or not
fn open_descriptors(path: &Path) -> usize {
    let prefix = path.to_string_lossy().into_owned();
    std::fs::read_dir("/proc/self/fd")
        .unwrap()
        .filter_map(|entry| std::fs::read_link(entry.ok()?.path()).ok())
        .filter(|target| target.to_string_lossy().starts_with(&prefix))
        .count()
}

/// User plus system CPU time of the calling thread, in clock ticks
fn thread_cpu_ticks() -> u64 {
    let stat = std::fs::read_to_string("/proc/thread-self/stat").unwrap();
    let after_comm = &stat[stat.rfind(')').unwrap() + 1..];
    // Fields 14 and 15 overall; 12 and 13 after the state field
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    fields[11].parse::<u64>().unwrap() + fields[12].parse::<u64>().unwrap()
}

fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn test_open_creates_fifo_pair() {
    let dir = tempfile::tempdir().unwrap();
    let mut channel = ControlChannel::new(FifoLocation::in_dir(dir.path()));
    assert!(!channel.is_open());

    let paths = channel.open().unwrap();
    assert!(channel.is_open());
    assert_ne!(paths.control, paths.ack);
    assert!(is_fifo(&paths.control));
    assert!(is_fifo(&paths.ack));
    assert!(paths.control.starts_with(dir.path()));
    assert_eq!(channel.paths(), Some(&paths));
}

#[tokio::test]
async fn test_reopen_replaces_previous_pair() {
    let dir = tempfile::tempdir().unwrap();
    let mut channel = ControlChannel::new(FifoLocation::in_dir(dir.path()));

    let first = channel.open().unwrap();
    let second = channel.open().unwrap();

    assert_ne!(first.control, second.control);
    assert_ne!(first.ack, second.ack);
    assert!(!first.control.exists());
    assert!(!first.ack.exists());
    assert!(is_fifo(&second.control));
    assert!(is_fifo(&second.ack));
}

#[tokio::test]
async fn test_close_removes_fifos() {
    let dir = tempfile::tempdir().unwrap();
    let mut channel = ControlChannel::new(FifoLocation::in_dir(dir.path()));
    let paths = channel.open().unwrap();

    channel.close();
    assert!(!channel.is_open());
    assert!(!paths.control.exists());
    assert!(!paths.ack.exists());

    // Idempotent
    channel.close();
    assert!(dir_is_empty(dir.path()));
}

#[tokio::test]
async fn test_drop_removes_fifos() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut channel = ControlChannel::new(FifoLocation::in_dir(dir.path()));
        channel.open().unwrap();
        channel.request_start();
    }
    assert!(dir_is_empty(dir.path()));
}

#[tokio::test]
async fn test_open_in_missing_directory_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone");
    let mut channel = ControlChannel::new(FifoLocation::in_dir(&missing));

    let err = channel.open().unwrap_err();
    assert!(matches!(err, ChannelError::CreateFifo { .. }), "got {err:?}");
    assert!(!channel.is_open());
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn test_open_outside_runtime_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut channel = ControlChannel::new(FifoLocation::in_dir(dir.path()));

    assert!(matches!(channel.open(), Err(ChannelError::NoRuntime)));
    assert!(!channel.is_open());
    assert!(dir_is_empty(dir.path()));
}

#[tokio::test]
async fn test_commands_without_channel_report_no_channel() {
    let mut channel = ControlChannel::new(FifoLocation::in_dir("/tmp"));

    channel.request_start();
    assert!(!channel.has_pending_ack());
    assert_eq!(next_event(&mut channel, Duration::from_secs(1)).await, Some(ChannelEvent::NoChannel));

    channel.request_stop();
    assert_eq!(next_event(&mut channel, Duration::from_secs(1)).await, Some(ChannelEvent::NoChannel));
    assert_eq!(next_event(&mut channel, Duration::from_millis(100)).await, None);
}

#[tokio::test]
async fn test_start_and_stop_commands_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let mut channel = ControlChannel::new(FifoLocation::in_dir(dir.path()));
    let paths = channel.open().unwrap();

    channel.request_start();
    assert_eq!(drain(&paths.control), b"enable\n");

    channel.request_stop();
    assert_eq!(drain(&paths.control), b"stop\n");
}

#[tokio::test]
async fn test_ack_emits_started_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut channel = ControlChannel::new(FifoLocation::in_dir(dir.path()));
    let paths = channel.open().unwrap();

    channel.request_start();
    assert!(channel.has_pending_ack());

    send_ack(&paths.ack, b"ack\n");
    assert_eq!(next_event(&mut channel, Duration::from_secs(5)).await, Some(ChannelEvent::Started));
    assert!(!channel.has_pending_ack());

    // The watch is one-shot
    send_ack(&paths.ack, b"ack\n");
    assert_eq!(next_event(&mut channel, Duration::from_millis(200)).await, None);
}

#[tokio::test]
async fn test_restart_replaces_pending_watch() {
    let dir = tempfile::tempdir().unwrap();
    let mut channel = ControlChannel::new(FifoLocation::in_dir(dir.path()));
    let paths = channel.open().unwrap();

    channel.request_start();
    channel.request_start();

    send_ack(&paths.ack, b"ack\n");
    assert_eq!(next_event(&mut channel, Duration::from_secs(5)).await, Some(ChannelEvent::Started));
    assert_eq!(next_event(&mut channel, Duration::from_millis(200)).await, None);
}

#[tokio::test]
async fn test_writer_hangup_without_data_keeps_waiting() {
    let dir = tempfile::tempdir().unwrap();
    let mut channel = ControlChannel::new(FifoLocation::in_dir(dir.path()));
    let paths = channel.open().unwrap();

    channel.request_start();

    // A writer that opens and closes without writing, like a recorder that
    // died after opening its FIFOs
    send_ack(&paths.ack, b"");
    let before = thread_cpu_ticks();
    assert_eq!(next_event(&mut channel, Duration::from_millis(500)).await, None);
    let spent = thread_cpu_ticks() - before;
    // A reader stuck on hangup readiness burns the whole half second
    assert!(spent < 20, "waiting on the ack fifo used {spent} ticks of CPU");
    assert!(channel.has_pending_ack());

    send_ack(&paths.ack, b"ack\n");
    assert_eq!(next_event(&mut channel, Duration::from_secs(5)).await, Some(ChannelEvent::Started));
}

#[tokio::test]
async fn test_close_disarms_pending_watch() {
    let dir = tempfile::tempdir().unwrap();
    let mut channel = ControlChannel::new(FifoLocation::in_dir(dir.path()));
    channel.open().unwrap();

    channel.request_start();
    channel.close();

    assert!(!channel.has_pending_ack());
    assert_eq!(next_event(&mut channel, Duration::from_millis(200)).await, None);
}

#[tokio::test]
async fn test_oversized_ack_still_starts_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut channel = ControlChannel::new(FifoLocation::in_dir(dir.path()));
    let paths = channel.open().unwrap();

    channel.request_start();
    send_ack(&paths.ack, b"acknowledged, sampling enabled\n");

    assert_eq!(next_event(&mut channel, Duration::from_secs(5)).await, Some(ChannelEvent::Started));
    assert_eq!(next_event(&mut channel, Duration::from_millis(200)).await, None);
}

#[tokio::test]
async fn test_close_releases_descriptors_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let mut channel = ControlChannel::new(FifoLocation::in_dir(dir.path()));
    let first = channel.open().unwrap();
    channel.request_start();
    assert!(open_descriptors(&first.ack) > 0);
    assert!(open_descriptors(&first.control) > 0);

    let second = channel.open().unwrap();
    assert_eq!(open_descriptors(&first.ack), 0);
    assert_eq!(open_descriptors(&first.control), 0);

    channel.close();
    assert_eq!(open_descriptors(&second.ack), 0);
    assert_eq!(open_descriptors(&second.control), 0);
}

#[test]
fn test_commands_after_open_need_no_runtime_context() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let mut channel = ControlChannel::new(FifoLocation::in_dir(dir.path()));
    let paths = runtime.block_on(async { channel.open() }).unwrap();

    channel.request_start();
    assert!(channel.has_pending_ack());
    assert_eq!(drain(&paths.control), b"enable\n");

    send_ack(&paths.ack, b"ack\n");
    let event = runtime.block_on(next_event(&mut channel, Duration::from_secs(5)));
    assert_eq!(event, Some(ChannelEvent::Started));

    channel.request_stop();
    channel.close();
    assert!(dir_is_empty(dir.path()));
}
