//! Touch input module: event classification and the evdev device source.
//!
//! Raw records are read from a Linux input device node opened non-blocking.
//! Readiness is awaited through tokio's `AsyncFd`, so a wait with a timeout is
//! a single epoll wait underneath.

use crate::error::InputError;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::time::Duration;
use tokio::io::unix::{AsyncFd, AsyncFdReadyGuard};
use tokio::io::Interest;

/// Event type for key/button events (linux/input-event-codes.h).
pub const EV_KEY: u16 = 0x01;
/// Event type for absolute axis events.
pub const EV_ABS: u16 = 0x03;

pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;
pub const ABS_MT_POSITION_X: u16 = 0x35;
pub const ABS_MT_POSITION_Y: u16 = 0x36;

/// Primary touch contact button.
pub const BTN_TOUCH: u16 = 0x14a;

/// Size of one kernel `struct input_event` record.
pub const RECORD_SIZE: usize = std::mem::size_of::<libc::input_event>();

/// Records fetched per read call while draining.
const READ_BATCH: usize = 64;

/// One decoded input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    #[cfg(test)]
    pub fn new(kind: u16, code: u16, value: i32) -> Self {
        Self { kind, code, value }
    }

    /// Whether this event counts as touch activity.
    ///
    /// Position motion on any touch axis counts, and so does a touch button
    /// press. A touch button release does not: lifting the finger must not
    /// refresh the idle timer.
    pub fn is_touch_signal(&self) -> bool {
        match self.kind {
            EV_ABS => matches!(
                self.code,
                ABS_X | ABS_Y | ABS_MT_POSITION_X | ABS_MT_POSITION_Y
            ),
            EV_KEY => self.code == BTN_TOUCH && self.value != 0,
            _ => false,
        }
    }
}

impl From<libc::input_event> for InputEvent {
    fn from(raw: libc::input_event) -> Self {
        Self {
            kind: raw.type_,
            code: raw.code,
            value: raw.value,
        }
    }
}

/// Decode a buffer of whole `input_event` records.
///
/// A buffer that is not a whole number of records is rejected as a unit.
pub fn decode_events(buf: &[u8]) -> Result<Vec<InputEvent>, InputError> {
    if buf.len() % RECORD_SIZE != 0 {
        return Err(InputError::PartialRead {
            len: buf.len(),
            record_size: RECORD_SIZE,
        });
    }

    Ok(buf
        .chunks_exact(RECORD_SIZE)
        .map(|chunk| {
            // SAFETY: chunk is exactly RECORD_SIZE bytes and input_event is a
            // plain C struct valid for any bit pattern; read_unaligned makes no
            // alignment assumption about the byte buffer.
            let raw = unsafe { std::ptr::read_unaligned(chunk.as_ptr() as *const libc::input_event) };
            InputEvent::from(raw)
        })
        .collect())
}

/// Outcome of one readiness wait.
#[derive(Debug, Default)]
pub struct Drained {
    /// Whether the wait ended on readiness rather than the timeout.
    pub woke: bool,
    /// Events read before the device would block or a read failed.
    pub events: Vec<InputEvent>,
    /// Error that cut the drain short; its read was discarded.
    pub error: Option<InputError>,
}

/// Non-blocking touch device registered for readiness notification.
pub struct TouchDevice {
    fd: AsyncFd<File>,
}

impl TouchDevice {
    /// Open an input device node read-only and non-blocking.
    pub fn open(path: &Path) -> Result<Self, InputError> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(path)
            .map_err(|e| InputError::OpenFailed {
                path: path.display().to_string(),
                source: e,
            })?;
        Self::from_file(file)
    }

    /// Wrap an already open readable file, switching it to non-blocking mode.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_file(file: File) -> Result<Self, InputError> {
        set_nonblocking(&file).map_err(InputError::ReadinessFailed)?;
        // SAFETY: the AsyncFd owns `file`, so its descriptor stays open and
        // unchanged until the AsyncFd is dropped.
        let fd = unsafe { AsyncFd::register_with_interest(file, Interest::READABLE) }
            .map_err(|e| InputError::ReadinessFailed(e.into_parts().1))?;
        Ok(Self { fd })
    }

    /// Wait up to `timeout` for input, then read every pending event until
    /// the device would block.
    pub async fn wait_and_drain(&self, timeout: Duration) -> Drained {
        match tokio::time::timeout(timeout, self.fd.readable()).await {
            Err(_elapsed) => Drained::default(),
            Ok(Err(e)) => Drained {
                woke: true,
                events: Vec::new(),
                error: Some(InputError::ReadinessFailed(e)),
            },
            Ok(Ok(mut guard)) => {
                let (events, error) = drain_ready(&mut guard);
                Drained {
                    woke: true,
                    events,
                    error,
                }
            }
        }
    }
}

fn drain_ready(guard: &mut AsyncFdReadyGuard<'_, File>) -> (Vec<InputEvent>, Option<InputError>) {
    let mut events = Vec::new();
    let mut buf = vec![0u8; RECORD_SIZE * READ_BATCH];

    loop {
        let result = guard.try_io(|inner| {
            let mut file: &File = inner.get_ref();
            file.read(&mut buf)
        });
        match result {
            Ok(Ok(0)) => {
                guard.clear_ready();
                return (events, Some(InputError::EndOfStream));
            }
            Ok(Ok(n)) => match decode_events(&buf[..n]) {
                Ok(batch) => events.extend(batch),
                Err(e) => return (events, Some(e)),
            },
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Ok(Err(e)) => {
                guard.clear_ready();
                return (events, Some(InputError::ReadFailed(e)));
            }
            // Would block: try_io already cleared readiness
            Err(_would_block) => return (events, None),
        }
    }
}

fn set_nonblocking(file: &File) -> std::io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: fd is owned by `file` and stays open for both calls.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
