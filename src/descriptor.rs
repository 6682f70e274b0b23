//! Descriptor-level I/O helpers.
//!
//! [`write_fully`] pushes an entire buffer through a writer, retrying while
//! the kernel reports a transient condition. [`open_append`] opens log files
//! in write/append/create mode with `0644` permissions on unix.

use std::{
    fs::{File, OpenOptions},
    io::{self, ErrorKind, Write},
    path::Path,
    thread,
};

/// Permission bits applied to files created by the crate.
#[cfg(unix)]
pub(crate) const LOG_FILE_MODE: u32 = 0o644;

/// Consecutive transient failures tolerated before a write gives up.
///
/// The budget resets whenever the writer makes progress.
pub(crate) const MAX_TRANSIENT_RETRIES: usize = 128;

/// Open `path` for appending, creating it when missing.
pub(crate) fn open_append(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(LOG_FILE_MODE);
    }
    options.open(path)
}

fn is_transient(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock)
}

/// Write every byte of `buf` to `writer`.
///
/// `Interrupted` and `WouldBlock` are retried up to
/// [`MAX_TRANSIENT_RETRIES`] times in a row. Any other error, or a writer
/// that accepts zero bytes, fails the call.
pub(crate) fn write_fully<W>(writer: &mut W, mut buf: &[u8]) -> io::Result<()>
where
    W: Write + ?Sized,
{
    let mut transient = 0;
    while !buf.is_empty() {
        match writer.write(buf) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "descriptor accepted zero bytes",
                ));
            }
            Ok(written) => {
                buf = &buf[written..];
                transient = 0;
            }
            Err(err) if is_transient(&err) => {
                transient += 1;
                if transient > MAX_TRANSIENT_RETRIES {
                    return Err(err);
                }
                if err.kind() == ErrorKind::WouldBlock {
                    thread::yield_now();
                }
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
