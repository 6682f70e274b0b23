//! A single log destination and its write path.
//!
//! A [`Sink`] owns one writable file, an optional [`RotationPolicy`] and a
//! group of outstanding asynchronous writers. One `parking_lot::Mutex`
//! guards the file and rotation state together, so a record and any rollover
//! it triggers are applied atomically with respect to every other writer,
//! synchronous or not.
//!
//! Closing a sink first refuses new asynchronous writes and joins the ones in
//! flight, then takes the destination out from under the lock.

mod failure;
mod tasks;

pub use failure::ErrorHook;
pub(crate) use failure::FailureReporter;

use std::{fs::File, path::PathBuf, sync::Arc};

#[cfg(unix)]
use std::os::fd::BorrowedFd;

use log::debug;
use parking_lot::Mutex;

use self::tasks::{DispatchError, TaskGroup};
use crate::{
    descriptor::{open_append, write_fully},
    error::SinkError,
    registry::SinkHandle,
    rotation::RotationPolicy,
};

/// Where a new sink writes its records.
#[derive(Debug)]
pub enum SinkSource<'fd> {
    /// An already open descriptor. The caller keeps ownership; the sink
    /// writes through its own duplicate and never closes the original.
    #[cfg(unix)]
    Descriptor(BorrowedFd<'fd>),
    /// A file opened in append/create mode and owned by the sink.
    File(PathBuf),
    /// A numbered sequence `"<basename>-<N>.log"` rolled over every
    /// `max_lines` records.
    Rotating { basename: PathBuf, max_lines: usize },
    #[doc(hidden)]
    #[cfg(not(unix))]
    _Phantom(std::marker::PhantomData<&'fd ()>),
}

/// Whether the sink opened its destination itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Borrowed,
}

/// An opened destination, ready to be installed in a sink.
pub(crate) struct Destination {
    file: File,
    ownership: Ownership,
    rotation: Option<RotationPolicy>,
}

impl Destination {
    /// Open `source`. No registry state is touched here, so a failure
    /// leaves nothing to undo.
    pub(crate) fn open(source: SinkSource<'_>) -> Result<Self, SinkError> {
        match source {
            #[cfg(unix)]
            SinkSource::Descriptor(fd) => {
                let owned = fd
                    .try_clone_to_owned()
                    .map_err(|err| SinkError::open_failed(format!("descriptor {fd:?}"), err))?;
                Ok(Self {
                    file: File::from(owned),
                    ownership: Ownership::Borrowed,
                    rotation: None,
                })
            }
            SinkSource::File(path) => {
                let file = open_append(&path)
                    .map_err(|err| SinkError::open_failed(path.display().to_string(), err))?;
                Ok(Self {
                    file,
                    ownership: Ownership::Owned,
                    rotation: None,
                })
            }
            SinkSource::Rotating {
                basename,
                max_lines,
            } => {
                let (policy, file) = RotationPolicy::open(basename, max_lines)?;
                Ok(Self {
                    file,
                    ownership: Ownership::Owned,
                    rotation: Some(policy),
                })
            }
            #[cfg(not(unix))]
            SinkSource::_Phantom(_) => unreachable!("placeholder variant is never constructed"),
        }
    }
}

struct SinkState {
    file: File,
    rotation: Option<RotationPolicy>,
}

impl SinkState {
    /// Append `text` and a terminator as one buffer, advancing rotation.
    ///
    /// A failed rollover still writes the record to the previous file and
    /// then reports [`SinkError::RotationFailed`].
    fn write_record(&mut self, text: &str) -> Result<(), SinkError> {
        let mut record = String::with_capacity(text.len() + 1);
        record.push_str(text);
        record.push('\n');

        let rollover = match self.rotation.as_mut() {
            Some(policy) => policy.before_write(&mut self.file),
            None => Ok(false),
        };
        write_fully(&mut self.file, record.as_bytes()).map_err(SinkError::WriteFailed)?;
        if let Some(policy) = self.rotation.as_mut() {
            policy.on_line_written();
        }
        rollover.map(|_| ())
    }
}

/// One managed log destination.
pub struct Sink {
    handle: SinkHandle,
    ownership: Ownership,
    state: Mutex<Option<SinkState>>,
    tasks: TaskGroup,
    reporter: Arc<FailureReporter>,
}

impl Sink {
    pub(crate) fn new(
        handle: SinkHandle,
        destination: Destination,
        reporter: Arc<FailureReporter>,
    ) -> Self {
        let Destination {
            file,
            ownership,
            rotation,
        } = destination;
        Self {
            handle,
            ownership,
            state: Mutex::new(Some(SinkState { file, rotation })),
            tasks: TaskGroup::new(),
            reporter,
        }
    }

    /// Handle this sink was registered under.
    pub fn handle(&self) -> SinkHandle {
        self.handle
    }

    /// Write `text` as one record on the calling thread.
    ///
    /// Blocks until the sink lock is available. A line terminator is always
    /// appended.
    pub fn write_sync(&self, text: &str) -> Result<(), SinkError> {
        let mut guard = self.state.lock();
        let state = guard
            .as_mut()
            .ok_or(SinkError::AlreadyClosed(self.handle))?;
        state.write_record(text)
    }

    /// Dispatch `text` to a background writer and return immediately.
    ///
    /// The writer contends for the same lock as [`write_sync`](Self::write_sync);
    /// ordering against other writers is lock acquisition order. Its outcome
    /// is never returned: failures are logged and passed to the registry's
    /// error hook. Only dispatch itself can fail.
    pub fn write_async(self: &Arc<Self>, text: impl Into<String>) -> Result<(), SinkError> {
        let sink = Arc::clone(self);
        let text = text.into();
        let name = format!("femtosink-{}", self.handle);
        self.tasks
            .spawn(name, move || {
                if let Err(err) = sink.write_sync(&text) {
                    sink.reporter.report(sink.handle, &err);
                }
            })
            .map_err(|err| match err {
                DispatchError::Closed => SinkError::AlreadyClosed(self.handle),
                DispatchError::Spawn(io) => SinkError::WriteFailed(io),
            })
    }

    /// Drain outstanding writers, then release the destination.
    ///
    /// Owned files are closed; a borrowed descriptor only loses the sink's
    /// duplicate. Closing twice reports [`SinkError::AlreadyClosed`].
    pub(crate) fn close(&self) -> Result<(), SinkError> {
        if self.tasks.is_closed() {
            return Err(SinkError::AlreadyClosed(self.handle));
        }
        let panicked = self.tasks.close_and_join();
        let state = self.state.lock().take();
        let Some(SinkState { file, rotation }) = state else {
            return Err(SinkError::AlreadyClosed(self.handle));
        };
        drop(file);
        if let Some(policy) = rotation {
            debug!(
                "femtosink: sink {} closed at {}",
                self.handle,
                policy.current_path().display()
            );
        }
        if panicked > 0 {
            return Err(SinkError::WorkerPanicked(panicked));
        }
        Ok(())
    }

    /// `true` once a close has begun, even while writers are still draining.
    pub(crate) fn is_closing(&self) -> bool {
        self.tasks.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().is_none()
    }

    /// `true` when the sink opened its destination and will close it.
    pub fn owns_destination(&self) -> bool {
        self.ownership == Ownership::Owned
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Asynchronous writes dispatched but not yet finished.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.pending()
    }

    /// Copy of the rotation position, if this is an open rotating sink.
    pub fn rotation_snapshot(&self) -> Option<RotationPolicy> {
        self.state
            .lock()
            .as_ref()
            .and_then(|state| state.rotation.clone())
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("handle", &self.handle)
            .field("ownership", &self.ownership)
            .field("closed", &self.is_closed())
            .finish()
    }
}
