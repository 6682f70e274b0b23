//! Registry mapping small integer handles to sinks.
//!
//! Slots live in a `Vec` guarded by a single `parking_lot::Mutex`. The lock
//! is held only while allocating, resolving or releasing a slot, never while
//! a sink performs I/O. Writes resolve a handle to an `Arc<Sink>` and drop the
//! registry lock before touching the sink.
//!
//! Closed slots are reused: registration takes the lowest `Empty` slot and
//! only appends when none is free. A slot being drained is marked `Closing`
//! and cannot be handed out until every pending write on its old sink has
//! finished.

use std::{fmt, path::Path, sync::Arc, time::Duration};

#[cfg(unix)]
use std::os::fd::AsFd;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::{
    error::SinkError,
    rate_limited_warner::DEFAULT_WARN_INTERVAL,
    sink::{Destination, ErrorHook, FailureReporter, Sink, SinkSource},
};

/// Identifies a sink within one [`SinkRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkHandle(usize);

impl SinkHandle {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the slot this handle addresses.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for SinkHandle {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for SinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

enum Slot {
    Empty,
    Closing,
    Occupied(Arc<Sink>),
}

/// Owns every registered sink and hands out their handles.
pub struct SinkRegistry {
    slots: Mutex<Vec<Slot>>,
    reporter: Arc<FailureReporter>,
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkRegistry {
    /// Create an empty registry using the default warning interval.
    pub fn new() -> Self {
        Self::with_warn_interval(DEFAULT_WARN_INTERVAL)
    }

    /// Create an empty registry whose asynchronous failure warnings are
    /// emitted at most once per `interval`.
    pub fn with_warn_interval(interval: Duration) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            reporter: Arc::new(FailureReporter::new(interval)),
        }
    }

    /// Install (or clear) the callback receiving failed asynchronous writes.
    pub fn set_error_hook(&self, hook: Option<ErrorHook>) {
        self.reporter.set_hook(hook);
    }

    /// Open `source` and store the resulting sink in a free slot.
    ///
    /// The destination is opened before the slot table is locked, so a
    /// failed open never consumes a slot.
    pub fn register(&self, source: SinkSource<'_>) -> Result<SinkHandle, SinkError> {
        let destination = Destination::open(source)?;
        let mut slots = self.slots.lock();
        let index = slots
            .iter()
            .position(|slot| matches!(slot, Slot::Empty))
            .unwrap_or(slots.len());
        let handle = SinkHandle::new(index);
        let sink = Arc::new(Sink::new(handle, destination, Arc::clone(&self.reporter)));
        if index == slots.len() {
            slots.push(Slot::Occupied(sink));
        } else {
            slots[index] = Slot::Occupied(sink);
        }
        debug!("femtosink: registered sink {handle}");
        Ok(handle)
    }

    /// Register a sink writing through a duplicate of `fd`.
    ///
    /// The caller's descriptor is never closed by the registry.
    #[cfg(unix)]
    pub fn register_descriptor<F: AsFd>(&self, fd: F) -> Result<SinkHandle, SinkError> {
        self.register(SinkSource::Descriptor(fd.as_fd()))
    }

    /// Register a sink appending to `path`, creating it with mode `0644`.
    pub fn register_file<P: AsRef<Path>>(&self, path: P) -> Result<SinkHandle, SinkError> {
        self.register(SinkSource::File(path.as_ref().to_path_buf()))
    }

    /// Register a sink rolling over `"<basename>-<N>.log"` every
    /// `max_lines` records, resuming an existing sequence.
    pub fn register_rotating<P: AsRef<Path>>(
        &self,
        basename: P,
        max_lines: usize,
    ) -> Result<SinkHandle, SinkError> {
        self.register(SinkSource::Rotating {
            basename: basename.as_ref().to_path_buf(),
            max_lines,
        })
    }

    /// Resolve `handle` to its sink.
    pub fn get(&self, handle: SinkHandle) -> Result<Arc<Sink>, SinkError> {
        match self.slots.lock().get(handle.index()) {
            None => Err(SinkError::InvalidHandle(handle)),
            Some(Slot::Empty | Slot::Closing) => Err(SinkError::AlreadyClosed(handle)),
            Some(Slot::Occupied(sink)) if sink.is_closing() => {
                Err(SinkError::AlreadyClosed(handle))
            }
            Some(Slot::Occupied(sink)) => Ok(Arc::clone(sink)),
        }
    }

    /// Write `text` as one record on the calling thread.
    pub fn write_sync(&self, handle: SinkHandle, text: &str) -> Result<(), SinkError> {
        self.get(handle)?.write_sync(text)
    }

    /// Dispatch `text` to a background writer. Only dispatch errors are
    /// reported; see [`Sink::write_async`].
    pub fn write_async(
        &self,
        handle: SinkHandle,
        text: impl Into<String>,
    ) -> Result<(), SinkError> {
        self.get(handle)?.write_async(text)
    }

    /// Drain and close the sink behind `handle`, freeing its slot.
    ///
    /// Closing a handle twice yields [`SinkError::AlreadyClosed`].
    pub fn close(&self, handle: SinkHandle) -> Result<(), SinkError> {
        let sink = {
            let mut slots = self.slots.lock();
            let slot = slots
                .get_mut(handle.index())
                .ok_or(SinkError::InvalidHandle(handle))?;
            match std::mem::replace(slot, Slot::Closing) {
                Slot::Occupied(sink) => sink,
                other => {
                    *slot = other;
                    return Err(SinkError::AlreadyClosed(handle));
                }
            }
        };
        let result = {
            let _release = SlotRelease::new(self, handle);
            sink.close()
        };
        debug!("femtosink: closed sink {handle}");
        result
    }

    fn release(&self, handle: SinkHandle) {
        if let Some(slot) = self.slots.lock().get_mut(handle.index()) {
            *slot = Slot::Empty;
        }
    }

    /// Close every open sink and release the slot table.
    ///
    /// Never stops at the first failure. Returns how many sinks failed to
    /// close cleanly. Afterwards the registry is empty and previously issued
    /// handles are out of range.
    pub fn close_all(&self) -> usize {
        let sinks: Vec<Arc<Sink>> = {
            let mut slots = self.slots.lock();
            slots
                .iter_mut()
                .filter_map(|slot| match std::mem::replace(slot, Slot::Closing) {
                    Slot::Occupied(sink) => Some(sink),
                    other => {
                        *slot = other;
                        None
                    }
                })
                .collect()
        };

        let mut failures = 0;
        for sink in &sinks {
            let _release = SlotRelease::new(self, sink.handle());
            if let Err(err) = sink.close() {
                warn!("femtosink: failed to close sink {}: {err}", sink.handle());
                failures += 1;
            }
        }
        self.reporter.flush();

        let mut slots = self.slots.lock();
        if slots.iter().all(|slot| matches!(slot, Slot::Empty)) {
            *slots = Vec::new();
        }
        failures
    }

    /// Number of slots, open or not.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Number of slots currently holding an open sink.
    pub fn open_count(&self) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|slot| matches!(slot, Slot::Occupied(_)))
            .count()
    }
}

/// Frees a `Closing` slot when dropped, including during unwinding.
struct SlotRelease<'a> {
    registry: &'a SinkRegistry,
    handle: SinkHandle,
}

impl<'a> SlotRelease<'a> {
    fn new(registry: &'a SinkRegistry, handle: SinkHandle) -> Self {
        Self { registry, handle }
    }
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        self.registry.release(self.handle);
    }
}

impl Drop for SinkRegistry {
    fn drop(&mut self) {
        if self.open_count() > 0 {
            let failures = self.close_all();
            if failures > 0 {
                warn!("femtosink: {failures} sink(s) failed to close on drop");
            }
        }
    }
}

impl fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkRegistry")
            .field("slots", &self.len())
            .field("open", &self.open_count())
            .finish()
    }
}

#[cfg(test)]
mod tests;
