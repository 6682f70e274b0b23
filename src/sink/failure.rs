//! Reporting for asynchronous write failures.
//!
//! An asynchronous write cannot hand its result back to the caller. Failures
//! are instead counted per category and logged with rate-limited warnings,
//! and forwarded to an optional [`ErrorHook`] installed on the registry.

use std::{sync::Arc, time::Duration};

use log::warn;
use parking_lot::RwLock;

use crate::{error::SinkError, rate_limited_warner::RateLimitedWarner, registry::SinkHandle};

/// Callback receiving every failed asynchronous write.
///
/// Runs on the writer thread after the sink lock has been released.
pub type ErrorHook = Arc<dyn Fn(SinkHandle, &SinkError) + Send + Sync>;

/// Categorises why an asynchronous write failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FailureKind {
    Write,
    Rotation,
    Closed,
}

impl FailureKind {
    fn of(err: &SinkError) -> Self {
        match err {
            SinkError::RotationFailed { .. } => Self::Rotation,
            SinkError::AlreadyClosed(_) | SinkError::InvalidHandle(_) => Self::Closed,
            _ => Self::Write,
        }
    }
}

/// Shared by every sink of one registry.
pub(crate) struct FailureReporter {
    write: RateLimitedWarner,
    rotation: RateLimitedWarner,
    closed: RateLimitedWarner,
    hook: RwLock<Option<ErrorHook>>,
}

impl FailureReporter {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            write: RateLimitedWarner::new(interval),
            rotation: RateLimitedWarner::new(interval),
            closed: RateLimitedWarner::new(interval),
            hook: RwLock::new(None),
        }
    }

    pub(crate) fn set_hook(&self, hook: Option<ErrorHook>) {
        *self.hook.write() = hook;
    }

    pub(crate) fn report(&self, handle: SinkHandle, err: &SinkError) {
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook(handle, err);
        }
        match FailureKind::of(err) {
            FailureKind::Write => {
                self.write.record();
                self.write.warn_if_due(|count| {
                    warn!("femtosink: {count} asynchronous write(s) failed on sink {handle}: {err}");
                });
            }
            FailureKind::Rotation => {
                self.rotation.record();
                self.rotation.warn_if_due(|count| {
                    warn!("femtosink: {count} rollover(s) failed on sink {handle}: {err}");
                });
            }
            FailureKind::Closed => {
                self.closed.record();
                self.closed.warn_if_due(|count| {
                    warn!("femtosink: {count} asynchronous write(s) hit closed sink {handle}");
                });
            }
        }
    }

    /// Emit any warnings still held back by the rate limit.
    pub(crate) fn flush(&self) {
        self.write.flush(|count| {
            warn!("femtosink: {count} asynchronous write(s) failed");
        });
        self.rotation.flush(|count| {
            warn!("femtosink: {count} rollover(s) failed");
        });
        self.closed.flush(|count| {
            warn!("femtosink: {count} asynchronous write(s) hit a closed sink");
        });
    }
}
