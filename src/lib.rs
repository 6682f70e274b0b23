//! Embeddable multi-sink line logger.
//!
//! A [`SinkRegistry`] hands out small integer [`SinkHandle`]s for log
//! destinations: a caller-owned descriptor, an append-only file, or a
//! numbered file sequence that rolls over after a fixed number of lines.
//! Records are written synchronously on the caller's thread or dispatched to
//! a background writer; both paths serialise on a per-sink lock, and closing
//! a sink waits for every background writer it dispatched.
//!
//! ```no_run
//! use femtosink::SinkRegistry;
//!
//! # fn main() -> Result<(), femtosink::SinkError> {
//! let registry = SinkRegistry::new();
//! let app = registry.register_rotating("/tmp/app", 10_000)?;
//! registry.write_sync(app, "started")?;
//! registry.write_async(app, "warming caches")?;
//! registry.close(app)?;
//! # Ok(())
//! # }
//! ```

mod config;
mod descriptor;
mod error;
pub mod rate_limited_warner;
mod registry;
mod rotation;
mod sink;

pub use config::{RegistryConfig, SinkEntry, SinkSpec};
pub use error::{ConfigError, SinkError};
pub use registry::{SinkHandle, SinkRegistry};
pub use rotation::RotationPolicy;
pub use sink::{ErrorHook, Ownership, Sink, SinkSource};
