//! Declarative registry setup.
//!
//! A [`RegistryConfig`] lists named sinks in registration order together
//! with registry-wide settings. It can be built in code or parsed from an
//! INI document with the `rust-ini` crate:
//!
//! ```ini
//! [registry]
//! warn_interval_secs = 5
//!
//! [sink.app]
//! kind = rotating
//! basename = /var/log/app
//! max_lines = 10000
//!
//! [sink.audit]
//! kind = file
//! path = /var/log/audit.log
//! ```
//!
//! Supported kinds are `file`, `rotating`, `stdout` and `stderr`. Sections
//! other than `[registry]` and `[sink.*]` are ignored.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use ini::{Ini, Properties};
use log::debug;

use crate::{
    error::{ConfigError, SinkError},
    rate_limited_warner::DEFAULT_WARN_INTERVAL,
    registry::{SinkHandle, SinkRegistry},
};

const REGISTRY_SECTION: &str = "registry";
const SINK_PREFIX: &str = "sink.";

/// Destination of one configured sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkSpec {
    File { path: PathBuf },
    Rotating { basename: PathBuf, max_lines: usize },
    Stdout,
    Stderr,
}

/// A named sink in a [`RegistryConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkEntry {
    pub name: String,
    pub spec: SinkSpec,
}

/// Settings and sinks used to build a [`SinkRegistry`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Minimum time between two warnings about failed asynchronous writes.
    pub warn_interval: Duration,
    /// Sinks in registration order.
    pub sinks: Vec<SinkEntry>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            warn_interval: DEFAULT_WARN_INTERVAL,
            sinks: Vec::new(),
        }
    }
}

impl RegistryConfig {
    pub fn with_warn_interval(mut self, interval: Duration) -> Self {
        self.warn_interval = interval;
        self
    }

    pub fn with_sink(mut self, name: impl Into<String>, spec: SinkSpec) -> Self {
        self.sinks.push(SinkEntry {
            name: name.into(),
            spec,
        });
        self
    }

    /// Parse a configuration from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        Self::from_ini(&ini)
    }

    /// Read and parse an INI file.
    pub fn from_ini_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ini_str(&text)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for (section, props) in ini.iter() {
            let Some(section) = section else {
                continue;
            };
            if section == REGISTRY_SECTION {
                if let Some(secs) = parse_number::<u64>(section, props, "warn_interval_secs")? {
                    config.warn_interval = Duration::from_secs(secs);
                }
            } else if let Some(name) = section.strip_prefix(SINK_PREFIX) {
                let spec = parse_sink(section, props)?;
                config = config.with_sink(name, spec);
            } else {
                debug!("femtosink config: ignoring section [{section}]");
            }
        }
        Ok(config)
    }
}

fn required<'a>(
    section: &str,
    props: &'a Properties,
    key: &'static str,
) -> Result<&'a str, ConfigError> {
    props.get(key).ok_or_else(|| ConfigError::MissingKey {
        section: section.to_owned(),
        key,
    })
}

fn parse_number<T: std::str::FromStr>(
    section: &str,
    props: &Properties,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    props
        .get(key)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                section: section.to_owned(),
                key,
                value: value.to_owned(),
            })
        })
        .transpose()
}

fn parse_sink(section: &str, props: &Properties) -> Result<SinkSpec, ConfigError> {
    let kind = required(section, props, "kind")?;
    match kind.trim().to_ascii_lowercase().as_str() {
        "file" => Ok(SinkSpec::File {
            path: PathBuf::from(required(section, props, "path")?),
        }),
        "rotating" => {
            let basename = PathBuf::from(required(section, props, "basename")?);
            let max_lines = parse_number(section, props, "max_lines")?.ok_or_else(|| {
                ConfigError::MissingKey {
                    section: section.to_owned(),
                    key: "max_lines",
                }
            })?;
            Ok(SinkSpec::Rotating {
                basename,
                max_lines,
            })
        }
        "stdout" => Ok(SinkSpec::Stdout),
        "stderr" => Ok(SinkSpec::Stderr),
        _ => Err(ConfigError::UnknownKind {
            section: section.to_owned(),
            kind: kind.to_owned(),
        }),
    }
}

impl SinkRegistry {
    /// Build a registry and register every configured sink in order.
    ///
    /// Returns the registry with each sink's name and handle. If any sink
    /// fails to open, the sinks registered so far are closed and the error
    /// is returned.
    pub fn from_config(
        config: &RegistryConfig,
    ) -> Result<(Self, Vec<(String, SinkHandle)>), SinkError> {
        let registry = Self::with_warn_interval(config.warn_interval);
        let mut handles = Vec::with_capacity(config.sinks.len());
        for entry in &config.sinks {
            let handle = registry.register_spec(&entry.spec)?;
            handles.push((entry.name.clone(), handle));
        }
        Ok((registry, handles))
    }

    fn register_spec(&self, spec: &SinkSpec) -> Result<SinkHandle, SinkError> {
        match spec {
            SinkSpec::File { path } => self.register_file(path),
            SinkSpec::Rotating {
                basename,
                max_lines,
            } => self.register_rotating(basename, *max_lines),
            #[cfg(unix)]
            SinkSpec::Stdout => self.register_descriptor(std::io::stdout()),
            #[cfg(unix)]
            SinkSpec::Stderr => self.register_descriptor(std::io::stderr()),
            #[cfg(not(unix))]
            SinkSpec::Stdout | SinkSpec::Stderr => Err(SinkError::InvalidConfig(
                "descriptor sinks require a unix platform".into(),
            )),
        }
    }
}
