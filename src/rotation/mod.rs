//! Line-count based rotation over a numbered file sequence.
//!
//! A rotating sink writes to `"<basename>-<index>.log"`, starting at index 0.
//! When a file holds `max_lines` records the next write rolls over to
//! `index + 1`. Nothing besides the log files is persisted: on start-up the
//! policy rediscovers its position by counting the newline-terminated lines
//! already present in each file of the sequence.

use std::{
    ffi::OsString,
    fs::File,
    io::{self, BufRead, BufReader, ErrorKind},
    path::{Path, PathBuf},
};

use log::{debug, warn};

use crate::{descriptor::open_append, error::SinkError};

/// Position of a rotating sink within its numbered file sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotationPolicy {
    basename: PathBuf,
    max_lines: usize,
    index: usize,
    lines: usize,
}

impl RotationPolicy {
    /// Locate the file a rotating sink should append to and open it.
    ///
    /// Scans `"<basename>-0.log"`, `"<basename>-1.log"`, ... and resumes at
    /// the first file holding fewer than `max_lines` lines. A missing file is
    /// created empty at that index.
    pub fn open(basename: impl Into<PathBuf>, max_lines: usize) -> Result<(Self, File), SinkError> {
        if max_lines == 0 {
            return Err(SinkError::InvalidConfig(
                "max_lines must be greater than zero".into(),
            ));
        }
        let basename = basename.into();
        let mut index = 0;
        loop {
            let path = Self::path_for(&basename, index);
            let lines = match count_lines(&path) {
                Ok(lines) if lines >= max_lines => {
                    index += 1;
                    continue;
                }
                Ok(lines) => lines,
                Err(err) if err.kind() == ErrorKind::NotFound => 0,
                Err(err) => return Err(SinkError::open_failed(path.display().to_string(), err)),
            };
            let file = open_append(&path)
                .map_err(|err| SinkError::open_failed(path.display().to_string(), err))?;
            debug!("rotation: resuming {} at line {lines}", path.display());
            let policy = Self {
                basename,
                max_lines,
                index,
                lines,
            };
            return Ok((policy, file));
        }
    }

    /// Build the file name for `index` within the sequence of `basename`.
    pub fn path_for(basename: &Path, index: usize) -> PathBuf {
        let mut name = OsString::from(basename.as_os_str());
        name.push(format!("-{index}.log"));
        PathBuf::from(name)
    }

    /// Roll over to the next file if the current one is full.
    ///
    /// Must be called with the sink lock held, before the record is written.
    /// Returns `Ok(true)` when `file` was replaced. On failure the policy and
    /// `file` still point at the last successfully opened file.
    pub(crate) fn before_write(&mut self, file: &mut File) -> Result<bool, SinkError> {
        if self.lines < self.max_lines {
            return Ok(false);
        }
        let next = Self::path_for(&self.basename, self.index + 1);
        match open_append(&next) {
            Ok(fresh) => {
                // dropping the previous handle closes it
                *file = fresh;
                self.index += 1;
                self.lines = 0;
                debug!("rotation: rolled over to {}", next.display());
                Ok(true)
            }
            Err(source) => {
                warn!(
                    "rotation: failed to open {}: {source}; staying on {}",
                    next.display(),
                    self.current_path().display()
                );
                Err(SinkError::RotationFailed { path: next, source })
            }
        }
    }

    /// Account for one record appended to the current file.
    pub(crate) fn on_line_written(&mut self) {
        self.lines += 1;
    }

    /// Path of the file currently receiving records.
    pub fn current_path(&self) -> PathBuf {
        Self::path_for(&self.basename, self.index)
    }

    pub fn basename(&self) -> &Path {
        &self.basename
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Records written to the current file, including those found on open.
    pub fn line_count(&self) -> usize {
        self.lines
    }
}

/// Count newline bytes in `path`. A trailing unterminated line is ignored.
fn count_lines(path: &Path) -> io::Result<usize> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut lines = 0;
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            return Ok(lines);
        }
        lines += chunk.iter().filter(|&&b| b == b'\n').count();
        let consumed = chunk.len();
        reader.consume(consumed);
    }
}
