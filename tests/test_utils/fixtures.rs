//! Fixtures and file helpers shared by the integration tests.

use std::fs;
use std::path::{Path, PathBuf};

use femtosink::RotationPolicy;
use rstest::fixture;
use tempfile::TempDir;

/// Fresh temporary directory removed when the test finishes.
#[fixture]
pub fn log_dir() -> TempDir {
    tempfile::tempdir().expect("create temporary log directory")
}

/// Read `path` and split it into records.
pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("read {}: {err}", path.display()))
        .lines()
        .map(str::to_owned)
        .collect()
}

/// Every existing file of the rotation sequence for `basename`, in index
/// order.
#[allow(dead_code)]
pub fn rotated_files(basename: &Path) -> Vec<PathBuf> {
    (0..)
        .map(|index| RotationPolicy::path_for(basename, index))
        .take_while(|path| path.exists())
        .collect()
}
