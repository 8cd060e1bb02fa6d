//! Degraded-health marker file.
//!
//! External liveness checks look for the presence of this file; its content
//! does not matter.

use crate::config::CollectorConfig;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const MARKER_CONTENT: &str = "maybe";

#[derive(Debug, Clone)]
pub struct HealthMarker {
    path: Option<PathBuf>,
}

impl HealthMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A marker that never touches the filesystem.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Remove a marker left at the configured path by an earlier run. Runs
    /// whether or not this run keeps a marker.
    pub fn clear_stale(config: &CollectorConfig) -> io::Result<()> {
        Self::new(config.health_file_path.clone()).clear()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_raised(&self) -> bool {
        self.path.as_deref().is_some_and(Path::exists)
    }

    pub fn raise(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, MARKER_CONTENT)
    }

    /// Remove the marker; a missing file is not an error.
    pub fn clear(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
