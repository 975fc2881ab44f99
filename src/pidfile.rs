//! Single-instance lock
//!
//! The pid file is created exclusively at startup and removed when the guard
//! drops. A crash leaves it behind; an operator has to remove it before the
//! daemon starts again.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PidFileError {
    #[error("pid file {0} exists, payoutd is already running")]
    AlreadyRunning(String),

    #[error("failed to write pid file {0}: {1}")]
    Io(String, io::Error),
}

#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create `path` holding the current pid, failing if it already exists
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self, PidFileError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(PidFileError::AlreadyRunning(display));
            }
            Err(e) => return Err(PidFileError::Io(display, e)),
        };

        let guard = Self {
            path: path.to_path_buf(),
        };
        write!(file, "{}", std::process::id()).map_err(|e| PidFileError::Io(display, e))?;

        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(
                target: "payoutd::system",
                path = %self.path.display(),
                error = %e,
                "failed to remove pid file"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_writes_pid_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payoutd.pid");

        {
            let lock = PidFile::acquire(&path).unwrap();
            assert_eq!(lock.path(), path.as_path());
            let contents = fs::read_to_string(&path).unwrap();
            assert_eq!(contents, std::process::id().to_string());
        }

        assert!(!path.exists());
    }

    #[test]
    fn test_second_instance_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payoutd.pid");

        let _lock = PidFile::acquire(&path).unwrap();
        assert!(matches!(PidFile::acquire(&path), Err(PidFileError::AlreadyRunning(_))));
        // the refused attempt must not remove the holder's file
        assert!(path.exists());
    }

    #[test]
    fn test_stale_file_blocks_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payoutd.pid");
        fs::write(&path, "12345").unwrap();

        assert!(PidFile::acquire(&path).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "12345");
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("payoutd.pid");

        assert!(matches!(PidFile::acquire(&path), Err(PidFileError::Io(_, _))));
    }
}
