//! Safe-path file loading for `include` and `binclude`.
//!
//! The canonical directory of the first file opened establishes a prefix;
//! every subsequently opened path must canonicalize into that prefix or the
//! open is refused. Hosts that load the program file themselves can pin the
//! prefix up front with [`SafePath::pinned`].

use std::fs;
use std::path::{Path, PathBuf};

/// File loader enforcing the canonical-prefix discipline.
#[derive(Debug, Default, Clone)]
pub struct SafePath {
    prefix: Option<PathBuf>,
}

impl SafePath {
    /// Creates an unpinned loader. The first successful [`load`](Self::load)
    /// pins the prefix to that file's canonical parent directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a loader pinned to the given directory.
    #[must_use]
    pub fn pinned(dir: impl Into<PathBuf>) -> Self {
        Self {
            prefix: Some(dir.into()),
        }
    }

    /// Returns the pinned prefix directory, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&Path> {
        self.prefix.as_deref()
    }

    /// Opens and reads a file, pinning or checking the safe prefix.
    ///
    /// # Errors
    ///
    /// Returns a message when the path is not a regular file, cannot be
    /// canonicalized or read, or canonicalizes outside the pinned prefix.
    pub fn load(&mut self, filename: &str) -> Result<Vec<u8>, String> {
        let meta = fs::metadata(filename).map_err(|e| format!("failed to stat {filename}: {e}"))?;
        if !meta.is_file() {
            return Err(format!("not a file: {filename}"));
        }

        let full = fs::canonicalize(filename).map_err(|e| format!("failed to get full path of {filename}: {e}"))?;
        let dir = full
            .parent()
            .ok_or_else(|| format!("invalid path: {}", full.display()))?
            .to_path_buf();

        match &self.prefix {
            Some(prefix) => {
                if !full.starts_with(prefix) {
                    return Err(format!(
                        "file accessed from unsafe path: {} (allowed: {})",
                        full.display(),
                        prefix.display()
                    ));
                }
            }
            None => self.prefix = Some(dir),
        }

        fs::read(&full).map_err(|e| format!("failed to read {filename}: {e}"))
    }
}
