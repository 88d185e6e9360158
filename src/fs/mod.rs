//! Filesystem collaborator calls used by the stream core.
//!
//! These are thin, synchronous pass-throughs to `std::fs` and
//! `std::env`. The working-directory functions ([`cd`], [`pwd`], [`pushd`])
//! touch process-wide state with no locking of their own: concurrent callers
//! race, and must serialize among themselves.

pub mod dir;

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::scope::ScopedResource;

/// How [`open`] opens a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    /// Create or truncate.
    Write,
    /// Create or append.
    Append,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Read => "read",
            Mode::Write => "write",
            Mode::Append => "append",
        }
    }
}

pub fn open(path: &Path, mode: Mode) -> Result<File> {
    let mut options = OpenOptions::new();
    match mode {
        Mode::Read => options.read(true),
        Mode::Write => options.write(true).create(true).truncate(true),
        Mode::Append => options.append(true).create(true),
    };
    options.open(path).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Text form of a path; `None` when it is not valid UTF-8.
pub fn to_text(path: &Path) -> Option<&str> {
    path.to_str()
}

/// True for directories, following symlinks.
pub fn is_directory(path: &Path) -> bool {
    path.metadata().is_ok_and(|m| m.is_dir())
}

/// True for directories that are not reached through a symlink.
pub fn is_real_directory(path: &Path) -> bool {
    path.symlink_metadata().is_ok_and(|m| m.is_dir())
}

/// True for regular files, following symlinks.
pub fn is_file(path: &Path) -> bool {
    path.metadata().is_ok_and(|m| m.is_file())
}

/// Change the process working directory.
pub fn cd(path: &Path) -> Result<()> {
    std::env::set_current_dir(path).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("cd {}", path.display());
    Ok(())
}

/// The process working directory.
pub fn pwd() -> Result<PathBuf> {
    Ok(std::env::current_dir()?)
}

/// Change into `path` for the life of the returned scope, then change back.
pub fn pushd(path: &Path) -> Result<ScopedResource<PathBuf>> {
    let previous = pwd()?;
    cd(path)?;
    let label = format!("pushd {}", path.display());
    Ok(ScopedResource::acquire(label, path.to_path_buf(), move |_| {
        if let Err(e) = cd(&previous) {
            log::warn!("failed to restore working directory: {e}");
        }
    }))
}
