//! Error type shared by every stream, scope and process operation.

use std::io;
use std::path::PathBuf;

/// Hard failures surfaced to whoever drives a stream.
///
/// Conditions that are not errors (unreadable directory, matcher miss,
/// non-text path, early abandonment, non-zero exit status) never show up here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to read directory {}: {source}", path.display())]
    ReadDir { path: PathBuf, source: io::Error },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn { command: String, source: io::Error },

    #[error("failed to create temporary {kind}: {source}")]
    TempResource { kind: &'static str, source: io::Error },

    /// The stdin feeder of a process pipe failed; raised only after the
    /// process wait has resolved.
    #[error("feeder for `{command}` failed: {source}")]
    Feeder { command: String, source: Box<Error> },

    #[error("background task `{0}` panicked")]
    TaskPanicked(String),

    #[error("config parse error in {}: {source}", path.display())]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the error is a write into a pipe whose reader has gone away.
    pub fn is_broken_pipe(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == io::ErrorKind::BrokenPipe,
            Error::Feeder { source, .. } => source.is_broken_pipe(),
            _ => false,
        }
    }
}
