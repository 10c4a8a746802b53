// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Errors that can occur in the blocking engine and file deduplicator.
#[derive(Debug)]
pub enum Error {
    /// I/O error, usually from reading a file during a digest computation
    /// or from walking a directory tree.
    Io(std::io::Error),

    /// The blocking configuration passed to [`crate::Engine::new`] was
    /// malformed (a factory did not yield callable blocking functions, or
    /// a configuration item was neither a function nor a factory).
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Engine/file-deduplicator result type.
pub type Result<T> = std::result::Result<T, Error>;
