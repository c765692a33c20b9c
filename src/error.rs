//! Error types
//!
//! Connection-level write failures never surface here: they are handled
//! inside the channel that owns the connection. What remains are setup
//! failures that stop a server from starting.

use std::io;
use std::path::PathBuf;

use crate::registry::RegistryError;

/// Result alias for chatter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket creation, bind, or listen failed
    Io(io::Error),
    /// Unix socket path does not fit in `sockaddr_un`
    PathTooLong {
        /// Offending path
        path: PathBuf,
        /// Longest accepted path in bytes
        max: usize,
    },
    /// Invalid server configuration
    Config(String),
    /// Registry operation failed
    Registry(RegistryError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::PathTooLong { path, max } => write!(
                f,
                "Socket path too long ({} bytes, max {}): {}",
                path.as_os_str().len(),
                max,
                path.display()
            ),
            Error::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}
