//! Error types shared by the agent and the relay server.

use std::io;

use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Violations of the SOCKS5 CONNECT framing. All of them are terminal for the
/// connection they were read from.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("socks version {0} not supported")]
    UnsupportedVersion(u8),

    #[error("socks command {0} not supported")]
    UnsupportedCommand(u8),

    #[error("socks address type {0} not supported")]
    UnsupportedAddressType(u8),

    /// More bytes arrived than a single request occupies.
    #[error("socks request got extra data: expected {expected} bytes, got {actual}")]
    ExtraData { expected: usize, actual: usize },
}

/// Errors that end a single session.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Outbound connect failed.
    #[error("dial {target}: {source}")]
    Dial {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("network error: {0}")]
    Network(#[from] io::Error),
}

impl Error {
    /// Create a dial error for `target`.
    pub fn dial(target: impl Into<String>, source: io::Error) -> Self {
        Error::Dial {
            target: target.into(),
            source,
        }
    }

    /// Returns the protocol violation, if this is one.
    pub fn protocol(&self) -> Option<ProtocolError> {
        match self {
            Error::Protocol(e) => Some(*e),
            _ => None,
        }
    }

    /// Check if this is a dial that failed because the process or the system
    /// ran out of file descriptors.
    pub fn is_resource_exhausted(&self) -> bool {
        match self {
            Error::Dial { source, .. } => is_fd_exhaustion(source),
            _ => false,
        }
    }
}

#[cfg(unix)]
fn is_fd_exhaustion(e: &io::Error) -> bool {
    // EMFILE: per-process limit, ENFILE: system-wide limit
    matches!(e.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE))
}

#[cfg(not(unix))]
fn is_fd_exhaustion(e: &io::Error) -> bool {
    e.to_string().to_lowercase().contains("too many open files")
}
