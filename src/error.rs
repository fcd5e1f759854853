//! Error types for imapfs
//!
//! [`Error`] is what every public filesystem operation returns.
//! [`StoreError`] is what the IMAP primitives raise. A unit of work
//! against the store collects either kind in a [`Failure`], which is
//! translated exactly once, when the unit ends.

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unable to connect to {host}: {message}")]
    RemoteConnection { host: String, message: String },

    #[error("resource '{path}' not found")]
    ResourceNotFound { path: String },

    #[error("imap error on resource '{path}' ({message})")]
    Resource { path: String, message: String },

    #[error("imap error ({0})")]
    OperationFailed(String),

    #[error("path '{path}' should be a directory")]
    DirectoryExpected { path: String },

    #[error("path '{path}' should be a file")]
    FileExpected { path: String },

    #[error("directory '{path}' exists")]
    DirectoryExists { path: String },

    #[error("file '{path}' exists")]
    FileExists { path: String },

    #[error("destination '{path}' exists")]
    DestinationExists { path: String },

    #[error("directory '{path}' is not empty")]
    DirectoryNotEmpty { path: String },

    #[error("root directory may not be removed")]
    RemoveRoot,

    #[error("path '{path}' is invalid: {message}")]
    Path { path: String, message: String },

    #[error("invalid open mode '{0}'")]
    Mode(String),

    #[error("filesystem is closed")]
    FilesystemClosed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("filesystem error ({kind}): {message}")]
    Filesystem { kind: &'static str, message: String },
}

impl Error {
    pub(crate) fn not_found(path: &str) -> Self {
        Self::ResourceNotFound {
            path: path.to_string(),
        }
    }

    /// True for [`Error::ResourceNotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ResourceNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The ways a connection to the store can die.
///
/// Only these justify throwing the cached session away and dialing a
/// new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Socket-level I/O error.
    Socket,
    /// The server closed the session without warning.
    Aborted,
    /// The peer reset the connection.
    Reset,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Socket => "socket",
            Self::Aborted => "session aborted",
            Self::Reset => "connection reset",
        })
    }
}

/// Failure raised by a single store primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} failure: {message}")]
    Transport {
        kind: TransportKind,
        message: String,
    },

    #[error("{0}")]
    Protocol(String),
}

impl StoreError {
    pub(crate) fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let kind = match err.kind() {
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                TransportKind::Reset
            }
            ErrorKind::UnexpectedEof => TransportKind::Aborted,
            _ => TransportKind::Socket,
        };
        Self::transport(kind, err.to_string())
    }
}

impl From<async_imap::error::Error> for StoreError {
    fn from(err: async_imap::error::Error) -> Self {
        use async_imap::error::Error as ImapError;

        match err {
            ImapError::Io(io) => Self::from(io),
            ImapError::ConnectionLost => {
                Self::transport(TransportKind::Aborted, "connection lost")
            }
            other => Self::Protocol(other.to_string()),
        }
    }
}

pub(crate) type StoreResult<T> = std::result::Result<T, StoreError>;

/// Anything that can go wrong inside one unit of work against the
/// store.
#[derive(Debug)]
pub(crate) enum Failure {
    Store(StoreError),
    Fs(Error),
    Other { kind: &'static str, message: String },
}

impl Failure {
    pub(crate) fn other<E: std::error::Error>(err: &E) -> Self {
        Self::Other {
            kind: std::any::type_name::<E>(),
            message: err.to_string(),
        }
    }

    /// True when this is the filesystem's own not-found error.
    pub(crate) fn is_not_found(&self) -> bool {
        matches!(self, Self::Fs(err) if err.is_not_found())
    }

    /// Map into the public taxonomy.
    ///
    /// Order: transport, protocol on a path, protocol without a path,
    /// already a filesystem error, anything else.
    pub(crate) fn translate(self, host: &str, path: Option<&str>) -> Error {
        match self {
            Self::Store(StoreError::Transport { message, .. }) => Error::RemoteConnection {
                host: host.to_string(),
                message,
            },
            Self::Store(StoreError::Protocol(message)) => match path {
                Some(path) => Error::Resource {
                    path: path.to_string(),
                    message,
                },
                None => Error::OperationFailed(message),
            },
            Self::Fs(err) => err,
            Self::Other { kind, message } => Error::Filesystem { kind, message },
        }
    }
}

impl From<StoreError> for Failure {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Self::Fs(err)
    }
}

impl From<std::io::Error> for Failure {
    fn from(err: std::io::Error) -> Self {
        Self::other(&err)
    }
}

pub(crate) type Attempt<T> = std::result::Result<T, Failure>;
