//! Message file handles
//!
//! A [`MessageFile`] is an in-memory buffer tied to one message path.
//! Read handles are filled with the whole message when opened. Write
//! handles collect bytes and hand them to the store as a single APPEND
//! when closed, because a message can only ever be stored whole.

use crate::error::{Error, Result};
use crate::fs::ImapFs;
use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::str::FromStr;
use tracing::warn;

/// Stored in place of an empty write; the store rejects empty messages.
pub const EMPTY_MESSAGE: &[u8] = b"\r\n";

/// How a message file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

impl OpenMode {
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Read)
    }

    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Write)
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    /// Accepts the usual binary mode strings: `r`, `rb`, `w`, `wb`,
    /// `x`, `xb`.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" | "rb" => Ok(Self::Read),
            "w" | "wb" | "x" | "xb" => Ok(Self::Write),
            other => Err(Error::Mode(other.to_string())),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "rb",
            Self::Write => "wb",
        })
    }
}

/// An open message.
pub struct MessageFile<'fs> {
    fs: &'fs ImapFs,
    path: String,
    mode: OpenMode,
    buffer: Cursor<Vec<u8>>,
    closed: bool,
}

impl<'fs> MessageFile<'fs> {
    pub(crate) fn new(fs: &'fs ImapFs, path: String, mode: OpenMode, content: Option<Vec<u8>>) -> Self {
        Self {
            fs,
            path,
            mode,
            buffer: Cursor::new(content.unwrap_or_default()),
            closed: false,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub const fn mode(&self) -> OpenMode {
        self.mode
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the handle. A write handle stores its buffer as one new
    /// message. Closing again does nothing.
    ///
    /// # Errors
    ///
    /// Any failure of the append; the handle is closed regardless.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let content = std::mem::take(self.buffer.get_mut());
        if self.mode.is_read() {
            return Ok(());
        }
        let payload = if content.is_empty() {
            EMPTY_MESSAGE
        } else {
            content.as_slice()
        };
        self.fs.append_file(&self.path, payload)
    }

    fn check(&self, wanted: OpenMode) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::other("I/O operation on closed file"));
        }
        if self.mode == wanted {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("file opened in '{}' mode", self.mode),
            ))
        }
    }
}

impl Read for MessageFile<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check(OpenMode::Read)?;
        self.buffer.read(buf)
    }
}

impl Write for MessageFile<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check(OpenMode::Write)?;
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MessageFile<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.closed {
            return Err(io::Error::other("I/O operation on closed file"));
        }
        self.buffer.seek(pos)
    }
}

impl fmt::Debug for MessageFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageFile")
            .field("url", &self.fs.imap_url())
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for MessageFile<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("Closing {} failed: {}", self.path, err);
        }
    }
}
