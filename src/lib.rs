//! IMAP mailbox as a filesystem
//!
//! Folders on an IMAP server appear as directories and messages as
//! files named `<id>.eml`, where the id is the message UID within its
//! folder. Message files are append-only: a new message is written
//! whole when its handle is closed, and an existing one can only be
//! read, flagged, copied or removed.
//!
//! ```no_run
//! use imapfs::{ImapConfig, ImapFs};
//!
//! let fs = ImapFs::connect(ImapConfig::from_env()?)?;
//! for name in fs.listdir("/INBOX")? {
//!     println!("{name}");
//! }
//! fs.writebytes("/INBOX/1.eml", b"Subject: hi\r\n\r\nhello\r\n")?;
//! # Ok::<(), imapfs::Error>(())
//! ```
//!
//! The facade is blocking. Every operation holds one instance-wide
//! lock for its whole exchange with the server, so an [`ImapFs`] can be
//! shared between threads.

mod config;
mod connection;
mod error;
mod file;
mod flag;
mod fs;
mod info;
mod path;
mod reader;
mod session;
mod store;
mod utf7;

pub use config::{ImapConfig, Security};
pub use error::{Error, Result};
pub use file::{EMPTY_MESSAGE, MessageFile, OpenMode};
pub use flag::Flag;
pub use fs::{ImapFs, Meta, SubFs};
pub use info::{AddressTuple, Basic, Details, Info, MailInfo, Namespace, ResourceType};
pub use path::MESSAGE_EXTENSION;
