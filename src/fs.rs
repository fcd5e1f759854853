//! The filesystem facade
//!
//! [`ImapFs`] presents a mailbox as a directory tree: folders are
//! directories and messages are files named `<id>.eml`. Every
//! operation takes the instance lock, acquires the live session once
//! and runs to completion before the lock is released, so concurrent
//! callers never interleave commands on the wire.

use crate::config::ImapConfig;
use crate::error::{Attempt, Error, Failure, Result, StoreError};
use crate::file::{MessageFile, OpenMode};
use crate::flag::Flag;
use crate::info::{Info, Namespace};
use crate::path::{self, MESSAGE_EXTENSION};
use crate::reader;
use crate::session::Session;
use crate::store::Store;
use serde::Serialize;
use std::fmt;
use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Capabilities reported by `getmeta("standard")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Meta {
    pub invalid_path_chars: &'static str,
    pub network: bool,
    pub read_only: bool,
    pub thread_safe: bool,
    pub unicode_paths: bool,
    #[serde(rename = "virtual")]
    pub is_virtual: bool,
    pub supports_rename: bool,
}

/// A remote IMAP mailbox viewed as a filesystem.
pub struct ImapFs {
    host: String,
    port: u16,
    folder_encode: bool,
    session: Mutex<Session>,
}

impl ImapFs {
    /// Connect and log in to the server described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteConnection`] if the server cannot be
    /// reached and [`Error::OperationFailed`] if login is refused.
    pub fn connect(config: ImapConfig) -> Result<Self> {
        let host = config.host.clone();
        let port = config.port;
        let folder_encode = config.folder_encode;

        let mut session = Session::new(config)?;
        session
            .acquire()
            .map(drop)
            .map_err(|failure| failure.translate(&host, None))?;

        Ok(Self {
            host,
            port,
            folder_encode,
            session: Mutex::new(session),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one unit of work against the store under the instance lock.
    fn guarded<T>(
        &self,
        path: Option<&str>,
        unit: impl FnOnce(&mut Store<'_>) -> Attempt<T>,
    ) -> Result<T> {
        let mut session = self.lock();
        session
            .acquire()
            .and_then(|mut store| unit(&mut store))
            .map_err(|failure| failure.translate(&self.host, path))
    }

    /// Descriptor of the resource at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceNotFound`] if nothing exists at `path`.
    pub fn getinfo(&self, path: &str) -> Result<Info> {
        let path = path::normalize(path)?;
        self.guarded(Some(&path), |store| info_in(store, &path))
    }

    /// Names of the resources inside a directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceNotFound`] if `path` does not exist and
    /// [`Error::DirectoryExpected`] if it is a message.
    pub fn listdir(&self, path: &str) -> Result<Vec<String>> {
        let path = path::normalize(path)?;
        self.guarded(Some(&path), |store| {
            require_dir(store, &path)?;
            reader::list_names(store, &path)
        })
    }

    /// Descriptors of the resources inside a directory.
    ///
    /// `namespaces` limits which descriptor namespaces are kept.
    /// `page` is a `(start, end)` window over the full listing.
    ///
    /// # Errors
    ///
    /// Same as [`ImapFs::listdir`].
    pub fn scandir(
        &self,
        path: &str,
        namespaces: Option<&[Namespace]>,
        page: Option<(usize, usize)>,
    ) -> Result<std::vec::IntoIter<Info>> {
        let path = path::normalize(path)?;
        let entries = self.guarded(Some(&path), |store| {
            require_dir(store, &path)?;
            reader::read_dir(store, &path)
        })?;

        let (start, end) = page.unwrap_or((0, usize::MAX));
        let window: Vec<Info> = entries
            .into_iter()
            .skip(start)
            .take(end.saturating_sub(start))
            .map(|info| match namespaces {
                Some(namespaces) => info.restrict(namespaces),
                None => info,
            })
            .collect();
        Ok(window.into_iter())
    }

    /// Create a folder. Its parent must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryExists`] if something already exists
    /// at `path` (unless `recreate` is set and it is a directory) and
    /// [`Error::ResourceNotFound`] if an ancestor is missing.
    pub fn makedir(&self, path: &str, recreate: bool) -> Result<SubFs<'_>> {
        let path = path::normalize(path)?;
        debug!("makedir {} (recreate {})", path, recreate);

        self.guarded(Some(&path), |store| {
            if path == "/" {
                return if recreate {
                    Ok(())
                } else {
                    Err(Error::DirectoryExists { path: path.clone() }.into())
                };
            }

            match find_in(store, &path)? {
                Some(info) if recreate && info.is_dir() => return Ok(()),
                Some(_) => return Err(Error::DirectoryExists { path: path.clone() }.into()),
                None => {}
            }

            for ancestor in path::ancestors(&path) {
                if !is_dir_in(store, &ancestor)? {
                    return Err(Error::not_found(&path).into());
                }
            }

            let folder = store.store_path(&path);
            match store.create_folder(&folder) {
                Ok(()) => Ok(()),
                Err(StoreError::Protocol(message)) => {
                    debug!("CREATE {:?} refused: {}", folder, message);
                    if message.to_ascii_uppercase().contains("ALREADYEXISTS") {
                        Err(Error::DirectoryExists { path: path.clone() }.into())
                    } else {
                        Err(Error::not_found(&path).into())
                    }
                }
                Err(err) => Err(err.into()),
            }
        })?;

        Ok(SubFs::new(self, path))
    }

    /// Open a message for reading, or a new message for writing.
    ///
    /// Messages are never overwritten: opening an existing message for
    /// writing fails with [`Error::FileExists`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceNotFound`] for a missing message (read)
    /// or missing folder (write), [`Error::FileExpected`] for a
    /// directory and [`Error::Path`] for a name without the `.eml`
    /// extension.
    pub fn openbin(&self, path: &str, mode: OpenMode) -> Result<MessageFile<'_>> {
        let path = path::normalize(path)?;

        let content = self.guarded(Some(&path), |store| {
            let (parent, name) = path::split(&path);
            match find_in(store, &path)? {
                Some(info) if info.is_dir() => {
                    return Err(Error::FileExpected { path: path.clone() }.into());
                }
                Some(_) if mode.is_write() => {
                    return Err(Error::FileExists { path: path.clone() }.into());
                }
                Some(_) => {}
                None if mode.is_read() => return Err(Error::not_found(&path).into()),
                None => {
                    if !is_dir_in(store, parent)? {
                        return Err(Error::not_found(&path).into());
                    }
                }
            }

            if path::split_message_name(name).1 != MESSAGE_EXTENSION {
                return Err(Error::Path {
                    path: path.clone(),
                    message: format!("file must have '.{MESSAGE_EXTENSION}' extension"),
                }
                .into());
            }

            if mode.is_write() {
                return Ok(None);
            }
            let id = select_message(store, &path)?;
            store
                .fetch_body(id)?
                .map(Some)
                .ok_or_else(|| Error::not_found(&path).into())
        })?;

        Ok(MessageFile::new(self, path, mode, content))
    }

    /// Add flags to a message. Flags already set stay set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceNotFound`] or [`Error::FileExpected`],
    /// and [`Error::OperationFailed`] for a keyword that is not an IMAP
    /// atom.
    pub fn setinfo(&self, path: &str, flags: &[Flag]) -> Result<()> {
        let path = path::normalize(path)?;
        if let Some(bad) = flags.iter().find(|flag| !flag.is_valid()) {
            return Err(Error::OperationFailed(format!(
                "cannot set flag {:?} on '{path}': not a valid IMAP keyword",
                bad.as_imap_str()
            )));
        }
        self.guarded(Some(&path), |store| {
            if info_in(store, &path)?.is_dir() {
                return Err(Error::FileExpected { path: path.clone() }.into());
            }
            if flags.is_empty() {
                return Ok(());
            }
            let id = select_message(store, &path)?;
            store.add_flags(id, flags)?;
            Ok(())
        })
    }

    /// Copy a message into the folder of `dst`.
    ///
    /// The store assigns the copy its own id, so `dst` only chooses the
    /// folder. An existing message at `dst` is never replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DestinationExists`] if `dst` is a message, or
    /// [`Error::FileExists`] when `overwrite` was asked for.
    /// [`Error::FileExpected`] if either side is a directory and
    /// [`Error::ResourceNotFound`] if the destination folder is missing.
    pub fn copy(&self, src: &str, dst: &str, overwrite: bool) -> Result<()> {
        let src = path::normalize(src)?;
        let dst = path::normalize(dst)?;
        debug!("copy {} -> {} (overwrite {})", src, dst, overwrite);

        self.guarded(Some(&src), |store| {
            if info_in(store, &src)?.is_dir() {
                return Err(Error::FileExpected { path: src.clone() }.into());
            }
            match find_in(store, &dst)? {
                Some(info) if info.is_dir() => {
                    return Err(Error::FileExpected { path: dst.clone() }.into());
                }
                Some(_) if overwrite => {
                    return Err(Error::FileExists { path: dst.clone() }.into());
                }
                Some(_) => return Err(Error::DestinationExists { path: dst.clone() }.into()),
                None => {}
            }

            let id = select_message(store, &src)?;
            let destination = store.store_path(path::split(&dst).0);
            match store.copy(id, &destination) {
                Ok(()) => Ok(()),
                Err(StoreError::Protocol(message)) => {
                    debug!("UID COPY to {:?} refused: {}", destination, message);
                    Err(Error::not_found(&dst).into())
                }
                Err(err) => Err(err.into()),
            }
        })
    }

    /// Delete a message and expunge it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceNotFound`] or [`Error::FileExpected`].
    pub fn remove(&self, path: &str) -> Result<()> {
        let path = path::normalize(path)?;
        self.guarded(Some(&path), |store| {
            if info_in(store, &path)?.is_dir() {
                return Err(Error::FileExpected { path: path.clone() }.into());
            }
            let id = select_message(store, &path)?;
            let affected = store.delete_messages(id)?;
            if !affected.is_empty() {
                store.expunge(&affected)?;
            }
            Ok(())
        })
    }

    /// Delete an empty folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoveRoot`] for `/`, [`Error::DirectoryExpected`]
    /// for a message and [`Error::DirectoryNotEmpty`] if the folder
    /// still holds anything.
    pub fn removedir(&self, path: &str) -> Result<()> {
        let path = path::normalize(path)?;
        if path == "/" {
            return Err(Error::RemoveRoot);
        }

        self.guarded(Some(&path), |store| {
            if info_in(store, &path)?.is_file() {
                return Err(Error::DirectoryExpected { path: path.clone() }.into());
            }
            if !reader::list_names(store, &path)?.is_empty() {
                return Err(Error::DirectoryNotEmpty { path: path.clone() }.into());
            }

            let folder = store.store_path(&path);
            if let Err(err) = store.delete_folder(&folder) {
                match err {
                    StoreError::Protocol(message) => {
                        warn!("DELETE {:?} failed, ignoring: {}", folder, message);
                    }
                    transport @ StoreError::Transport { .. } => return Err(transport.into()),
                }
            }
            Ok(())
        })
    }

    /// Log out. Any later operation fails with
    /// [`Error::FilesystemClosed`]; closing again does nothing.
    pub fn close(&self) {
        self.lock().close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }

    /// Filesystem capabilities. Only the `standard` namespace exists.
    #[must_use]
    pub fn getmeta(&self, namespace: &str) -> Option<Meta> {
        (namespace == "standard").then_some(Meta {
            invalid_path_chars: path::INVALID_PATH_CHARS,
            network: true,
            read_only: false,
            thread_safe: true,
            unicode_paths: self.folder_encode,
            is_virtual: false,
            supports_rename: false,
        })
    }

    /// # Errors
    ///
    /// Only transport and protocol failures; a missing path is `false`.
    pub fn exists(&self, path: &str) -> Result<bool> {
        let path = path::normalize(path)?;
        self.guarded(Some(&path), |store| Ok(find_in(store, &path)?.is_some()))
    }

    /// # Errors
    ///
    /// Same as [`ImapFs::exists`].
    pub fn isdir(&self, path: &str) -> Result<bool> {
        let path = path::normalize(path)?;
        self.guarded(Some(&path), |store| is_dir_in(store, &path))
    }

    /// # Errors
    ///
    /// Same as [`ImapFs::exists`].
    pub fn isfile(&self, path: &str) -> Result<bool> {
        let path = path::normalize(path)?;
        self.guarded(Some(&path), |store| {
            Ok(find_in(store, &path)?.is_some_and(|info| info.is_file()))
        })
    }

    /// Whether a directory has no messages and no subfolders.
    ///
    /// # Errors
    ///
    /// Same as [`ImapFs::listdir`].
    pub fn isempty(&self, path: &str) -> Result<bool> {
        let path = path::normalize(path)?;
        self.guarded(Some(&path), |store| {
            require_dir(store, &path)?;
            Ok(reader::list_names(store, &path)?.is_empty())
        })
    }

    /// The raw bytes of a message.
    ///
    /// # Errors
    ///
    /// Same as [`ImapFs::openbin`] in read mode.
    pub fn getbytes(&self, path: &str) -> Result<Vec<u8>> {
        let mut file = self.openbin(path, OpenMode::Read)?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| Failure::from(e).translate(&self.host, Some(path)))?;
        Ok(content)
    }

    /// Store `content` as a new message at `path`.
    ///
    /// # Errors
    ///
    /// Same as [`ImapFs::openbin`] in write mode, plus any failure of
    /// the final append.
    pub fn writebytes(&self, path: &str, content: &[u8]) -> Result<()> {
        let mut file = self.openbin(path, OpenMode::Write)?;
        file.write_all(content)
            .map_err(|e| Failure::from(e).translate(&self.host, Some(path)))?;
        file.close()
    }

    /// A handle scoped to an existing directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceNotFound`] or [`Error::DirectoryExpected`].
    pub fn opendir(&self, path: &str) -> Result<SubFs<'_>> {
        let path = path::normalize(path)?;
        self.guarded(Some(&path), |store| require_dir(store, &path))?;
        Ok(SubFs::new(self, path))
    }

    /// Append `content` to the folder holding `path`.
    pub(crate) fn append_file(&self, path: &str, content: &[u8]) -> Result<()> {
        self.guarded(Some(path), |store| {
            let folder = store.store_path(path::split(path).0);
            store.append(&folder, content)?;
            Ok(())
        })
    }

    #[must_use]
    pub fn imap_url(&self) -> String {
        format!("imap://{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The hierarchy delimiter of the current session.
    #[must_use]
    pub fn delimiter(&self) -> String {
        self.lock().delimiter().to_string()
    }

    /// The personal namespace root of the current session.
    #[must_use]
    pub fn namespace_root(&self) -> String {
        self.lock().namespace_root().to_string()
    }

    /// The greeting the server sent when the session was opened.
    #[must_use]
    pub fn welcome(&self) -> Option<String> {
        self.lock().welcome().map(str::to_string)
    }
}

impl fmt::Display for ImapFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<imapfs '{}:{}'>", self.host, self.port)
    }
}

impl fmt::Debug for ImapFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapFs")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl Drop for ImapFs {
    fn drop(&mut self) {
        self.session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .close();
    }
}

fn info_in(store: &mut Store<'_>, path: &str) -> Attempt<Info> {
    if path == "/" {
        Ok(Info::root())
    } else {
        reader::lookup(store, path)
    }
}

fn find_in(store: &mut Store<'_>, path: &str) -> Attempt<Option<Info>> {
    match info_in(store, path) {
        Ok(info) => Ok(Some(info)),
        Err(failure) if failure.is_not_found() => Ok(None),
        Err(failure) => Err(failure),
    }
}

fn is_dir_in(store: &mut Store<'_>, path: &str) -> Attempt<bool> {
    Ok(find_in(store, path)?.is_some_and(|info| info.is_dir()))
}

/// Fail unless `path` is an existing directory.
fn require_dir(store: &mut Store<'_>, path: &str) -> Attempt<()> {
    if info_in(store, path)?.is_dir() {
        Ok(())
    } else {
        Err(Error::DirectoryExpected {
            path: path.to_string(),
        }
        .into())
    }
}

/// Select the folder holding a message and return the message id.
fn select_message(store: &mut Store<'_>, path: &str) -> Attempt<u32> {
    let (parent, name) = path::split(path);
    let id = path::message_id(name).ok_or_else(|| Failure::from(Error::not_found(path)))?;
    let folder = store.store_path(parent);
    reader::select_or_missing(store, path, &folder)?;
    Ok(id)
}

/// The same operations, relative to one directory.
#[derive(Debug, Clone)]
pub struct SubFs<'fs> {
    fs: &'fs ImapFs,
    prefix: String,
}

#[allow(clippy::missing_errors_doc)]
impl<'fs> SubFs<'fs> {
    const fn new(fs: &'fs ImapFs, prefix: String) -> Self {
        Self { fs, prefix }
    }

    /// The directory this handle is scoped to.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub const fn parent(&self) -> &'fs ImapFs {
        self.fs
    }

    /// Resolve a path relative to the prefix, refusing to leave it.
    fn resolve(&self, path: &str) -> Result<String> {
        let full = path::normalize(&path::join(&self.prefix, path))?;
        let inside = self.prefix == "/"
            || full == self.prefix
            || full.starts_with(&format!("{}/", self.prefix));
        if inside {
            Ok(full)
        } else {
            Err(Error::Path {
                path: path.to_string(),
                message: format!("escapes '{}'", self.prefix),
            })
        }
    }

    pub fn getinfo(&self, path: &str) -> Result<Info> {
        self.fs.getinfo(&self.resolve(path)?)
    }

    pub fn listdir(&self, path: &str) -> Result<Vec<String>> {
        self.fs.listdir(&self.resolve(path)?)
    }

    pub fn scandir(
        &self,
        path: &str,
        namespaces: Option<&[Namespace]>,
        page: Option<(usize, usize)>,
    ) -> Result<std::vec::IntoIter<Info>> {
        self.fs.scandir(&self.resolve(path)?, namespaces, page)
    }

    pub fn makedir(&self, path: &str, recreate: bool) -> Result<SubFs<'fs>> {
        self.fs.makedir(&self.resolve(path)?, recreate)
    }

    pub fn openbin(&self, path: &str, mode: OpenMode) -> Result<MessageFile<'fs>> {
        self.fs.openbin(&self.resolve(path)?, mode)
    }

    pub fn setinfo(&self, path: &str, flags: &[Flag]) -> Result<()> {
        self.fs.setinfo(&self.resolve(path)?, flags)
    }

    pub fn copy(&self, src: &str, dst: &str, overwrite: bool) -> Result<()> {
        self.fs
            .copy(&self.resolve(src)?, &self.resolve(dst)?, overwrite)
    }

    pub fn remove(&self, path: &str) -> Result<()> {
        self.fs.remove(&self.resolve(path)?)
    }

    pub fn removedir(&self, path: &str) -> Result<()> {
        self.fs.removedir(&self.resolve(path)?)
    }

    /// # Errors
    ///
    /// Only transport and protocol failures; a missing path is `false`.
    pub fn exists(&self, path: &str) -> Result<bool> {
        self.fs.exists(&self.resolve(path)?)
    }

    pub fn isdir(&self, path: &str) -> Result<bool> {
        self.fs.isdir(&self.resolve(path)?)
    }

    pub fn isfile(&self, path: &str) -> Result<bool> {
        self.fs.isfile(&self.resolve(path)?)
    }

    pub fn getbytes(&self, path: &str) -> Result<Vec<u8>> {
        self.fs.getbytes(&self.resolve(path)?)
    }

    pub fn writebytes(&self, path: &str, content: &[u8]) -> Result<()> {
        self.fs.writebytes(&self.resolve(path)?, content)
    }

    pub fn opendir(&self, path: &str) -> Result<SubFs<'fs>> {
        self.fs.opendir(&self.resolve(path)?)
    }
}

impl fmt::Display for SubFs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubFS({}, '{}')", self.fs, self.prefix)
    }
}
