//! Session management
//!
//! A [`Session`] owns the single live connection of a filesystem
//! instance together with what was discovered about the server when it
//! was opened. Before every unit of work the cached connection is
//! checked with `NOOP`; a transport failure discards it and a new one
//! is opened in its place.

use crate::config::ImapConfig;
use crate::connection::{self, ImapSession};
use crate::error::{Attempt, Error, Failure, Result, StoreError, StoreResult, TransportKind};
use crate::store::Store;
use futures::TryStreamExt;
use regex::Regex;
use std::sync::LazyLock;
use tokio::io::AsyncReadExt;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

/// First personal namespace of a `NAMESPACE` response: root and
/// delimiter (which may be `NIL`).
static NAMESPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\*\s+NAMESPACE\s+\(\(\s*"((?:[^"\\]|\\.)*)"\s+(?:"((?:[^"\\]|\\.)*)"|NIL)"#)
        .unwrap_or_else(|e| unreachable!("namespace pattern is valid: {e}"))
});

/// Outcome of probing a cached connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Lost(TransportKind),
}

pub struct Session {
    config: ImapConfig,
    runtime: Runtime,
    imap: Option<ImapSession>,
    uidplus: bool,
    delimiter: String,
    ns_root: String,
    welcome: Option<String>,
    closed: bool,
}

impl Session {
    /// Set up the runtime; no connection is made yet.
    pub fn new(config: ImapConfig) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Failure::other(&e).translate(&config.host, None))?;

        Ok(Self {
            config,
            runtime,
            imap: None,
            uidplus: false,
            delimiter: String::new(),
            ns_root: String::new(),
            welcome: None,
            closed: false,
        })
    }

    pub const fn config(&self) -> &ImapConfig {
        &self.config
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn namespace_root(&self) -> &str {
        &self.ns_root
    }

    pub fn welcome(&self) -> Option<&str> {
        self.welcome.as_deref()
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// A live connection ready for one unit of work.
    pub(crate) fn acquire(&mut self) -> Attempt<Store<'_>> {
        if self.closed {
            return Err(Error::FilesystemClosed.into());
        }

        let cached = match self.imap.take() {
            Some(imap) => self.revalidate(imap)?,
            None => None,
        };
        let imap = match cached {
            Some(imap) => imap,
            None => self.open()?,
        };

        let Self {
            config,
            runtime,
            imap: slot,
            uidplus,
            delimiter,
            ..
        } = self;
        let imap = slot.insert(imap);
        Ok(Store::new(
            runtime,
            imap,
            delimiter,
            config.folder_encode,
            *uidplus,
        ))
    }

    /// Keep `imap` if it still answers, drop it if the transport died.
    fn revalidate(&mut self, mut imap: ImapSession) -> Attempt<Option<ImapSession>> {
        match check_liveness(&self.runtime, &mut imap) {
            Ok(Liveness::Alive) => Ok(Some(imap)),
            Ok(Liveness::Lost(kind)) => {
                warn!(
                    "IMAP connection to {} lost ({}), reconnecting",
                    self.config.host, kind
                );
                Ok(None)
            }
            Err(err) => {
                self.imap = Some(imap);
                Err(err.into())
            }
        }
    }

    /// Connect, log in and discover the folder hierarchy layout.
    fn open(&mut self) -> StoreResult<ImapSession> {
        let (mut imap, greeting) = self.runtime.block_on(connection::connect(&self.config))?;

        let capabilities = self.runtime.block_on(imap.capabilities())?;
        let uidplus = capabilities.has_str("UIDPLUS");
        let has_namespace = capabilities.has_str("NAMESPACE");

        let (ns_root, delimiter) = discover_layout(&self.runtime, &mut imap, has_namespace)?;
        info!(
            "IMAP session on {}:{} ready (delimiter {:?}, namespace root {:?}, uidplus {})",
            self.config.host, self.config.port, delimiter, ns_root, uidplus
        );

        self.uidplus = uidplus;
        self.delimiter = delimiter;
        self.ns_root = ns_root;
        self.welcome = Some(greeting);
        Ok(imap)
    }

    /// Log out and drop the connection. Later calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(mut imap) = self.imap.take() {
            debug!("Logging out of {}", self.config.host);
            if let Err(err) = self.runtime.block_on(imap.logout()) {
                warn!(
                    "IMAP logout from {} failed, dropping connection: {}",
                    self.config.host, err
                );
            }
        }
    }
}

/// `NOOP` on the cached connection.
///
/// Only transport failures mean the connection is gone; protocol
/// failures are returned as errors.
fn check_liveness(runtime: &Runtime, imap: &mut ImapSession) -> StoreResult<Liveness> {
    // `Session::noop` treats end of stream as success; the tagged check
    // reports it as a lost connection.
    match runtime.block_on(imap.run_command_and_check_ok("NOOP")) {
        Ok(()) => Ok(Liveness::Alive),
        Err(err) => match StoreError::from(err) {
            StoreError::Transport { kind, .. } => Ok(Liveness::Lost(kind)),
            protocol @ StoreError::Protocol(_) => Err(protocol),
        },
    }
}

/// `(namespace root, delimiter)` from NAMESPACE when the server has
/// it, else the delimiter of the first folder that reports one.
fn discover_layout(
    runtime: &Runtime,
    imap: &mut ImapSession,
    has_namespace: bool,
) -> StoreResult<(String, String)> {
    if has_namespace {
        let reply = runtime.block_on(namespace_reply(imap))?;
        if let Some(layout) = reply.iter().find_map(|line| parse_namespace(line)) {
            return Ok(layout);
        }
        debug!("NAMESPACE gave no personal namespace, using LIST");
    }

    let names = runtime.block_on(async {
        imap.list(Some(""), Some("*"))
            .await?
            .try_collect::<Vec<_>>()
            .await
    })?;
    let delimiter = names
        .iter()
        .find_map(|name| name.delimiter().filter(|d| !d.is_empty()))
        .unwrap_or_default()
        .to_string();
    Ok((String::new(), delimiter))
}

/// Send `NAMESPACE` and collect the raw reply lines up to its tagged
/// completion.
///
/// async-imap has no typed NAMESPACE command, so the reply is read off
/// the TLS stream directly, one byte at a time, so that nothing after
/// the completion line is consumed.
async fn namespace_reply(imap: &mut ImapSession) -> StoreResult<Vec<String>> {
    let tag = imap.run_command("NAMESPACE").await?;
    let completion = format!("{} ", tag.0);
    let stream = imap.get_mut().get_mut();

    let mut lines = Vec::new();
    loop {
        let mut line = Vec::new();
        loop {
            let byte = stream.read_u8().await?;
            line.push(byte);
            if byte == b'\n' {
                break;
            }
        }
        let line = String::from_utf8_lossy(&line).into_owned();
        let done = line.starts_with(&completion);
        lines.push(line);
        if done {
            return Ok(lines);
        }
    }
}

/// Root and delimiter of the first personal namespace.
fn parse_namespace(response: &str) -> Option<(String, String)> {
    let captures = NAMESPACE_RE.captures(response)?;
    let root = captures.get(1).map_or("", |m| m.as_str());
    let delimiter = captures.get(2).map_or("", |m| m.as_str());
    Some((unescape(root), unescape(delimiter)))
}

fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
