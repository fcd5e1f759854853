//! Blocking store primitives
//!
//! [`Store`] wraps one live IMAP session for the length of a single
//! filesystem operation and exposes the handful of commands the
//! filesystem needs, each run to completion on the session's runtime.
//! Responses are copied into plain records so nothing borrowed from
//! the wire outlives the command.

use crate::connection::ImapSession;
use crate::error::StoreResult;
use crate::flag::Flag;
use crate::{path, utf7};
use async_imap::imap_proto::types::{Address as WireAddress, Envelope as WireEnvelope};
use async_imap::types::{Fetch, NameAttribute};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use tokio::runtime::Runtime;
use tracing::debug;

/// Flags a LIST entry carries when the folder can never hold children.
pub const NO_INFERIORS: &str = "\\Noinferiors";

/// One row of a LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub flags: Vec<String>,
    pub delimiter: Option<String>,
    /// Full folder name, decoded.
    pub name: String,
}

impl FolderEntry {
    /// Whether the server says this folder can never have children.
    #[must_use]
    pub fn has_no_inferiors(&self) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case(NO_INFERIORS))
    }

    /// Split the full name into `(parent, leaf)`.
    #[must_use]
    pub fn split(&self) -> (&str, &str) {
        path::split_folder_name(&self.name, self.delimiter.as_deref())
    }
}

/// Counters reported by SELECT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectedFolder {
    pub exists: u32,
    pub recent: u32,
}

/// Counters reported by STATUS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderStatus {
    pub messages: Option<u32>,
    pub recent: Option<u32>,
    pub uid_next: Option<u32>,
    pub uid_validity: Option<u32>,
    pub unseen: Option<u32>,
}

/// Message attributes a FETCH may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchField {
    Flags,
    Envelope,
    Size,
    Header,
}

impl FetchField {
    /// Everything the directory reader wants to know about a message.
    pub const ALL: [Self; 4] = [Self::Flags, Self::Envelope, Self::Size, Self::Header];

    const fn as_imap_str(self) -> &'static str {
        match self {
            Self::Flags => "FLAGS",
            Self::Envelope => "ENVELOPE",
            Self::Size => "RFC822.SIZE",
            Self::Header => "RFC822.HEADER",
        }
    }

    fn query(fields: &[Self]) -> String {
        let items: Vec<&str> = fields.iter().map(|f| f.as_imap_str()).collect();
        format!("({})", items.join(" "))
    }
}

/// A mailbox address as it appears in an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub name: Option<String>,
    pub mailbox: Option<String>,
    pub host: Option<String>,
    pub route: Option<String>,
}

/// The parsed ENVELOPE of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub date: Option<DateTime<Utc>>,
    pub subject: Option<String>,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub in_reply_to: Option<String>,
    pub message_id: Option<String>,
}

/// The fields returned for one message. A field is `None` when it
/// was not requested or the server did not send it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedMessage {
    pub id: u32,
    pub size: Option<u32>,
    pub flags: Option<Vec<String>>,
    pub envelope: Option<Envelope>,
    pub header: Option<Vec<u8>>,
}

/// Store primitives over a borrowed live session.
pub struct Store<'a> {
    runtime: &'a Runtime,
    imap: &'a mut ImapSession,
    delimiter: &'a str,
    encode: bool,
    uidplus: bool,
}

impl<'a> Store<'a> {
    pub(crate) const fn new(
        runtime: &'a Runtime,
        imap: &'a mut ImapSession,
        delimiter: &'a str,
        encode: bool,
        uidplus: bool,
    ) -> Self {
        Self {
            runtime,
            imap,
            delimiter,
            encode,
            uidplus,
        }
    }

    /// The store path (folder name) for an absolute filesystem path.
    #[must_use]
    pub fn store_path(&self, path: &str) -> String {
        path::to_store_path(path, self.delimiter)
    }

    #[must_use]
    pub const fn delimiter(&self) -> &str {
        self.delimiter
    }

    fn wire_name(&self, name: &str) -> String {
        if self.encode {
            utf7::encode(name)
        } else {
            name.to_string()
        }
    }

    fn decoded_name(&self, raw: &str) -> String {
        if self.encode {
            utf7::decode(raw).unwrap_or_else(|| raw.to_string())
        } else {
            raw.to_string()
        }
    }

    /// LIST every folder under `scope`.
    pub fn list_folders(&mut self, scope: &str) -> StoreResult<Vec<FolderEntry>> {
        let reference = self.wire_name(scope);
        debug!("LIST {:?} \"*\"", reference);
        self.list(&reference, "*")
    }

    /// LIST exactly one folder by its full name.
    pub fn find_folder(&mut self, name: &str) -> StoreResult<Option<FolderEntry>> {
        let pattern = quote(&self.wire_name(name));
        debug!("LIST \"\" {}", pattern);
        let entries = self.list("", &pattern)?;
        Ok(entries.into_iter().find(|entry| entry.name == name))
    }

    fn list(&mut self, reference: &str, pattern: &str) -> StoreResult<Vec<FolderEntry>> {
        let Self { runtime, imap, .. } = self;
        let names = runtime.block_on(async {
            imap.list(Some(reference), Some(pattern))
                .await?
                .try_collect::<Vec<_>>()
                .await
        })?;

        Ok(names
            .iter()
            .map(|name| FolderEntry {
                flags: name.attributes().iter().map(attribute_name).collect(),
                delimiter: name.delimiter().map(str::to_string),
                name: self.decoded_name(name.name()),
            })
            .collect())
    }

    /// SELECT a folder by name.
    pub fn select(&mut self, name: &str) -> StoreResult<SelectedFolder> {
        let wire = self.wire_name(name);
        debug!("SELECT {:?}", wire);
        let Self { runtime, imap, .. } = self;
        let mailbox = runtime.block_on(imap.select(&wire))?;
        Ok(SelectedFolder {
            exists: mailbox.exists,
            recent: mailbox.recent,
        })
    }

    /// UID SEARCH ALL in the selected folder, in ascending order.
    pub fn search_all(&mut self) -> StoreResult<Vec<u32>> {
        self.search("ALL")
    }

    /// UID FETCH `fields` for `ids` in the selected folder.
    pub fn fetch(&mut self, ids: &[u32], fields: &[FetchField]) -> StoreResult<Vec<FetchedMessage>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let set = id_set(ids);
        let query = FetchField::query(fields);
        debug!("UID FETCH {} {}", set, query);

        let Self { runtime, imap, .. } = self;
        let fetched = runtime.block_on(async {
            imap.uid_fetch(&set, &query)
                .await?
                .try_collect::<Vec<_>>()
                .await
        })?;

        Ok(fetched
            .iter()
            .filter_map(|fetch| message_record(fetch, fields))
            .collect())
    }

    /// The full raw bytes of one message, without marking it seen.
    pub fn fetch_body(&mut self, id: u32) -> StoreResult<Option<Vec<u8>>> {
        debug!("UID FETCH {} BODY.PEEK[]", id);
        let Self { runtime, imap, .. } = self;
        let fetched = runtime.block_on(async {
            imap.uid_fetch(id.to_string(), "BODY.PEEK[]")
                .await?
                .try_collect::<Vec<_>>()
                .await
        })?;

        Ok(fetched
            .iter()
            .find(|fetch| fetch.uid == Some(id))
            .and_then(Fetch::body)
            .map(<[u8]>::to_vec))
    }

    /// APPEND a message to a folder.
    pub fn append(&mut self, folder: &str, content: &[u8]) -> StoreResult<()> {
        let wire = self.wire_name(folder);
        debug!("APPEND {:?} ({} bytes)", wire, content.len());
        let Self { runtime, imap, .. } = self;
        runtime.block_on(imap.append(&wire, None, None, content))?;
        Ok(())
    }

    /// UID STORE +FLAGS. Returns the ids the server reported as changed.
    pub fn add_flags(&mut self, id: u32, flags: &[Flag]) -> StoreResult<Vec<u32>> {
        let query = format!("+FLAGS {}", Flag::list(flags));
        debug!("UID STORE {} {}", id, query);
        let Self { runtime, imap, .. } = self;
        let fetched = runtime.block_on(async {
            imap.uid_store(id.to_string(), &query)
                .await?
                .try_collect::<Vec<_>>()
                .await
        })?;
        Ok(fetched.iter().filter_map(|fetch| fetch.uid).collect())
    }

    /// Mark a message `\Deleted`.
    pub fn delete_messages(&mut self, id: u32) -> StoreResult<Vec<u32>> {
        self.add_flags(id, &[Flag::Deleted])
    }

    /// UID SEARCH `criteria` in the selected folder, ascending.
    pub fn search(&mut self, criteria: &str) -> StoreResult<Vec<u32>> {
        debug!("UID SEARCH {}", criteria);
        let Self { runtime, imap, .. } = self;
        let found = runtime.block_on(imap.uid_search(criteria))?;
        let mut ids: Vec<u32> = found.into_iter().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// UID STORE without untagged replies, e.g. `-FLAGS.SILENT (\Seen)`.
    fn store_silent(&mut self, ids: &[u32], query: &str) -> StoreResult<()> {
        let set = id_set(ids);
        debug!("UID STORE {} {}", set, query);
        let Self { runtime, imap, .. } = self;
        runtime.block_on(async {
            imap.uid_store(&set, query)
                .await?
                .try_collect::<Vec<_>>()
                .await
        })?;
        Ok(())
    }

    /// Permanently remove `ids`, which must already be `\Deleted`.
    ///
    /// Without UIDPLUS there is only the plain `EXPUNGE`, which takes
    /// every deleted message in the folder with it. Other deleted
    /// messages lose `\Deleted` around it and get it back afterwards.
    pub fn expunge(&mut self, ids: &[u32]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        if self.uidplus {
            let set = id_set(ids);
            debug!("UID EXPUNGE {}", set);
            let Self { runtime, imap, .. } = self;
            runtime.block_on(async {
                imap.uid_expunge(&set)
                    .await?
                    .try_collect::<Vec<_>>()
                    .await
            })?;
            return Ok(());
        }

        let others: Vec<u32> = self
            .search("DELETED")?
            .into_iter()
            .filter(|id| !ids.contains(id))
            .collect();
        if !others.is_empty() {
            self.store_silent(&others, "-FLAGS.SILENT (\\Deleted)")?;
        }

        debug!("EXPUNGE");
        let expunged = {
            let Self { runtime, imap, .. } = self;
            runtime.block_on(async { imap.expunge().await?.try_collect::<Vec<_>>().await })
        };

        let restored = if others.is_empty() {
            Ok(())
        } else {
            self.store_silent(&others, "+FLAGS.SILENT (\\Deleted)")
        };
        expunged?;
        restored
    }

    /// UID COPY one message into another folder.
    pub fn copy(&mut self, id: u32, destination: &str) -> StoreResult<()> {
        let wire = self.wire_name(destination);
        debug!("UID COPY {} {:?}", id, wire);
        let Self { runtime, imap, .. } = self;
        runtime.block_on(imap.uid_copy(id.to_string(), &wire))?;
        Ok(())
    }

    pub fn create_folder(&mut self, name: &str) -> StoreResult<()> {
        let wire = self.wire_name(name);
        debug!("CREATE {:?}", wire);
        let Self { runtime, imap, .. } = self;
        runtime.block_on(imap.create(&wire))?;
        Ok(())
    }

    pub fn delete_folder(&mut self, name: &str) -> StoreResult<()> {
        let wire = self.wire_name(name);
        debug!("DELETE {:?}", wire);
        let Self { runtime, imap, .. } = self;
        runtime.block_on(imap.delete(&wire))?;
        Ok(())
    }

    /// STATUS counters of a folder that need not be selected.
    pub fn status(&mut self, name: &str) -> StoreResult<FolderStatus> {
        let wire = self.wire_name(name);
        debug!("STATUS {:?}", wire);
        let Self { runtime, imap, .. } = self;
        let mailbox =
            runtime.block_on(imap.status(&wire, "(MESSAGES RECENT UIDNEXT UIDVALIDITY UNSEEN)"))?;
        Ok(FolderStatus {
            messages: Some(mailbox.exists),
            recent: Some(mailbox.recent),
            uid_next: mailbox.uid_next,
            uid_validity: mailbox.uid_validity,
            unseen: mailbox.unseen,
        })
    }
}

fn id_set(ids: &[u32]) -> String {
    ids.iter().map(u32::to_string).collect::<Vec<_>>().join(",")
}

/// Quote a string for use as an IMAP quoted string.
fn quote(raw: &str) -> String {
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

fn attribute_name(attribute: &NameAttribute<'_>) -> String {
    match attribute {
        NameAttribute::NoInferiors => NO_INFERIORS.to_string(),
        NameAttribute::NoSelect => "\\Noselect".to_string(),
        NameAttribute::Marked => "\\Marked".to_string(),
        NameAttribute::Unmarked => "\\Unmarked".to_string(),
        NameAttribute::Extension(ext) => ext.to_string(),
        other => format!("\\{other:?}"),
    }
}

fn message_record(fetch: &Fetch, fields: &[FetchField]) -> Option<FetchedMessage> {
    let id = fetch.uid?;
    Some(FetchedMessage {
        id,
        size: fetch.size,
        flags: fields
            .contains(&FetchField::Flags)
            .then(|| fetch.flags().map(|f| Flag::from(&f).to_string()).collect()),
        envelope: fetch.envelope().map(envelope_record),
        header: fetch.header().map(<[u8]>::to_vec),
    })
}

fn envelope_record(envelope: &WireEnvelope<'_>) -> Envelope {
    Envelope {
        date: envelope
            .date
            .as_deref()
            .map(String::from_utf8_lossy)
            .and_then(|raw| mailparse::dateparse(&raw).ok())
            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        subject: envelope.subject.as_deref().map(decode_text),
        from: addresses(envelope.from.as_deref()),
        sender: addresses(envelope.sender.as_deref()),
        reply_to: addresses(envelope.reply_to.as_deref()),
        to: addresses(envelope.to.as_deref()),
        cc: addresses(envelope.cc.as_deref()),
        bcc: addresses(envelope.bcc.as_deref()),
        in_reply_to: envelope.in_reply_to.as_deref().map(decode_text),
        message_id: envelope.message_id.as_deref().map(decode_text),
    }
}

fn addresses(list: Option<&[WireAddress<'_>]>) -> Vec<Address> {
    list.unwrap_or_default()
        .iter()
        .map(|address| Address {
            name: address.name.as_deref().map(decode_text),
            mailbox: address.mailbox.as_deref().map(decode_text),
            host: address.host.as_deref().map(decode_text),
            route: address.adl.as_deref().map(decode_text),
        })
        .collect()
}

/// Decode an envelope string, resolving RFC 2047 encoded words.
pub(crate) fn decode_text(raw: &[u8]) -> String {
    let mut line = b"X: ".to_vec();
    line.extend_from_slice(raw);
    mailparse::parse_header(&line).map_or_else(
        |_| String::from_utf8_lossy(raw).into_owned(),
        |(header, _)| header.get_value(),
    )
}
