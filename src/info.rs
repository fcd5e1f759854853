//! Resource descriptors
//!
//! An [`Info`] describes one directory (folder) or file (message).
//! It is grouped into namespaces: `basic` is always present, `details`
//! carries type, size and timestamps, and `mail` carries what the store
//! knows beyond a plain filesystem: flags, folder counters, envelope
//! and headers. Anything the server did not report is left out rather
//! than defaulted.

use crate::error::Error;
use crate::path;
use crate::store::{Address, FetchedMessage, FolderStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A group of descriptor fields that can be requested separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Basic,
    Details,
    Mail,
}

impl FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "details" => Ok(Self::Details),
            "mail" | "imap" => Ok(Self::Mail),
            other => Err(Error::OperationFailed(format!("unknown namespace '{other}'"))),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Basic => "basic",
            Self::Details => "details",
            Self::Mail => "mail",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Directory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Basic {
    pub name: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Details {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessed: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl Details {
    const fn of(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            size: None,
            accessed: None,
            modified: None,
            created: None,
        }
    }
}

/// `(display name, mailbox, host, route)`
pub type AddressTuple = (Option<String>, Option<String>, Option<String>, Option<String>);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MailInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uidnext: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uidvalidity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unseen: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Vec<AddressTuple>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<Vec<AddressTuple>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Vec<AddressTuple>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Vec<AddressTuple>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<Vec<AddressTuple>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bcc: Option<Vec<AddressTuple>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<BTreeMap<String, String>>,
}

/// Descriptor of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Info {
    pub basic: Basic,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Details>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail: Option<MailInfo>,
}

impl Info {
    /// The synthetic root directory.
    #[must_use]
    pub fn root() -> Self {
        Self {
            basic: Basic {
                name: String::new(),
                is_dir: true,
            },
            details: Some(Details::of(ResourceType::Directory)),
            mail: None,
        }
    }

    /// A folder, with its LIST flags and, when fetched, its STATUS
    /// counters.
    #[must_use]
    pub(crate) fn directory(name: &str, flags: &[String], status: Option<&FolderStatus>) -> Self {
        let mut mail = MailInfo {
            flags: Some(flags.to_vec()),
            ..MailInfo::default()
        };
        if let Some(status) = status {
            mail.messages = status.messages;
            mail.recent = status.recent;
            mail.uidnext = status.uid_next;
            mail.uidvalidity = status.uid_validity;
            mail.unseen = status.unseen;
        }

        Self {
            basic: Basic {
                name: name.to_string(),
                is_dir: true,
            },
            details: Some(Details::of(ResourceType::Directory)),
            mail: Some(mail),
        }
    }

    /// A message, named `<id>.eml`, with whatever fields were fetched.
    #[must_use]
    pub(crate) fn message(id: u32, fetched: Option<&FetchedMessage>) -> Self {
        let mut details = Details::of(ResourceType::File);
        let mut mail: Option<MailInfo> = None;

        if let Some(fetched) = fetched {
            details.size = fetched.size.map(u64::from);

            if let Some(flags) = &fetched.flags {
                mail.get_or_insert_with(MailInfo::default).flags = Some(flags.clone());
            }

            if let Some(envelope) = &fetched.envelope {
                // The store keeps a single date per message.
                details.accessed = envelope.date;
                details.modified = envelope.date;
                details.created = envelope.date;

                let mail = mail.get_or_insert_with(MailInfo::default);
                mail.subject.clone_from(&envelope.subject);
                mail.from = address_tuples(&envelope.from);
                mail.sender = address_tuples(&envelope.sender);
                mail.reply_to = address_tuples(&envelope.reply_to);
                mail.to = address_tuples(&envelope.to);
                mail.cc = address_tuples(&envelope.cc);
                mail.bcc = address_tuples(&envelope.bcc);
                mail.in_reply_to.clone_from(&envelope.in_reply_to);
                mail.message_id.clone_from(&envelope.message_id);
            }

            if let Some(header) = &fetched.header {
                mail.get_or_insert_with(MailInfo::default).header = Some(parse_header(header));
            }
        }

        Self {
            basic: Basic {
                name: path::message_name(id),
                is_dir: false,
            },
            details: Some(details),
            mail,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.basic.name
    }

    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.basic.is_dir
    }

    #[must_use]
    pub const fn is_file(&self) -> bool {
        !self.basic.is_dir
    }

    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.details.as_ref().and_then(|d| d.size)
    }

    #[must_use]
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.details.as_ref().and_then(|d| d.modified)
    }

    #[must_use]
    pub fn flags(&self) -> Option<&[String]> {
        self.mail.as_ref().and_then(|m| m.flags.as_deref())
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.mail.as_ref().and_then(|m| m.subject.as_deref())
    }

    /// Whether a namespace is present in this descriptor.
    #[must_use]
    pub const fn has_namespace(&self, namespace: Namespace) -> bool {
        match namespace {
            Namespace::Basic => true,
            Namespace::Details => self.details.is_some(),
            Namespace::Mail => self.mail.is_some(),
        }
    }

    /// Keep only the requested namespaces. `basic` always stays.
    #[must_use]
    pub fn restrict(mut self, namespaces: &[Namespace]) -> Self {
        if !namespaces.contains(&Namespace::Details) {
            self.details = None;
        }
        if !namespaces.contains(&Namespace::Mail) {
            self.mail = None;
        }
        self
    }
}

fn address_tuples(addresses: &[Address]) -> Option<Vec<AddressTuple>> {
    if addresses.is_empty() {
        return None;
    }
    Some(
        addresses
            .iter()
            .map(|a| {
                (
                    a.name.clone(),
                    a.mailbox.clone(),
                    a.host.clone(),
                    a.route.clone(),
                )
            })
            .collect(),
    )
}

/// Header block as a map. Duplicate keys keep the last value.
fn parse_header(raw: &[u8]) -> BTreeMap<String, String> {
    mailparse::parse_headers(raw)
        .map(|(headers, _)| {
            headers
                .iter()
                .map(|h| (h.get_key(), h.get_value()))
                .collect()
        })
        .unwrap_or_default()
}
