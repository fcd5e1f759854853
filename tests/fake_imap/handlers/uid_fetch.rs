//! UID FETCH command handler.
//!
//! Message bodies and header blocks travel as **counted literals**:
//!
//! ```text
//! * <seq> FETCH (UID <uid> RFC822.SIZE 87 BODY[] {87}
//! <exactly 87 bytes of raw RFC 2822 message>
//! )
//! ```
//!
//! The `{length}\r\n` marker tells the client that the next `length`
//! bytes are raw data, not IMAP protocol text. The ENVELOPE is built
//! from the stored message's own headers, with Sender and Reply-To
//! falling back to From as RFC 3501 Section 7.4.2 requires.
//!
//! `BODY[]` marks the message `\Seen`; `BODY.PEEK[]` leaves its flags
//! alone.

use crate::fake_imap::io::{complete, nstring, write_bytes};
use crate::fake_imap::mailbox::{Mailbox, TestEmail};
use imap_codec::imap_types::sequence::SequenceSet;
use mailparse::{MailAddr, MailHeader, MailHeaderMap, SingleInfo};
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// The data items a FETCH asked for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchItems {
    pub flags: bool,
    pub envelope: bool,
    pub size: bool,
    pub header: bool,
    pub body: bool,
    pub peek: bool,
}

impl FetchItems {
    /// Parse item names such as `FLAGS`, `RFC822.HEADER` or
    /// `BODY.PEEK[]`.
    pub fn parse(names: &[String]) -> Self {
        let mut items = Self::default();
        for name in names {
            match name.to_ascii_uppercase().as_str() {
                "FLAGS" => items.flags = true,
                "ENVELOPE" => items.envelope = true,
                "RFC822.SIZE" => items.size = true,
                "RFC822.HEADER" | "BODY.PEEK[HEADER]" => items.header = true,
                "BODY[]" | "RFC822" => items.body = true,
                "BODY.PEEK[]" => {
                    items.body = true;
                    items.peek = true;
                }
                _ => {}
            }
        }
        items
    }
}

/// Handle the UID FETCH command.
pub async fn handle_uid_fetch<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    sequence_set: &SequenceSet,
    items: FetchItems,
    mailbox: &Mutex<Mailbox>,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        complete(stream, tag, "BAD No folder selected").await;
        return;
    };

    // Render under lock (no await inside), write afterwards.
    let rendered = {
        let mut mb = mailbox.lock().unwrap();
        mb.get_folder_mut(folder_name).map(|folder| {
            let uids = super::uids_in(sequence_set, folder.max_uid());
            let mut responses = Vec::new();
            for (idx, email) in folder.emails.iter_mut().enumerate() {
                if !uids.contains(&email.uid) {
                    continue;
                }
                if items.body && !items.peek {
                    email.add_flag("\\Seen");
                }
                responses.push(fetch_response(idx + 1, email, items));
            }
            responses
        })
    };
    let Some(responses) = rendered else {
        complete(stream, tag, "BAD Folder not found").await;
        return;
    };

    for response in &responses {
        if write_bytes(stream, response).await.is_err() {
            return;
        }
    }
    complete(stream, tag, "OK FETCH completed").await;
}

/// One `* n FETCH (...)` response, literals included.
fn fetch_response(seq: usize, email: &TestEmail, items: FetchItems) -> Vec<u8> {
    let mut out = format!("* {seq} FETCH (UID {}", email.uid).into_bytes();
    if items.flags {
        out.extend_from_slice(format!(" FLAGS ({})", email.flags.join(" ")).as_bytes());
    }
    if items.size {
        out.extend_from_slice(format!(" RFC822.SIZE {}", email.raw.len()).as_bytes());
    }
    if items.envelope {
        out.extend_from_slice(b" ENVELOPE ");
        out.extend_from_slice(envelope(&email.raw).as_bytes());
    }
    if items.header {
        let header = email.header();
        out.extend_from_slice(format!(" RFC822.HEADER {{{}}}\r\n", header.len()).as_bytes());
        out.extend_from_slice(header);
    }
    if items.body {
        out.extend_from_slice(format!(" BODY[] {{{}}}\r\n", email.raw.len()).as_bytes());
        out.extend_from_slice(&email.raw);
    }
    out.extend_from_slice(b")\r\n");
    out
}

/// The ENVELOPE structure for a raw message.
fn envelope(raw: &[u8]) -> String {
    let headers = mailparse::parse_headers(raw)
        .map(|(headers, _)| headers)
        .unwrap_or_default();

    let text = |name: &str| headers.get_first_header(name).map(raw_value);
    let from = headers.get_first_header("From").map(address_list);
    let addresses = |name: &str| {
        headers
            .get_first_header(name)
            .map(address_list)
            .or_else(|| from.clone())
            .unwrap_or_else(|| "NIL".to_string())
    };
    let own = |name: &str| {
        headers
            .get_first_header(name)
            .map_or_else(|| "NIL".to_string(), address_list)
    };

    format!(
        "({} {} {} {} {} {} {} {} {} {})",
        nstring(text("Date").as_deref()),
        nstring(text("Subject").as_deref()),
        own("From"),
        addresses("Sender"),
        addresses("Reply-To"),
        own("To"),
        own("Cc"),
        own("Bcc"),
        nstring(text("In-Reply-To").as_deref()),
        nstring(text("Message-ID").as_deref()),
    )
}

/// The undecoded header value with folding removed; encoded words are
/// left for the client, as real servers do.
fn raw_value(header: &MailHeader<'_>) -> String {
    String::from_utf8_lossy(header.get_value_raw())
        .replace("\r\n", "")
        .replace('\n', "")
        .trim()
        .to_string()
}

/// `((name NIL mailbox host) ...)`, or `NIL` when nothing parses.
fn address_list(header: &MailHeader<'_>) -> String {
    let Ok(parsed) = mailparse::addrparse_header(header) else {
        return "NIL".to_string();
    };
    let singles: Vec<&SingleInfo> = parsed
        .iter()
        .flat_map(|addr| match addr {
            MailAddr::Single(info) => vec![info],
            MailAddr::Group(group) => group.addrs.iter().collect(),
        })
        .collect();
    if singles.is_empty() {
        return "NIL".to_string();
    }

    let rendered: Vec<String> = singles
        .iter()
        .map(|info| {
            let (mailbox, host) = info.addr.split_once('@').unwrap_or((info.addr.as_str(), ""));
            format!(
                "({} NIL {} {})",
                nstring(info.display_name.as_deref()),
                nstring(Some(mailbox)),
                nstring(Some(host)),
            )
        })
        .collect();
    format!("({})", rendered.join(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::testing::{output, pipe};
    use crate::fake_imap::mailbox::MailboxBuilder;
    use imap_codec::imap_types::sequence::{SeqOrUid, Sequence};
    use std::num::NonZeroU32;

    const RAW: &[u8] = b"From: Alice <alice@example.com>\r\n\
        To: bob@example.com\r\n\
        Subject: =?utf-8?q?caf=C3=A9?=\r\n\
        Date: Mon, 01 Jan 2024 10:00:00 +0000\r\n\
        \r\n\
        Body";

    fn uid_set(uid: u32) -> SequenceSet {
        SequenceSet(
            vec![Sequence::Single(SeqOrUid::Value(
                NonZeroU32::new(uid).unwrap(),
            ))]
            .try_into()
            .unwrap(),
        )
    }

    fn items(names: &[&str]) -> FetchItems {
        let names: Vec<String> = names.iter().map(ToString::to_string).collect();
        FetchItems::parse(&names)
    }

    async fn run(uid: u32, items: FetchItems, mailbox: &Mutex<Mailbox>) -> String {
        let (client, mut stream) = pipe();
        handle_uid_fetch("A1", &uid_set(uid), items, mailbox, Some("INBOX"), &mut stream).await;
        drop(stream);
        output(client).await
    }

    fn inbox() -> Mutex<Mailbox> {
        Mutex::new(
            MailboxBuilder::new()
                .folder("INBOX")
                .email(42, false, RAW)
                .flag("$Important")
                .build(),
        )
    }

    #[test]
    fn parses_item_names() {
        let parsed = items(&["FLAGS", "ENVELOPE", "RFC822.SIZE", "RFC822.HEADER"]);
        assert!(parsed.flags && parsed.envelope && parsed.size && parsed.header);
        assert!(!parsed.body);

        let peek = items(&["BODY.PEEK[]"]);
        assert!(peek.body && peek.peek);
    }

    #[tokio::test]
    async fn body_literal_matches_message() {
        let mailbox = inbox();
        let out = run(42, items(&["BODY.PEEK[]"]), &mailbox).await;

        assert!(out.contains(&format!("* 1 FETCH (UID 42 BODY[] {{{}}}\r\n", RAW.len())));
        assert!(out.contains("From: Alice"));
        assert!(out.ends_with("A1 OK FETCH completed\r\n"));
    }

    #[tokio::test]
    async fn peek_leaves_flags_alone() {
        let mailbox = inbox();
        run(42, items(&["BODY.PEEK[]"]), &mailbox).await;
        assert!(!mailbox.lock().unwrap().folders[0].emails[0].has_flag("\\Seen"));

        run(42, items(&["BODY[]"]), &mailbox).await;
        assert!(mailbox.lock().unwrap().folders[0].emails[0].has_flag("\\Seen"));
    }

    #[tokio::test]
    async fn metadata_items() {
        let mailbox = inbox();
        let out = run(
            42,
            items(&["FLAGS", "ENVELOPE", "RFC822.SIZE", "RFC822.HEADER"]),
            &mailbox,
        )
        .await;

        assert!(out.contains("FLAGS ($Important)"));
        assert!(out.contains(&format!("RFC822.SIZE {}", RAW.len())));
        assert!(out.contains("\"=?utf-8?q?caf=C3=A9?=\""));
        assert!(out.contains("((\"Alice\" NIL \"alice\" \"example.com\"))"));
        assert!(out.contains("RFC822.HEADER {"));
    }

    #[test]
    fn sender_and_reply_to_default_to_from() {
        let env = envelope(b"From: a@b.com\r\nSubject: s\r\n\r\n");
        assert_eq!(env.matches("(NIL NIL \"a\" \"b.com\")").count(), 3);
        assert!(env.starts_with("(NIL \"s\" "));
    }

    #[tokio::test]
    async fn missing_uid_returns_only_ok() {
        let out = run(99, items(&["FLAGS"]), &inbox()).await;
        assert_eq!(out, "A1 OK FETCH completed\r\n");
    }
}
