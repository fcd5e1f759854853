//! LIST command handler.
//!
//! The reference name is prefixed to the pattern, as most servers do,
//! and the result is matched against every folder with the `*` and `%`
//! wildcards. The format follows RFC 3501 Section 7.2.2:
//!
//! ```text
//! * LIST (\HasChildren) "." "INBOX"
//! * LIST (\HasNoChildren) "." "INBOX.Sent"
//! A0002 OK LIST completed
//! ```

use crate::fake_imap::args::matches_pattern;
use crate::fake_imap::io::{astring, complete, write_line};
use crate::fake_imap::mailbox::{Folder, Mailbox};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the LIST command. Emits one `* LIST` line per matching
/// folder.
pub async fn handle_list<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    reference: &str,
    pattern: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) {
    let full = format!("{reference}{pattern}");
    for folder in &mailbox.folders {
        if !matches_pattern(&full, &folder.name, mailbox.delimiter) {
            continue;
        }
        if write_line(stream, &list_line(folder, mailbox)).await.is_err() {
            return;
        }
    }
    complete(stream, tag, "OK LIST completed").await;
}

fn list_line(folder: &Folder, mailbox: &Mailbox) -> String {
    let mut attributes = Vec::new();
    if folder.no_inferiors {
        attributes.push("\\Noinferiors");
    } else if mailbox.has_children(&folder.name) {
        attributes.push("\\HasChildren");
    } else {
        attributes.push("\\HasNoChildren");
    }
    if folder.no_select {
        attributes.push("\\Noselect");
    }

    let delimiter = mailbox
        .delimiter
        .map_or_else(|| "NIL".to_string(), |d| astring(&d.to_string()));
    format!(
        "* LIST ({}) {delimiter} {}\r\n",
        attributes.join(" "),
        astring(&folder.name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::testing::{output, pipe};
    use crate::fake_imap::mailbox::MailboxBuilder;

    async fn run(reference: &str, pattern: &str, mailbox: &Mailbox) -> String {
        let (client, mut stream) = pipe();
        handle_list("A1", reference, pattern, mailbox, &mut stream).await;
        drop(stream);
        output(client).await
    }

    fn tree() -> Mailbox {
        MailboxBuilder::new()
            .folder("INBOX")
            .folder("INBOX.Sent")
            .folder("INBOX.Sent.2024")
            .folder("Notes")
            .no_inferiors()
            .build()
    }

    #[tokio::test]
    async fn star_lists_everything() {
        let out = run("", "*", &tree()).await;
        assert_eq!(out.matches("* LIST").count(), 4);
        assert!(out.ends_with("A1 OK LIST completed\r\n"));
    }

    #[tokio::test]
    async fn reference_scopes_the_pattern() {
        let out = run("INBOX.Sent", "*", &tree()).await;
        assert!(out.contains("\"INBOX.Sent\""));
        assert!(out.contains("\"INBOX.Sent.2024\""));
        assert!(!out.contains("\"INBOX\"\r\n"));
        assert!(!out.contains("Notes"));
    }

    #[tokio::test]
    async fn quoted_exact_name() {
        let out = run("", "INBOX", &tree()).await;
        assert_eq!(out.matches("* LIST").count(), 1);
        assert!(out.contains("(\\HasChildren) \".\" \"INBOX\""));
    }

    #[tokio::test]
    async fn marks_childless_folders() {
        let out = run("", "Notes", &tree()).await;
        assert!(out.contains("(\\Noinferiors) \".\" \"Notes\""));
    }

    #[tokio::test]
    async fn flat_store_has_nil_delimiter() {
        let mailbox = MailboxBuilder::new().delimiter(None).folder("INBOX").build();
        let out = run("", "*", &mailbox).await;
        assert!(out.contains("(\\HasNoChildren) NIL \"INBOX\""));
    }

    #[tokio::test]
    async fn empty_mailbox_returns_only_ok() {
        let out = run("", "*", &MailboxBuilder::new().build()).await;
        assert_eq!(out, "A1 OK LIST completed\r\n");
    }
}
