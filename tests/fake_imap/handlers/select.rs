//! SELECT command handler.
//!
//! Opens a folder and responds with metadata. The key pieces are:
//!
//! - `* N EXISTS` -- total number of messages in the folder.
//! - `* OK [UIDVALIDITY V]` -- a value that changes if the folder's
//!   UID space is reset.
//! - `* OK [UIDNEXT N]` -- the UID the next appended message gets.
//!
//! `\Noselect` folders and unknown names are refused with NO.
//! Returns the selected folder name (or `None` if refused).

use crate::fake_imap::io::{complete, write_line};
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the SELECT command. Returns the selected folder name.
pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> Option<String> {
    let Some(folder) = mailbox.get_folder(folder_name) else {
        complete(stream, tag, "NO Folder not found").await;
        return None;
    };
    if folder.no_select {
        complete(stream, tag, "NO Folder is not selectable").await;
        return None;
    }

    let mut lines = vec![
        "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n".to_string(),
        format!("* {} EXISTS\r\n", folder.emails.len()),
        "* 0 RECENT\r\n".to_string(),
        format!("* OK [UIDVALIDITY {}]\r\n", folder.uid_validity),
        format!("* OK [UIDNEXT {}]\r\n", folder.uid_next),
        "* OK [PERMANENTFLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft \\*)] Flags permitted\r\n"
            .to_string(),
    ];
    if let Some(pos) = folder.emails.iter().position(|e| !e.has_flag("\\Seen")) {
        lines.push(format!("* OK [UNSEEN {}]\r\n", pos + 1));
    }

    for line in &lines {
        if write_line(stream, line).await.is_err() {
            return None;
        }
    }
    complete(stream, tag, "OK [READ-WRITE] SELECT completed").await;
    Some(folder_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::testing::{output, pipe};
    use crate::fake_imap::mailbox::MailboxBuilder;

    const RAW: &[u8] = b"From: a@b.com\r\nSubject: Test\r\n\r\nBody";

    async fn run(folder_name: &str, mailbox: &Mailbox) -> (String, Option<String>) {
        let (client, mut stream) = pipe();
        let selected = handle_select("A1", folder_name, mailbox, &mut stream).await;
        drop(stream);
        (output(client).await, selected)
    }

    #[tokio::test]
    async fn selects_existing_folder() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(1, false, RAW)
            .email(2, true, RAW)
            .build();

        let (out, selected) = run("INBOX", &mailbox).await;

        assert_eq!(selected.as_deref(), Some("INBOX"));
        assert!(out.contains("* 2 EXISTS"));
        assert!(out.contains("* OK [UIDNEXT 3]"));
        assert!(out.contains("* OK [UNSEEN 1]"));
        assert!(out.ends_with("A1 OK [READ-WRITE] SELECT completed\r\n"));
    }

    #[tokio::test]
    async fn refuses_missing_folder() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();
        let (out, selected) = run("Nope", &mailbox).await;

        assert!(selected.is_none());
        assert_eq!(out, "A1 NO Folder not found\r\n");
    }

    #[tokio::test]
    async fn refuses_noselect_folder() {
        let mailbox = MailboxBuilder::new().folder("Shared").no_select().build();
        let (out, selected) = run("Shared", &mailbox).await;

        assert!(selected.is_none());
        assert!(out.starts_with("A1 NO"));
    }

    #[tokio::test]
    async fn no_unseen_when_all_read() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(1, true, RAW)
            .build();
        let (out, _) = run("INBOX", &mailbox).await;
        assert!(!out.contains("UNSEEN"));
    }
}
