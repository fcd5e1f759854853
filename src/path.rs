//! Path translation
//!
//! Filesystem paths are absolute and slash separated. IMAP folder
//! names use whatever hierarchy delimiter the server picked, with no
//! leading or trailing delimiter. Messages live in files named
//! `<id>.eml`.

use crate::error::{Error, Result};

/// The only extension a message file may carry.
pub const MESSAGE_EXTENSION: &str = "eml";

/// Characters that may never appear in a filesystem path.
pub const INVALID_PATH_CHARS: &str = "\0";

/// Validate `path` and bring it into canonical absolute form.
///
/// Empty and `.` segments are dropped, `..` pops the previous segment.
pub fn normalize(path: &str) -> Result<String> {
    if path.contains(|c| INVALID_PATH_CHARS.contains(c)) {
        return Err(Error::Path {
            path: path.to_string(),
            message: "path contains invalid characters".to_string(),
        });
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(Error::Path {
                        path: path.to_string(),
                        message: "back reference above root".to_string(),
                    });
                }
            }
            other => segments.push(other),
        }
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Translate a filesystem path into a folder name on the store.
///
/// The root maps to the empty string.
#[must_use]
pub fn to_store_path(path: &str, delimiter: &str) -> String {
    path.trim_matches('/').replace('/', delimiter)
}

/// Split a file name into `(stem, extension)` on the last `.`.
#[must_use]
pub fn split_message_name(file_name: &str) -> (&str, &str) {
    file_name.rsplit_once('.').unwrap_or((file_name, ""))
}

/// The message id a file name refers to, if it is a well-formed
/// `<id>.eml` name.
#[must_use]
pub fn message_id(file_name: &str) -> Option<u32> {
    match split_message_name(file_name) {
        (stem, MESSAGE_EXTENSION) => stem.parse().ok().filter(|id| *id > 0),
        _ => None,
    }
}

/// The file name a message id is listed under.
#[must_use]
pub fn message_name(id: u32) -> String {
    format!("{id}.{MESSAGE_EXTENSION}")
}

/// Whether a file name asks for a message rather than a folder.
#[must_use]
pub fn is_message_name(file_name: &str) -> bool {
    split_message_name(file_name).1 == MESSAGE_EXTENSION
}

/// Split a canonical path into `(parent, name)`.
#[must_use]
pub fn split(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((parent, name)) => (parent, name),
        None => ("/", path),
    }
}

/// Join a relative path onto a canonical base path.
#[must_use]
pub fn join(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        if base.is_empty() { "/".to_string() } else { base.to_string() }
    } else {
        format!("{base}/{path}")
    }
}

/// Every proper ancestor of a canonical path, outermost first,
/// excluding the root.
#[must_use]
pub fn ancestors(path: &str) -> Vec<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    (1..segments.len())
        .map(|n| format!("/{}", segments[..n].join("/")))
        .collect()
}

/// Split a full folder name into `(parent, leaf)` on the delimiter.
///
/// Folders without a delimiter sit at the top level.
#[must_use]
pub fn split_folder_name<'a>(name: &'a str, delimiter: Option<&str>) -> (&'a str, &'a str) {
    match delimiter.filter(|d| !d.is_empty()) {
        Some(delimiter) => name.rsplit_once(delimiter).unwrap_or(("", name)),
        None => ("", name),
    }
}
