//! IMAP message flags
//!
//! Message flags surface as a string list on the `mail` namespace and
//! are the only metadata writable through `setinfo`. System flags have
//! dedicated variants; anything else is a keyword.

use std::fmt;

/// An IMAP message flag.
///
/// # Examples
///
/// ```
/// use imapfs::Flag;
///
/// assert_eq!(Flag::Seen.as_imap_str(), "\\Seen");
/// assert_eq!(Flag::from("\\flagged"), Flag::Flagged);
/// assert_eq!(Flag::from("$Important").as_imap_str(), "$Important");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message has been answered (`\Answered`).
    Answered,
    /// Message is flagged for attention (`\Flagged`).
    Flagged,
    /// Message is marked for deletion (`\Deleted`).
    Deleted,
    /// Message is a draft (`\Draft`).
    Draft,
    /// Message arrived since the last session (`\Recent`).
    Recent,
    /// A user-defined keyword flag (no `\` prefix).
    Keyword(String),
}

impl Flag {
    /// The IMAP wire representation of this flag.
    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(kw) => kw,
        }
    }

    /// Whether the flag can be sent in a `STORE`. System flags always
    /// can; a keyword must be a non-empty IMAP atom.
    ///
    /// ```
    /// use imapfs::Flag;
    ///
    /// assert!(Flag::from("$Important").is_valid());
    /// assert!(!Flag::from("two words").is_valid());
    /// ```
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Keyword(kw) => !kw.is_empty() && kw.bytes().all(is_atom_char),
            _ => true,
        }
    }

    /// Render a list of flags as an IMAP parenthesized flag list.
    #[must_use]
    pub fn list(flags: &[Self]) -> String {
        let inner: Vec<&str> = flags.iter().map(Self::as_imap_str).collect();
        format!("({})", inner.join(" "))
    }
}

impl From<&str> for Flag {
    /// System flag names match case-insensitively.
    fn from(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "\\seen" => Self::Seen,
            "\\answered" => Self::Answered,
            "\\flagged" => Self::Flagged,
            "\\deleted" => Self::Deleted,
            "\\draft" => Self::Draft,
            "\\recent" => Self::Recent,
            _ => Self::Keyword(raw.to_string()),
        }
    }
}

impl From<&async_imap::types::Flag<'_>> for Flag {
    fn from(flag: &async_imap::types::Flag<'_>) -> Self {
        use async_imap::types::Flag as Wire;

        match flag {
            Wire::Seen => Self::Seen,
            Wire::Answered => Self::Answered,
            Wire::Flagged => Self::Flagged,
            Wire::Deleted => Self::Deleted,
            Wire::Draft => Self::Draft,
            Wire::Recent => Self::Recent,
            Wire::MayCreate => Self::Keyword("\\*".to_string()),
            Wire::Custom(kw) => Self::Keyword(kw.to_string()),
        }
    }
}

/// `ATOM-CHAR` of RFC 3501: printable ASCII minus the specials.
const fn is_atom_char(byte: u8) -> bool {
    byte.is_ascii_graphic()
        && !matches!(byte, b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'\\' | b']')
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}
