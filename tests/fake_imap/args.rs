//! Raw argument parsing for commands the server reads without
//! `imap-codec`.
//!
//! APPEND carries a literal that only arrives after a continuation
//! request, and LIST patterns, STATUS items, flag lists and UIDPLUS
//! sets are easier to take apart by hand than to convert from
//! imap-types. The tokenizer understands atoms, quoted strings with
//! backslash escapes, and parenthesized lists (kept whole).

/// One client command line split into tag, upper-cased verb and the
/// argument tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub tag: String,
    pub verb: String,
    pub args: Vec<String>,
}

impl RawCommand {
    /// Split a command line. `UID <verb>` is folded into one verb, e.g.
    /// `UID EXPUNGE`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = tokenize(line.trim_end_matches(['\r', '\n']));
        if tokens.len() < 2 {
            return None;
        }
        let mut rest = tokens.split_off(2);
        let mut verb = tokens[1].to_ascii_uppercase();
        if verb == "UID" && !rest.is_empty() {
            verb = format!("UID {}", rest.remove(0).to_ascii_uppercase());
        }
        Some(Self {
            tag: tokens.swap_remove(0),
            verb,
            args: rest,
        })
    }

    /// Argument `idx`, with quoting removed.
    pub fn arg(&self, idx: usize) -> Option<String> {
        self.args.get(idx).map(|a| unquote(a))
    }
}

/// Split on whitespace outside quotes and parentheses.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escaped = false;

    for c in line.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                quoted = !quoted;
            }
            '(' if !quoted => {
                depth += 1;
                current.push(c);
            }
            ')' if !quoted => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ' ' if !quoted && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Strip surrounding quotes and resolve backslash escapes. Atoms are
/// returned unchanged.
pub fn unquote(token: &str) -> String {
    let Some(inner) = token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
    else {
        return token.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
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

/// Items of a parenthesized list: `(\Seen $Important)` becomes
/// `["\Seen", "$Important"]`. A bare atom is a one-item list.
pub fn list_items(token: &str) -> Vec<String> {
    let inner = token
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(token);
    tokenize(inner).iter().map(|t| unquote(t)).collect()
}

/// The byte count of a trailing `{n}` or `{n+}` literal marker.
pub fn literal_len(token: &str) -> Option<usize> {
    token
        .strip_prefix('{')?
        .strip_suffix('}')?
        .trim_end_matches('+')
        .parse()
        .ok()
}

/// Expand a UID set such as `1,3:5,7:*`. `*` stands for `max`.
pub fn uid_set(set: &str, max: u32) -> Vec<u32> {
    let value = |v: &str| {
        if v == "*" {
            Some(max)
        } else {
            v.parse().ok()
        }
    };
    let mut uids = Vec::new();
    for part in set.split(',') {
        match part.split_once(':') {
            Some((a, b)) => {
                if let (Some(a), Some(b)) = (value(a), value(b)) {
                    uids.extend(a.min(b)..=a.max(b));
                }
            }
            None => uids.extend(value(part)),
        }
    }
    uids
}

/// Match a LIST pattern: `*` matches anything, `%` anything but the
/// hierarchy delimiter.
pub fn matches_pattern(pattern: &str, name: &str, delimiter: Option<char>) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    matches_from(&pattern, &name, delimiter)
}

fn matches_from(pattern: &[char], name: &[char], delimiter: Option<char>) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some(('*', rest)) => (0..=name.len()).any(|i| matches_from(rest, &name[i..], delimiter)),
        Some(('%', rest)) => (0..=name.len())
            .take_while(|&i| i == 0 || Some(name[i - 1]) != delimiter)
            .any(|i| matches_from(rest, &name[i..], delimiter)),
        Some((c, rest)) => name
            .split_first()
            .is_some_and(|(n, tail)| n == c && matches_from(rest, tail, delimiter)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_arguments() {
        let cmd = RawCommand::parse("A0003 LIST \"\" \"INBOX.My \\\"Box\\\"\"\r\n").unwrap();
        assert_eq!(cmd.tag, "A0003");
        assert_eq!(cmd.verb, "LIST");
        assert_eq!(cmd.arg(0).unwrap(), "");
        assert_eq!(cmd.arg(1).unwrap(), "INBOX.My \"Box\"");
    }

    #[test]
    fn folds_uid_prefix() {
        let cmd = RawCommand::parse("A9 uid expunge 3,4").unwrap();
        assert_eq!(cmd.verb, "UID EXPUNGE");
        assert_eq!(cmd.args, ["3,4"]);
    }

    #[test]
    fn keeps_lists_whole() {
        let cmd = RawCommand::parse("A1 STATUS \"INBOX\" (MESSAGES UNSEEN)").unwrap();
        assert_eq!(cmd.args, ["\"INBOX\"", "(MESSAGES UNSEEN)"]);
        assert_eq!(list_items(&cmd.args[1]), ["MESSAGES", "UNSEEN"]);
    }

    #[test]
    fn literal_markers() {
        assert_eq!(literal_len("{42}"), Some(42));
        assert_eq!(literal_len("{7+}"), Some(7));
        assert_eq!(literal_len("42"), None);
    }

    #[test]
    fn expands_uid_sets() {
        assert_eq!(uid_set("1,3:5", 9), [1, 3, 4, 5]);
        assert_eq!(uid_set("8:*", 9), [8, 9]);
        assert_eq!(uid_set("x", 9), Vec::<u32>::new());
    }

    #[test]
    fn list_wildcards() {
        let dot = Some('.');
        assert!(matches_pattern("*", "INBOX.a.b", dot));
        assert!(matches_pattern("INBOX*", "INBOX.a", dot));
        assert!(matches_pattern("INBOX.%", "INBOX.a", dot));
        assert!(!matches_pattern("INBOX.%", "INBOX.a.b", dot));
        assert!(matches_pattern("INBOX", "INBOX", dot));
        assert!(!matches_pattern("INBOX", "INBOX.a", dot));
    }
}
