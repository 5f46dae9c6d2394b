//! IRC line codec.
//!
//! Parses and serializes single protocol lines, including IRCv3 message
//! tags and the CTCP ACTION framing used for `/me` messages.

use std::collections::HashMap;
use std::fmt;

/// Delimiter for CTCP payloads inside a PRIVMSG body.
const CTCP_DELIM: char = '\x01';

/// A single parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// IRCv3 tags (empty if none).
    pub tags: HashMap<String, String>,
    /// Source prefix without the leading `:`, e.g. `nick!user@host`.
    pub prefix: Option<String>,
    /// Command or numeric, e.g. `PRIVMSG` or `001`.
    pub command: String,
    /// Parameters; the trailing parameter is stored without its `:`.
    pub params: Vec<String>,
}

impl Message {
    /// Build a client-originated message (no prefix, no tags).
    pub fn new(command: &str, params: Vec<&str>) -> Self {
        Self {
            tags: HashMap::new(),
            prefix: None,
            command: command.to_string(),
            params: params.into_iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Parse one line. Trailing CR/LF is ignored. Returns `None` for blank
    /// lines or lines without a command.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        if rest.is_empty() {
            return None;
        }

        let mut tags = HashMap::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, remainder) = stripped.split_once(' ')?;
            for tag in raw_tags.split(';').filter(|t| !t.is_empty()) {
                match tag.split_once('=') {
                    Some((k, v)) => tags.insert(k.to_string(), unescape_tag(v)),
                    None => tags.insert(tag.to_string(), String::new()),
                };
            }
            rest = remainder.trim_start_matches(' ');
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (p, remainder) = stripped.split_once(' ')?;
            prefix = Some(p.to_string());
            rest = remainder.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((c, r)) => (c, r),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((p, r)) => {
                    params.push(p.to_string());
                    rest = r;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nick portion of the prefix (`nick!user@host` -> `nick`).
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .and_then(|p| p.split('!').next())
            .filter(|n| !n.is_empty())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            let mut keys: Vec<&String> = self.tags.keys().collect();
            keys.sort();
            let rendered: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    let v = &self.tags[k];
                    if v.is_empty() {
                        k.clone()
                    } else {
                        format!("{k}={}", escape_tag(v))
                    }
                })
                .collect();
            write!(f, "@{} ", rendered.join(";"))?;
        }
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{prefix} ")?;
        }
        write!(f, "{}", self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            let needs_colon =
                i == last && (param.is_empty() || param.contains(' ') || param.starts_with(':'));
            if needs_colon {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}

/// Wrap text in a CTCP ACTION envelope.
pub fn ctcp_action(text: &str) -> String {
    format!("{CTCP_DELIM}ACTION {text}{CTCP_DELIM}")
}

/// If `text` is a CTCP ACTION, return the action body.
pub fn parse_ctcp_action(text: &str) -> Option<&str> {
    let inner = text.strip_prefix(CTCP_DELIM)?;
    let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);
    inner
        .strip_prefix("ACTION ")
        .or_else(|| (inner == "ACTION").then_some(""))
}

/// The bytes of the last parameter of an unparsed line, without the `:`
/// or line ending. Used to recover message bodies that aren't valid UTF-8.
pub fn last_param_bytes(line: &[u8]) -> Option<&[u8]> {
    let end = line.iter().rposition(|&b| b != b'\r' && b != b'\n')? + 1;
    let mut rest = &line[..end];
    // Skip tags, then prefix. Neither contains a space.
    for lead in [b'@', b':'] {
        rest = trim_spaces(rest);
        if rest.first() == Some(&lead) {
            let space = rest.iter().position(|&b| b == b' ')?;
            rest = &rest[space..];
        }
    }
    match rest.windows(2).position(|w| w == b" :") {
        Some(start) => Some(&rest[start + 2..]),
        None => rest.rsplit(|&b| b == b' ').find(|p| !p.is_empty()),
    }
}

fn trim_spaces(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
    &bytes[start..]
}

fn unescape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn escape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_privmsg_with_prefix() {
        let msg = Message::parse(":alice!a@host PRIVMSG #bender :!? beer\r\n").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("alice!a@host"));
        assert_eq!(msg.source_nick(), Some("alice"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#bender", "!? beer"]);
    }

    #[test]
    fn parse_tags_and_numeric() {
        let msg = Message::parse("@time=2024-01-01T00:00:00Z;msgid=abc\\sdef :irc.example 001 bender :Welcome").unwrap();
        assert_eq!(msg.tags.get("time").unwrap(), "2024-01-01T00:00:00Z");
        assert_eq!(msg.tags.get("msgid").unwrap(), "abc def");
        assert_eq!(msg.command, "001");
        assert_eq!(msg.params, vec!["bender", "Welcome"]);
    }

    #[test]
    fn parse_without_trailing() {
        let msg = Message::parse("PING token123").unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["token123"]);
        assert!(Message::parse("\r\n").is_none());
    }

    #[test]
    fn display_adds_colon_only_when_needed() {
        let msg = Message::new("PRIVMSG", vec!["#bender", "hello there"]);
        assert_eq!(msg.to_string(), "PRIVMSG #bender :hello there");
        let msg = Message::new("JOIN", vec!["#bender"]);
        assert_eq!(msg.to_string(), "JOIN #bender");
    }

    #[test]
    fn last_param_keeps_raw_bytes() {
        let line = b"@msgid=x :alice!a@host PRIVMSG #bender :!! foo is \xff\xfebar\r\n";
        assert_eq!(last_param_bytes(line), Some(&b"!! foo is \xff\xfebar"[..]));
        assert_eq!(last_param_bytes(b"PRIVMSG #bender hi\r\n"), Some(&b"hi"[..]));
        assert_eq!(last_param_bytes(b":a!b@c PRIVMSG #x ::)"), Some(&b":)"[..]));
        assert_eq!(last_param_bytes(b"\r\n"), None);
    }

    #[test]
    fn ctcp_action_roundtrip() {
        let wrapped = ctcp_action("pours coffee");
        assert_eq!(wrapped, "\x01ACTION pours coffee\x01");
        assert_eq!(parse_ctcp_action(&wrapped), Some("pours coffee"));
        assert_eq!(parse_ctcp_action("plain text"), None);
        assert_eq!(parse_ctcp_action("\x01VERSION\x01"), None);
    }
}
