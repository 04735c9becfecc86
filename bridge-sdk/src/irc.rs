//! IRC line codec: `[@tags] [:prefix] COMMAND params... [:trailing]`.
//!
//! IRCv3 tags are accepted on input and skipped; nothing here sends them.

use std::fmt;

/// One parsed IRC protocol line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// Source of the message (`nick!user@host` or a server name).
    pub prefix: Option<String>,
    /// Command or three-digit numeric, upper-cased.
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    /// Build an outbound message with no tags and no prefix.
    pub fn new(command: &str, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command: command.to_string(),
            params,
        }
    }

    /// Parse a single line. Returns `None` for blank or truncated lines.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest: &str = line.trim_end_matches(['\r', '\n']);

        if let Some(stripped) = rest.strip_prefix('@') {
            let (_tags, tail) = stripped.split_once(' ')?;
            rest = tail.trim_start_matches(' ');
        }

        let prefix = match rest.strip_prefix(':') {
            Some(stripped) => {
                let (prefix, tail) = stripped.split_once(' ')?;
                rest = tail.trim_start_matches(' ');
                Some(prefix.to_string())
            }
            None => None,
        };

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            let current = rest.trim_start_matches(' ');
            if current.is_empty() {
                break;
            }
            if let Some(trailing) = current.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match current.split_once(' ') {
                Some((param, tail)) => {
                    params.push(param.to_string());
                    rest = tail;
                }
                None => {
                    params.push(current.to_string());
                    break;
                }
            }
        }

        Some(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nickname part of the prefix (`nick` in `nick!user@host`).
    pub fn nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .and_then(|p| p.split('!').next())
            .filter(|n| !n.is_empty())
    }

    /// Whether the prefix is a user mask rather than a server name.
    pub fn from_user(&self) -> bool {
        self.prefix.as_deref().is_some_and(|p| p.contains('!'))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;
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

/// Channel names start with one of the RFC 2811 channel prefixes.
pub fn is_channel(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}

/// Body of a CTCP ACTION, if `text` is one.
pub fn parse_action(text: &str) -> Option<&str> {
    let body = text.strip_prefix("\x01ACTION")?;
    let body = body.strip_suffix('\x01').unwrap_or(body);
    if body.is_empty() {
        return Some("");
    }
    body.strip_prefix(' ')
}

/// Wrap `text` in CTCP ACTION framing.
pub fn format_action(text: &str) -> String {
    format!("\x01ACTION {text}\x01")
}

/// Compare nicknames or channel names under RFC 1459 casemapping, where
/// `[]\~` are the upper-case forms of `{}|^`.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.chars().zip(b.chars()).all(|(x, y)| fold(x) == fold(y))
}

fn fold(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        other => other.to_ascii_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_privmsg_with_prefix_and_trailing() {
        let msg = Message::parse(":bob!b@host PRIVMSG #lobby :hello there\r\n").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("bob!b@host"));
        assert_eq!(msg.nick(), Some("bob"));
        assert!(msg.from_user());
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#lobby", "hello there"]);
    }

    #[test]
    fn parse_skips_tags() {
        let msg = Message::parse("@time=2025-01-01T00:00:00Z;msgid=a\\sb;+flag :srv NOTICE * :hi").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("srv"));
        assert_eq!(msg.command, "NOTICE");
        assert_eq!(msg.params, vec!["*", "hi"]);
        assert!(!msg.from_user());
    }

    #[test]
    fn parse_without_prefix() {
        let msg = Message::parse("PING :irc.example.net").unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.nick(), None);
        assert_eq!(msg.params, vec!["irc.example.net"]);
    }

    #[test]
    fn parse_middle_params_and_empty_trailing() {
        let msg = Message::parse(":mod!m@h KICK #lobby eve :").unwrap();
        assert_eq!(msg.params, vec!["#lobby", "eve", ""]);

        let msg = Message::parse(":srv 001 bridge Welcome").unwrap();
        assert_eq!(msg.command, "001");
        assert_eq!(msg.params, vec!["bridge", "Welcome"]);
    }

    #[test]
    fn parse_lowercase_command_is_normalized() {
        let msg = Message::parse("ping x").unwrap();
        assert_eq!(msg.command, "PING");
    }

    #[test]
    fn parse_rejects_blank_and_truncated_lines() {
        assert!(Message::parse("").is_none());
        assert!(Message::parse("\r\n").is_none());
        assert!(Message::parse(":prefixonly").is_none());
        assert!(Message::parse("@tagsonly").is_none());
    }

    #[test]
    fn display_adds_colon_only_when_needed() {
        let msg = Message::new("PRIVMSG", vec!["#a".into(), "two words".into()]);
        assert_eq!(msg.to_string(), "PRIVMSG #a :two words");

        let msg = Message::new("MODE", vec!["bridge".into(), "+B".into()]);
        assert_eq!(msg.to_string(), "MODE bridge +B");

        let msg = Message::new("PRIVMSG", vec!["#a".into(), ":)".into()]);
        assert_eq!(msg.to_string(), "PRIVMSG #a ::)");
    }

    #[test]
    fn rfc1459_casemapping() {
        assert!(irc_eq("Bridge", "bridge"));
        assert!(irc_eq("bridge[1]", "BRIDGE{1}"));
        assert!(irc_eq("a\\b~c", "a|b^c"));
        assert!(irc_eq("#Relay", "#relay"));
        assert!(!irc_eq("bridge", "bridge_"));
        assert!(!irc_eq("bridge[1]", "bridge(1)"));
        assert!(irc_eq("", ""));
    }

    #[test]
    fn channel_detection() {
        assert!(is_channel("#rust"));
        assert!(is_channel("&local"));
        assert!(!is_channel("bob"));
        assert!(!is_channel(""));
    }

    #[test]
    fn action_framing() {
        assert_eq!(parse_action("\x01ACTION waves\x01"), Some("waves"));
        assert_eq!(parse_action("\x01ACTION waves"), Some("waves"));
        assert_eq!(parse_action("\x01ACTION\x01"), Some(""));
        assert_eq!(parse_action("\x01ACTIONS\x01"), None);
        assert_eq!(parse_action("\x01VERSION\x01"), None);
        assert_eq!(parse_action("plain text"), None);
        assert_eq!(format_action("waves"), "\x01ACTION waves\x01");
    }
}
