//! Relayed events and how they are rendered onto other networks.

/// Inserted after the first character of every relayed nickname. Two IRC
/// underline toggles render as nothing, but the nick no longer matches
/// highlight patterns on the destination network.
pub const NO_OP_PAIR: &str = "\x1F\x1F";

/// Break `nick` so that relaying it does not ping the person of the same
/// name on the destination network.
pub fn decorate(nick: &str) -> String {
    let mut chars = nick.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let mut out = String::with_capacity(nick.len() + NO_OP_PAIR.len());
    out.push(first);
    out.push_str(NO_OP_PAIR);
    out.push_str(chars.as_str());
    out
}

/// Inverse of [`decorate`].
pub fn undecorate(decorated: &str) -> String {
    let mut chars = decorated.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let rest = chars.as_str();
    let rest = rest.strip_prefix(NO_OP_PAIR).unwrap_or(rest);
    let mut out = String::with_capacity(decorated.len());
    out.push(first);
    out.push_str(rest);
    out
}

/// Something that happened on one network and is worth telling the others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayedEvent {
    Message {
        actor: String,
        text: String,
    },
    Action {
        actor: String,
        text: String,
    },
    Join {
        actor: String,
        channel: String,
    },
    Part {
        actor: String,
        channel: String,
        reason: Option<String>,
    },
    Kick {
        actor: String,
        target: String,
        channel: String,
        reason: Option<String>,
    },
    Quit {
        actor: String,
        reason: Option<String>,
    },
    NickChange {
        actor: String,
        new_nick: String,
    },
}

/// Which wire verb the line goes out with on the destination network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Message,
    Action,
}

/// A fully rendered line, ready for every peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayLine {
    pub kind: LineKind,
    pub text: String,
}

impl RelayedEvent {
    /// Short name for logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Action { .. } => "action",
            Self::Join { .. } => "join",
            Self::Part { .. } => "part",
            Self::Kick { .. } => "kick",
            Self::Quit { .. } => "quit",
            Self::NickChange { .. } => "nick",
        }
    }

    /// Render the event as seen from the network named `identifier`.
    ///
    /// Chat lines read `(<id>:<nick>) <text>`, presence lines
    /// `<id>:<nick> <verb phrase>`. A missing or empty reason drops the
    /// parenthetical.
    pub fn render(&self, identifier: &str) -> RelayLine {
        let message = |text: String| RelayLine {
            kind: LineKind::Message,
            text,
        };
        match self {
            Self::Message { actor, text } => {
                message(format!("({identifier}:{}) {text}", decorate(actor)))
            }
            Self::Action { actor, text } => RelayLine {
                kind: LineKind::Action,
                text: format!("({identifier}:{}) {text}", decorate(actor)),
            },
            Self::Join { actor, .. } => {
                message(format!("{identifier}:{} has joined", decorate(actor)))
            }
            Self::Part { actor, reason, .. } => message(format!(
                "{identifier}:{} has left{}",
                decorate(actor),
                parenthesized(reason)
            )),
            Self::Kick {
                actor,
                target,
                reason,
                ..
            } => message(format!(
                "{identifier}:{} has kicked {}{}",
                decorate(actor),
                decorate(target),
                parenthesized(reason)
            )),
            Self::Quit { actor, reason } => message(format!(
                "{identifier}:{} has quit{}",
                decorate(actor),
                parenthesized(reason)
            )),
            Self::NickChange { actor, new_nick } => message(format!(
                "{identifier}:{} is now known as {}",
                decorate(actor),
                decorate(new_nick)
            )),
        }
    }
}

fn parenthesized(reason: &Option<String>) -> String {
    match reason.as_deref() {
        Some(r) if !r.is_empty() => format!(" ({r})"),
        _ => String::new(),
    }
}
