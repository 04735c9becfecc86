//! Events emitted by the IRC client for the consumer to handle.

/// Events that the SDK emits to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// TCP (and TLS, if enabled) is up; registration is about to start.
    Connected,

    /// IRC registration complete. `nick` is our confirmed nick.
    Registered {
        nick: String,
    },

    /// Someone (possibly us) joined a channel.
    Joined {
        channel: String,
        nick: String,
    },

    /// Someone (possibly us) left a channel.
    Parted {
        channel: String,
        nick: String,
        reason: Option<String>,
    },

    /// A PRIVMSG to a channel or to us.
    Message {
        from: String,
        target: String,
        text: String,
    },

    /// A CTCP ACTION (`/me`), with the CTCP framing stripped.
    Action {
        from: String,
        target: String,
        text: String,
    },

    /// Someone was kicked from a channel.
    Kicked {
        channel: String,
        nick: String,
        by: String,
        reason: Option<String>,
    },

    /// A user changed nick.
    NickChanged {
        old_nick: String,
        new_nick: String,
    },

    /// Someone quit the server.
    UserQuit {
        nick: String,
        reason: Option<String>,
    },

    /// Server sent a notice, an error numeric or an ERROR line.
    ServerNotice {
        text: String,
    },

    /// Connection was closed. The client reconnects unless we asked to quit.
    Disconnected {
        reason: String,
    },
}
