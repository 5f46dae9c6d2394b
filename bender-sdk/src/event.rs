//! Events emitted by the IRC client for the bot layer to consume.

/// Events that the SDK emits to the consumer.
#[derive(Debug, Clone)]
pub enum Event {
    /// Successfully connected to the server.
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

    /// Someone left a channel.
    Parted {
        channel: String,
        nick: String,
    },

    /// A message in a channel or a private message.
    Message {
        from: String,
        target: String,
        text: String,
        /// True when the message was a CTCP ACTION (`/me`); `text` is the
        /// action body without the CTCP framing.
        action: bool,
        /// Sent as NOTICE rather than PRIVMSG. Notices must never be
        /// answered automatically.
        notice: bool,
        /// Body bytes as received, set only for plain messages that were
        /// not valid UTF-8. `text` is then a lossy decode.
        raw: Option<Vec<u8>>,
        /// IRCv3 message tags (empty if none).
        tags: std::collections::HashMap<String, String>,
    },

    /// Someone was kicked from a channel.
    Kicked {
        channel: String,
        nick: String,
        by: String,
        reason: String,
    },

    /// A user changed nick.
    NickChanged {
        old_nick: String,
        new_nick: String,
    },

    /// Server sent an error or notice.
    ServerNotice {
        text: String,
    },

    /// Connection was closed.
    Disconnected {
        reason: String,
    },

    /// Raw server line (for debugging).
    RawLine(String),
}
