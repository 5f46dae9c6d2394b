//! bender-sdk: the IRC transport used by the bender bot.
//!
//! - [`irc`]: line codec (tags, prefix, params, CTCP ACTION)
//! - [`event`]: events delivered to the consumer
//! - [`client`]: connection, registration, keepalive and reconnect loop

pub mod client;
pub mod event;
pub mod irc;
