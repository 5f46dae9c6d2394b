//! bender: an IRC factoid bot.
//!
//! Users teach the bot facts (`!! rust is a language`) and ask for them
//! back (`!? rust`). Everything beyond that comes from plugins: commands
//! addressed by name, and matchers that see every other message.

pub mod bot;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod factoids;
pub mod output;
pub mod plugins;
