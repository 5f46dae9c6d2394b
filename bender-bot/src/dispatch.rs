//! Turns an incoming chat message into zero or more replies.
//!
//! Messages starting with the command character are commands: either one
//! of the built-ins below or a plugin command. Everything else is offered
//! to the plugin matchers.
//!
//! | command                   | effect                                   |
//! |---------------------------|------------------------------------------|
//! | `!! <key> is <fact>`      | store a fact (`er` works too)            |
//! | `!? <key>`                | look up a random fact for the key        |
//! | `!random`                 | look up a random key                     |
//! | `!forget <key> is <pfx>`  | delete the one fact starting with `pfx`  |
//! | `!finfo`                  | who stored the last fact, and when       |
//! | `!list <prefix>`          | keys starting with a prefix              |
//! | `!search <regex>`         | facts matching a pattern                 |
//! | `!newreply <template>`    | add a reply template                     |
//! | `!coffee`, `!buy`         | hospitality                              |

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use regex::Regex;

use crate::command::{self, ParseError, split_by_space};
use crate::config::Config;
use crate::factoids::{Factoid, FactoidError, FactoidStore, NewFactoid};
use crate::plugins::{EventContext, PluginError, PluginRegistry, Reply};

const BUILTIN_COMMANDS: &[&str] = &[
    "!", "?", "random", "forget", "finfo", "list", "search", "newreply", "coffee", "buy",
];

const FALLBACK_TEMPLATE: &str = "%s is %s";

/// Separators between keyword and fact, with the language they imply.
const SPLIT_WORDS: &[(&str, &str)] = &[("is", "en"), ("er", "da")];

pub struct Dispatcher {
    command_char: String,
    search_limit: usize,
    store: Arc<FactoidStore>,
    registry: Arc<PluginRegistry>,
    /// Source of the reply templates; rewritten to `config_path` by `newreply`.
    config: Mutex<Config>,
    config_path: Option<PathBuf>,
    /// Last fact looked up or stored, for `finfo`.
    last_fact: Mutex<Option<(String, Factoid)>>,
}

/// `<key> <split word> <fact>`, as typed after `!!` or `!forget`.
#[derive(Debug, PartialEq, Eq)]
struct FactInput<'a> {
    key: &'a str,
    split_word: &'static str,
    language: &'static str,
    fact: &'a str,
}

/// Split on the first split word present. Once one matches, both sides
/// must be non-empty; the next split word is not tried.
fn split_fact(text: &str) -> Option<FactInput<'_>> {
    let (key, fact, split_word, language) = SPLIT_WORDS.iter().find_map(|&(split_word, language)| {
        let (key, fact) = text.split_once(&format!(" {split_word} "))?;
        Some((key.trim(), fact.trim(), split_word, language))
    })?;
    if key.is_empty() || fact.is_empty() {
        return None;
    }
    Some(FactInput {
        key,
        split_word,
        language,
        fact,
    })
}

/// The fact part of an undecoded message, split the same way as the text.
/// Lossy decoding keeps every ASCII byte in place, so the first ASCII split
/// word in `raw` is the one found in the decoded text.
fn raw_fact<'a>(raw: &'a [u8], split_word: &str) -> Option<&'a [u8]> {
    let needle = format!(" {split_word} ");
    let start = raw.windows(needle.len()).position(|w| w == needle.as_bytes())?;
    Some(raw[start + needle.len()..].trim_ascii())
}

/// Fill the two `%s` slots of `template`. Surplus slots stay as they are.
fn fill_template(template: &str, keyword: &str, fact: &str) -> String {
    let mut values = [keyword, fact].into_iter();
    let mut parts = template.split("%s");
    let mut out = parts.next().unwrap_or_default().to_string();
    for part in parts {
        out.push_str(values.next().unwrap_or("%s"));
        out.push_str(part);
    }
    out
}

impl Dispatcher {
    pub fn new(config: Config, store: Arc<FactoidStore>, registry: Arc<PluginRegistry>) -> Self {
        for name in registry.command_names() {
            if BUILTIN_COMMANDS.contains(&name) {
                tracing::warn!(command = name, "Plugin command is shadowed by a built-in command");
            }
        }
        Self {
            command_char: config.main.command_char.clone(),
            search_limit: config.factoids.search_limit,
            store,
            registry,
            config: Mutex::new(config),
            config_path: None,
            last_fact: Mutex::new(None),
        }
    }

    /// Persist configuration changes (new reply templates) to `path`.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn store(&self) -> &FactoidStore {
        &self.store
    }

    /// Handle a plain (non-action) message.
    pub fn handle(&self, nick: &str, channel: &str, message: &str) -> Vec<Reply> {
        self.handle_event(&EventContext {
            nick: nick.to_string(),
            channel: channel.to_string(),
            message: message.to_string(),
            action: false,
            raw: None,
        })
    }

    /// Handle a message. Actions are never commands, only matcher input.
    pub fn handle_event(&self, ctx: &EventContext) -> Vec<Reply> {
        if ctx.action {
            return self.registry.run_matchers(&ctx.message, ctx);
        }
        let cmd = match command::parse(&self.command_char, &ctx.message) {
            Ok(cmd) => cmd,
            Err(ParseError::NotACommand) => return self.registry.run_matchers(&ctx.message, ctx),
        };

        let replies = match cmd.command.as_str() {
            "!" => vec![self.store_fact(ctx, &cmd.argument)],
            "?" => vec![self.lookup(&ctx.nick, cmd.argument.trim())],
            "random" => vec![self.random(&ctx.nick)],
            "forget" => vec![self.forget(&cmd.argument)],
            "finfo" => vec![self.finfo()],
            "list" => vec![self.list(cmd.argument.trim())],
            "search" => self.search(cmd.argument.trim()),
            "newreply" => vec![self.new_reply(cmd.argument.trim())],
            "coffee" => vec![Reply::act(format!(
                "pours {} a cup of hot coffee, straight from the pot",
                ctx.nick
            ))],
            "buy" => vec![buy(&ctx.nick, &cmd.argument)],
            name => match self.registry.execute(name, &cmd.args(), ctx) {
                Ok(reply) => vec![reply],
                Err(PluginError::CommandNotFound(_)) => {
                    tracing::debug!(command = name, nick = %ctx.nick, "Unknown command");
                    Vec::new()
                }
                Err(e) => {
                    tracing::warn!(command = name, error = %e, "Plugin command failed");
                    Vec::new()
                }
            },
        };
        replies.into_iter().filter(|r| !r.is_empty()).collect()
    }

    fn store_fact(&self, ctx: &EventContext, argument: &str) -> Reply {
        let nick = ctx.nick.as_str();
        let Some(input) = split_fact(argument) else {
            return Reply::say("You gotta format it right, moron.");
        };
        let value = match ctx.raw.as_deref().and_then(|raw| raw_fact(raw, input.split_word)) {
            Some(bytes) => bytes.to_vec(),
            None => input.fact.as_bytes().to_vec(),
        };
        let new = NewFactoid::new(value)
            .origin(nick)
            .split_word(input.split_word, input.language);
        let stored = format!("OK, \"{}\" {} \"{}\"", input.key, input.split_word, input.fact);

        match self.store.set(input.key, new) {
            Ok(fact) => {
                tracing::info!(keyword = input.key, nick, "Stored fact");
                self.remember(input.key, fact);
                Reply::say(stored)
            }
            Err(FactoidError::AlreadyExists) => Reply::say("I know that already"),
            Err(FactoidError::InvalidEncoding) => {
                tracing::debug!(keyword = input.key, nick, "Rejected fact that isn't UTF-8");
                Reply::say("Your factoid is not valid UTF8")
            }
            Err(FactoidError::Sync { path, source, fact }) => {
                tracing::error!(
                    keyword = input.key,
                    path = %path.display(),
                    error = %source,
                    "Fact stored in memory but not on disk"
                );
                if let Some(fact) = fact {
                    self.remember(input.key, *fact);
                }
                Reply::say(stored)
            }
            Err(e) => {
                tracing::error!(keyword = input.key, error = %e, "Failed to store fact");
                Reply::say(e.to_string())
            }
        }
    }

    fn lookup(&self, nick: &str, keyword: &str) -> Reply {
        match self.store.get(keyword) {
            Ok(fact) => {
                let reply = self.render(nick, keyword, &fact);
                self.remember(keyword, fact);
                reply
            }
            Err(FactoidError::NotFound) => {
                tracing::debug!(keyword, "No facts for keyword");
                Reply::say(format!("Nobody cares about {keyword}!"))
            }
            Err(e) => {
                tracing::error!(keyword, error = %e, "Lookup failed");
                Reply::say(e.to_string())
            }
        }
    }

    fn render(&self, nick: &str, keyword: &str, fact: &Factoid) -> Reply {
        let text = fact.value.replace("$nick", nick);
        if let Some(rest) = text.strip_prefix("<reply>") {
            return Reply::say(rest.trim());
        }
        if let Some(rest) = text.strip_prefix("<me>").or_else(|| text.strip_prefix("<action>")) {
            return Reply::act(rest.trim());
        }
        let template = {
            let config = self.config.lock();
            config
                .factoids
                .reply_templates
                .choose(&mut rand::thread_rng())
                .cloned()
                .unwrap_or_else(|| FALLBACK_TEMPLATE.to_string())
        };
        Reply::say(fill_template(&template, keyword, &text))
    }

    fn remember(&self, keyword: &str, fact: Factoid) {
        *self.last_fact.lock() = Some((keyword.to_string(), fact));
    }

    fn random(&self, nick: &str) -> Reply {
        match self.store.random_keyword() {
            Ok(keyword) => self.lookup(nick, &keyword),
            Err(_) => Reply::say("I don't know anything yet"),
        }
    }

    fn forget(&self, argument: &str) -> Reply {
        let Some(input) = split_fact(argument) else {
            return Reply::say("You gotta format it right, moron.");
        };
        let forgot = |value: &str| {
            Reply::say(format!(
                "OK, I forgot \"{}\" {} \"{value}\"",
                input.key, input.split_word
            ))
        };
        match self.store.delete(input.key, input.fact) {
            Ok(removed) => {
                tracing::info!(keyword = input.key, fact = %removed.value, "Forgot fact");
                forgot(&removed.value)
            }
            Err(FactoidError::NotFound) => Reply::say(format!(
                "I don't know anything about {} starting with \"{}\"",
                input.key, input.fact
            )),
            Err(FactoidError::Ambiguous) => Reply::say(format!(
                "That matches more than one fact about {}, be more specific",
                input.key
            )),
            Err(FactoidError::Sync { path, source, fact }) => {
                tracing::error!(
                    keyword = input.key,
                    path = %path.display(),
                    error = %source,
                    "Fact removed from memory but not from disk"
                );
                match fact {
                    Some(removed) => forgot(&removed.value),
                    None => forgot(input.fact),
                }
            }
            Err(e) => Reply::say(e.to_string()),
        }
    }

    fn finfo(&self) -> Reply {
        let last = self.last_fact.lock();
        let Some((keyword, fact)) = last.as_ref() else {
            return Reply::say("I haven't looked up any facts yet");
        };
        let subject = format!("\"{keyword} => {}\"", fact.value);
        if fact.origin.is_none() && fact.created.is_none() {
            return Reply::say(format!("I don't have any information on {subject}"));
        }
        let mut text = format!("{subject} was created");
        if let Some(origin) = &fact.origin {
            text.push_str(&format!(" by {origin}"));
        }
        if let Some(created) = &fact.created {
            text.push_str(&format!(" on {}", created.format("%d %b %y %H:%M %Z")));
        }
        Reply::say(text)
    }

    fn list(&self, prefix: &str) -> Reply {
        if prefix.is_empty() {
            return Reply::say("You gotta tell me what to look for, bub");
        }
        match self.store.list_keys(prefix) {
            Ok(keys) if keys.is_empty() => Reply::say("No results found"),
            Ok(keys) => Reply::say(format!("I have these facts matching {prefix}: {}", keys.join(", "))),
            Err(e) => Reply::say(e.to_string()),
        }
    }

    fn search(&self, pattern: &str) -> Vec<Reply> {
        if pattern.is_empty() {
            return vec![Reply::say("You gotta tell me what to look for, bub")];
        }
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => return vec![Reply::say(e.to_string())],
        };
        let results = self.store.search(&re, self.search_limit);
        if results.matches.is_empty() {
            return vec![Reply::say("No results found")];
        }

        let mut replies = vec![Reply::say("Check out what I found from your search:")];
        replies.extend(
            results
                .matches
                .iter()
                .map(|(keyword, fact)| Reply::say(format!("\"{keyword}\" => \"{}\"", fact.value))),
        );
        if results.additional > 0 {
            replies.push(Reply::say(format!(
                "... and {} more results not displayed",
                results.additional
            )));
        }
        replies
    }

    fn new_reply(&self, template: &str) -> Reply {
        if template.matches("%s").count() != 2 {
            return Reply::say("You need exactly two '%s' captures in your reply");
        }
        let mut config = self.config.lock();
        config.factoids.reply_templates.push(template.to_string());
        if let Some(path) = &self.config_path
            && let Err(e) = config.save(path)
        {
            tracing::error!(error = %e, "Failed to save reply template");
        }
        tracing::info!(template, "Added reply template");
        Reply::say(format!("OK, I'll use \"{template}\" in replies"))
    }
}

fn buy(nick: &str, argument: &str) -> Reply {
    let (target, item) = split_by_space(argument.trim());
    if target.is_empty() || item.trim().is_empty() {
        return Reply::say("Usage: !buy <nick> <item>");
    }
    Reply::act(format!("gives {target} a {}, \"Compliments of {nick}!\"", item.trim()))
}
