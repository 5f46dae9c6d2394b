//! Plugin system.
//!
//! A plugin exposes named symbols ([`Export`]s): commands, invoked as
//! `!<command> args...`, and matchers, invoked for every message that is
//! not a command. Which symbols become which commands is decided by a
//! per-plugin manifest:
//!
//! ```toml
//! # conf/plugins/example.toml
//! example = "Example"      # command name = exported symbol
//!
//! [config]                 # passed to the plugin's configure()
//! channels = ["#bender"]
//! ```
//!
//! Implementations are resolved through a [`PluginCatalog`] built at
//! compile time; the manifest only chooses among them. Signatures are
//! checked when the registry is built, never at call time.

pub mod chanlog;
pub mod example;
mod registry;
pub mod urls;
pub mod urlshort;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub use registry::{PluginError, PluginRegistry};

/// A handler's answer. Empty text means "nothing to say".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pub text: String,
    /// Send as a CTCP ACTION rather than a plain message.
    pub action: bool,
}

impl Reply {
    pub fn say(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: false,
        }
    }

    pub fn act(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// The chat message a handler is running for.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    /// Nick of the sender.
    pub nick: String,
    /// Where replies go: the channel, or the sender for private messages.
    pub channel: String,
    pub message: String,
    /// The message was a `/me` action.
    pub action: bool,
    /// The bytes as received when they weren't valid UTF-8; `message` is
    /// then a lossy decode.
    pub raw: Option<Vec<u8>>,
}

pub type CommandFn = Arc<dyn Fn(&[String], &EventContext) -> Reply + Send + Sync>;
pub type MatcherFn = Arc<dyn Fn(&str, &EventContext) -> Reply + Send + Sync>;

/// A symbol exported by a plugin.
#[derive(Clone)]
pub enum Export {
    Command(CommandFn),
    Matcher(MatcherFn),
}

impl Export {
    pub fn command<F>(f: F) -> Self
    where
        F: Fn(&[String], &EventContext) -> Reply + Send + Sync + 'static,
    {
        Export::Command(Arc::new(f))
    }

    pub fn matcher<F>(f: F) -> Self
    where
        F: Fn(&str, &EventContext) -> Reply + Send + Sync + 'static,
    {
        Export::Matcher(Arc::new(f))
    }
}

/// A loadable plugin.
pub trait Plugin: Send + Sync {
    /// Resolve an exported symbol by name.
    fn lookup(&self, symbol: &str) -> Option<Export>;

    /// Names of the matcher symbols this plugin exports, or `None` if it
    /// exports no matcher list at all.
    fn matchers(&self) -> Option<Vec<String>> {
        None
    }

    /// Whether the plugin has a configuration entry point. A `[config]`
    /// table in the manifest of a plugin without one is a load error.
    fn configurable(&self) -> bool {
        false
    }

    /// Apply the manifest's `[config]` table.
    fn configure(&self, _config: &toml::Table) -> anyhow::Result<()> {
        Ok(())
    }
}

pub type PluginFactory = fn() -> Arc<dyn Plugin>;

/// Compile-time table of available plugin implementations.
#[derive(Default)]
pub struct PluginCatalog {
    entries: BTreeMap<String, PluginFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The plugins bundled with the bot.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register("example", || Arc::new(example::ExamplePlugin));
        catalog.register("chanlog", || Arc::new(chanlog::ChanlogPlugin::default()));
        catalog.register("urlshort", || Arc::new(urlshort::UrlShortPlugin::default()));
        catalog
    }

    pub fn register(&mut self, name: &str, factory: PluginFactory) {
        self.entries.insert(name.to_string(), factory);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Create a plugin instance for `locator`: either a registered name, or
    /// a path whose file stem is one (`plugins/example.so` -> `example`).
    pub fn instantiate(&self, locator: &str) -> Option<Arc<dyn Plugin>> {
        let factory = self.entries.get(locator).or_else(|| {
            Path::new(locator)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| self.entries.get(stem))
        })?;
        Some(factory())
    }
}
