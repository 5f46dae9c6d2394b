//! Builds the command and matcher tables from plugin manifests.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::{CommandFn, EventContext, Export, MatcherFn, Plugin, PluginCatalog, Reply};

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("no plugin available for {0:?}")]
    UnknownPlugin(String),

    #[error("error reading plugin configuration {}: {source}", path.display())]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error parsing plugin configuration {}: {source}", path.display())]
    ParseConfig {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("{}: entry {key:?} must be the name of an exported symbol", path.display())]
    InvalidEntry { path: PathBuf, key: String },

    #[error("{}: [config] must be a table", path.display())]
    InvalidConfigSection { path: PathBuf },

    #[error("symbol {symbol:?} not found in plugin {plugin:?}")]
    UnknownSymbol { plugin: String, symbol: String },

    #[error("symbol {symbol:?} in plugin {plugin:?} is not a {expected} function")]
    SignatureMismatch {
        plugin: String,
        symbol: String,
        expected: &'static str,
    },

    #[error("command name clash: {command:?} is defined by both {first:?} and {second:?}")]
    DuplicateCommand {
        command: String,
        first: String,
        second: String,
    },

    #[error("configuration provided for plugin {plugin:?}, but it has no configuration entry point")]
    MissingConfigure { plugin: String },

    #[error("error configuring plugin {plugin:?}: {source}")]
    Configure {
        plugin: String,
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("command {0:?} not found in loaded plugins")]
    CommandNotFound(String),
}

struct RegisteredCommand {
    plugin: String,
    handler: CommandFn,
}

/// Command name -> handler, plugin -> matchers.
///
/// Fully built before any message is dispatched and never mutated after;
/// share it behind an `Arc`.
#[derive(Default)]
pub struct PluginRegistry {
    commands: HashMap<String, RegisteredCommand>,
    matchers: BTreeMap<String, Vec<MatcherFn>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every plugin in `plugins` (locator -> manifest path). The first
    /// failure aborts the whole load.
    pub fn load(catalog: &PluginCatalog, plugins: &BTreeMap<String, PathBuf>) -> Result<Self, PluginError> {
        let mut registry = Self::new();
        for (locator, manifest_path) in plugins {
            let plugin = catalog
                .instantiate(locator)
                .ok_or_else(|| PluginError::UnknownPlugin(locator.clone()))?;
            let manifest = read_manifest(manifest_path)?;
            registry.register(locator, plugin.as_ref(), &manifest, manifest_path)?;
            tracing::info!(plugin = %locator, manifest = %manifest_path.display(), "Loaded plugin");
        }
        Ok(registry)
    }

    /// Register one plugin's commands and matchers according to its manifest.
    pub fn register(
        &mut self,
        name: &str,
        plugin: &dyn Plugin,
        manifest: &toml::Table,
        manifest_path: &Path,
    ) -> Result<(), PluginError> {
        for (key, value) in manifest {
            if key == "config" {
                let table = value.as_table().ok_or_else(|| PluginError::InvalidConfigSection {
                    path: manifest_path.to_path_buf(),
                })?;
                if !plugin.configurable() {
                    return Err(PluginError::MissingConfigure {
                        plugin: name.to_string(),
                    });
                }
                plugin.configure(table).map_err(|e| PluginError::Configure {
                    plugin: name.to_string(),
                    source: e.into(),
                })?;
                continue;
            }

            let symbol = value.as_str().ok_or_else(|| PluginError::InvalidEntry {
                path: manifest_path.to_path_buf(),
                key: key.clone(),
            })?;
            let handler = match plugin.lookup(symbol) {
                Some(Export::Command(handler)) => handler,
                Some(Export::Matcher(_)) => {
                    return Err(PluginError::SignatureMismatch {
                        plugin: name.to_string(),
                        symbol: symbol.to_string(),
                        expected: "command",
                    });
                }
                None => {
                    return Err(PluginError::UnknownSymbol {
                        plugin: name.to_string(),
                        symbol: symbol.to_string(),
                    });
                }
            };
            if let Some(existing) = self.commands.get(key) {
                return Err(PluginError::DuplicateCommand {
                    command: key.clone(),
                    first: existing.plugin.clone(),
                    second: name.to_string(),
                });
            }
            tracing::debug!(plugin = %name, command = %key, symbol, "Registered command");
            self.commands.insert(
                key.clone(),
                RegisteredCommand {
                    plugin: name.to_string(),
                    handler,
                },
            );
        }

        let Some(symbols) = plugin.matchers() else {
            tracing::warn!(plugin = %name, "Plugin doesn't export matcher functions");
            return Ok(());
        };
        let mut matchers = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match plugin.lookup(&symbol) {
                Some(Export::Matcher(matcher)) => matchers.push(matcher),
                Some(Export::Command(_)) => {
                    return Err(PluginError::SignatureMismatch {
                        plugin: name.to_string(),
                        symbol,
                        expected: "matcher",
                    });
                }
                None => {
                    return Err(PluginError::UnknownSymbol {
                        plugin: name.to_string(),
                        symbol,
                    });
                }
            }
        }
        if !matchers.is_empty() {
            self.matchers.entry(name.to_string()).or_default().extend(matchers);
        }
        Ok(())
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn matcher_count(&self) -> usize {
        self.matchers.values().map(Vec::len).sum()
    }

    /// Run the command registered as `name`.
    pub fn execute(&self, name: &str, args: &[String], ctx: &EventContext) -> Result<Reply, PluginError> {
        let command = self
            .commands
            .get(name)
            .ok_or_else(|| PluginError::CommandNotFound(name.to_string()))?;
        Ok((command.handler)(args, ctx))
    }

    /// Run every matcher against `message`, keeping the non-empty replies.
    pub fn run_matchers(&self, message: &str, ctx: &EventContext) -> Vec<Reply> {
        self.matchers
            .values()
            .flatten()
            .map(|matcher| matcher(message, ctx))
            .filter(|reply| !reply.is_empty())
            .collect()
    }
}

fn read_manifest(path: &Path) -> Result<toml::Table, PluginError> {
    let content = std::fs::read_to_string(path).map_err(|source| PluginError::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| PluginError::ParseConfig {
        path: path.to_path_buf(),
        source,
    })
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut commands: Vec<_> = self.commands.keys().collect();
        commands.sort();
        f.debug_struct("PluginRegistry")
            .field("commands", &commands)
            .field("matchers", &self.matchers.keys().collect::<Vec<_>>())
            .finish()
    }
}
