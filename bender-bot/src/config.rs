//! Bot configuration.
//!
//! One TOML file (default `conf/bender.toml`) holds the global settings,
//! the bot's identity, the servers to connect to, the factoid database
//! settings and the plugin manifest list.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "conf/bender.toml";
pub const DEFAULT_NICK: &str = "bender";
pub const DEFAULT_NAME: &str = "Bender Bending Rodriguez";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("error reading config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error parsing config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("error encoding config: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("error writing config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub main: Main,
    #[serde(default)]
    pub identity: Identity,
    #[serde(default)]
    pub factoids: FactoidSettings,
    /// Keyed by host name.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerOptions>,
    /// Plugin locator -> manifest path.
    #[serde(default)]
    pub plugins: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Main {
    #[serde(default = "default_command_char")]
    pub command_char: String,
    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for Main {
    fn default() -> Self {
        Self {
            command_char: default_command_char(),
            log_level: None,
            log_file: None,
        }
    }
}

/// Nick and real name. Unset fields fall back to the global identity, and
/// then to the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerOptions {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub tls_insecure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    /// Nicks whose messages are never handled.
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub identity: Identity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactoidSettings {
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Each template has two `%s` slots: keyword, then fact.
    #[serde(default = "default_reply_templates")]
    pub reply_templates: Vec<String>,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for FactoidSettings {
    fn default() -> Self {
        Self {
            database: default_database(),
            reply_templates: default_reply_templates(),
            search_limit: default_search_limit(),
        }
    }
}

fn default_command_char() -> String {
    "!".to_string()
}

fn default_port() -> u16 {
    6667
}

fn default_database() -> PathBuf {
    PathBuf::from("db/factoids.json")
}

fn default_reply_templates() -> Vec<String> {
    vec!["%s is %s".to_string(), "I heard %s is %s".to_string()]
}

fn default_search_limit() -> usize {
    5
}

/// Everything needed to run one server connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    /// `host:port`
    pub addr: String,
    pub nick: String,
    pub realname: String,
    pub tls: bool,
    pub tls_insecure: bool,
    pub password: Option<String>,
    pub channels: Vec<String>,
    pub ignore: Vec<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.main.command_char.is_empty() {
            return Err(ConfigError::Invalid("main.command_char must not be empty".to_string()));
        }
        for (host, server) in &self.servers {
            if server.port == 0 {
                return Err(ConfigError::Invalid(format!("servers.{host}: port must not be 0")));
            }
        }
        Ok(())
    }

    /// Write the configuration back to `path`.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Per-server settings with identity inheritance applied.
    pub fn servers(&self) -> Vec<ServerSettings> {
        self.servers
            .iter()
            .map(|(host, opts)| {
                let nick = non_empty(&opts.identity.nick)
                    .or_else(|| non_empty(&self.identity.nick))
                    .unwrap_or(DEFAULT_NICK);
                let realname = non_empty(&opts.identity.name)
                    .or_else(|| non_empty(&self.identity.name))
                    .unwrap_or(DEFAULT_NAME);
                ServerSettings {
                    host: host.clone(),
                    addr: format!("{host}:{}", opts.port),
                    nick: nick.to_string(),
                    realname: realname.to_string(),
                    tls: opts.tls,
                    tls_insecure: opts.tls_insecure,
                    password: opts.password.clone(),
                    channels: opts.channels.clone(),
                    ignore: opts.ignore.clone(),
                }
            })
            .collect()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
