//! bender: IRC factoid bot.
//!
//! Connects to every server in the config file and answers:
//!
//!   !! <key> is <fact>  Teach a fact
//!   !? <key>            Recall a fact
//!   !search <regex>     Search stored facts
//!   !<plugin command>   Anything the loaded plugins provide

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use bender_bot::bot;
use bender_bot::config::{self, Config};
use bender_bot::dispatch::Dispatcher;
use bender_bot::factoids::FactoidStore;
use bender_bot::plugins::{PluginCatalog, PluginRegistry};

#[derive(Parser)]
#[command(name = "bender", about = "IRC factoid bot")]
struct Args {
    /// Configuration file
    #[arg(long, short, env = "BENDER_CONFIG", default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;
    init_logging(&config.main);

    let store = FactoidStore::open(&config.factoids.database).context("Failed to open factoid database")?;

    let registry = PluginRegistry::load(&PluginCatalog::builtin(), &config.plugins).context("Failed to load plugins")?;
    tracing::info!(
        commands = registry.command_names().count(),
        matchers = registry.matcher_count(),
        "Plugins loaded"
    );

    let servers = config.servers();
    if servers.is_empty() {
        anyhow::bail!("no servers configured in {}", args.config.display());
    }

    let dispatcher = Arc::new(
        Dispatcher::new(config, Arc::new(store), Arc::new(registry)).with_config_path(args.config.clone()),
    );

    let mut connections = JoinSet::new();
    for server in servers {
        let dispatcher = dispatcher.clone();
        connections.spawn(async move {
            let addr = server.addr.clone();
            (addr, bot::run_server(server, dispatcher).await)
        });
    }

    while let Some(finished) = connections.join_next().await {
        match finished {
            Ok((addr, Err(e))) => tracing::error!(server = %addr, error = %e, "Connection ended"),
            Ok((addr, Ok(()))) => tracing::info!(server = %addr, "Connection closed"),
            Err(e) => tracing::error!(error = %e, "Connection task failed"),
        }
    }
    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured level for the bot's crates.
/// Logs go to `main.log_file` when it can be opened, stderr otherwise.
fn init_logging(main: &config::Main) {
    let level = main.log_level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("bender={level},bender_bot={level},bender_sdk={level}").into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let Some(path) = &main.log_file else {
        builder.init();
        return;
    };
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).init(),
        Err(e) => {
            builder.init();
            tracing::warn!(path = %path.display(), error = %e, "Can't open log file, logging to stderr");
        }
    }
}
