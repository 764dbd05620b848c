//! settings-sync inspection tool
//!
//! Reads plugin settings straight from the configured SQLite store.

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use settings_sync::cli::{Cli, Command};
use settings_sync::config::{Config, StoreBackend};
use settings_sync::document::get_path;
use settings_sync::logging::{self, LogTarget};
use settings_sync::store::{SettingsStore, SqliteStore};
use settings_sync::types::Namespace;
use tracing::debug;

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };
    if let Some(database) = &cli.database {
        config.store.path = database.into();
    }
    Ok(config)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let config = load_config(&cli)?;
    if config.store.backend != StoreBackend::Sqlite {
        bail!("only the sqlite backend can be inspected from the command line");
    }
    if !config.store.path.exists() {
        bail!("settings database not found: {}", config.store.path.display());
    }
    debug!(path = %config.store.path.display(), "Opening settings database");
    let store = SqliteStore::open(&config.store.path)
        .with_context(|| format!("opening {}", config.store.path.display()))?;

    match cli.command {
        Command::List => {
            for key in store.list_namespaces().await? {
                println!("{key}");
            }
        }
        Command::Dump(args) => {
            let namespace = Namespace::new(args.plugin_id, args.version);
            let document = store.load_namespace(&namespace.key()).await?;
            print_json(&Value::Object(document))?;
        }
        Command::Get(args) => {
            let namespace = Namespace::new(args.namespace.plugin_id, args.namespace.version);
            let document = store.load_namespace(&namespace.key()).await?;
            match get_path(&document, &args.path) {
                Some(value) => print_json(value)?,
                None => bail!("{} not set in {}", args.path, namespace),
            }
        }
    }

    Ok(())
}
