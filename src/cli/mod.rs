//! CLI command definitions for settings-sync
//!
//! Read-only inspection of a settings database. Editing settings is left to
//! the applications that own them.

use clap::{Args, Parser, Subcommand};

/// Inspect stored plugin settings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List namespaces that hold stored settings
    List,

    /// Print the stored document of a namespace as JSON
    Dump(NamespaceArgs),

    /// Print one stored value by dot path
    Get(GetArgs),
}

/// Identifies a namespace.
#[derive(Args, Debug)]
pub struct NamespaceArgs {
    /// Plugin identifier
    pub plugin_id: String,

    /// Settings schema version
    pub version: String,
}

/// Arguments for `get`.
#[derive(Args, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub namespace: NamespaceArgs,

    /// Dot-delimited path, e.g. `bar.derp`
    pub path: String,
}
