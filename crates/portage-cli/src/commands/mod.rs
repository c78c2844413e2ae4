//! CLI command definitions and handlers.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod serve;
pub mod sync;
pub mod targets;

/// Portage - sneakernet replication for offline field mapping
#[derive(Parser)]
#[command(name = "portage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Run the replication coordination service
    Serve(ServeArgs),

    /// Pick a sync target and follow the replication outcome
    Sync(SyncArgs),

    /// List sync targets the service can see
    Targets(TargetsArgs),
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Directory holding the log and feature data
    #[arg(long, default_value = ".")]
    pub data_dir: PathBuf,

    /// Configuration file (TOML); defaults apply when absent
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Accept connections from other machines, not just localhost
    #[arg(long)]
    pub public: bool,
}

/// Arguments for the sync command
#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// Address of the coordination service
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub server: String,
}

/// Arguments for the targets command
#[derive(Parser, Debug)]
pub struct TargetsArgs {
    /// Address of the coordination service
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub server: String,

    /// Print as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}
