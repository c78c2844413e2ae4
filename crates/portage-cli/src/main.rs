//! Portage CLI - sneakernet replication for offline field mapping
//!
//! Portage coordinates replication of a shared append-only log over
//! physically carried removable media, and pushes lifecycle events to
//! every connected client.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the coordination service
//! portage serve --data-dir ~/.portage
//!
//! # Drive a sync from another terminal
//! portage sync
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;

mod client;
mod commands;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => commands::serve::run(args).await,
        Command::Sync(args) => commands::sync::run(args).await,
        Command::Targets(args) => commands::targets::run(args).await,
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,portage=info,portage_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
