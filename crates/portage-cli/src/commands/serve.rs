//! Serve command implementation.

use anyhow::Result;
use portage_core::config::Config;

use super::ServeArgs;

/// Run the serve command.
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.public {
        config.server.localhost_only = false;
    }

    println!();
    println!("Portage replication service");
    println!("{}", "─".repeat(40));
    println!();
    println!("  data:   {}", args.data_dir.display());
    println!("  listen: http://{}", config.server.bind_addr());
    println!();
    println!("Press Ctrl+C to stop the server.");

    let state = portage_core::web::build(&config, &args.data_dir)?;
    portage_core::web::serve(&config.server, state).await?;

    Ok(())
}
