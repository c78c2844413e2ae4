//! Targets command implementation.

use anyhow::{bail, Result};
use portage_core::discovery::SyncTarget;

use super::TargetsArgs;

/// Run the targets command.
pub async fn run(args: TargetsArgs) -> Result<()> {
    let url = format!("http://{}/sync_targets", args.server);
    let targets: Vec<SyncTarget> = match reqwest::get(&url).await {
        Ok(response) => response.error_for_status()?.json().await?,
        Err(e) => bail!("cannot reach {}: {e}", args.server),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
        return Ok(());
    }

    if targets.is_empty() {
        println!("No sync targets found. Mount a medium and try again.");
        return Ok(());
    }
    for target in targets {
        println!("{:<20} {}", target.name, target.locator.display());
    }
    Ok(())
}
