//! Sync target discovery.
//!
//! Sneakernet targets are mounted removable volumes, not network peers:
//! discovery scans the configured media roots for directories and offers
//! each as a target. Targets are fetched on demand and never persisted.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::DiscoveryConfig;
use crate::error::Result;

/// A discoverable replication destination/source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
    /// Display name (the volume's directory name)
    pub name: String,
    /// Path handed to `/replicate` as the source
    pub locator: PathBuf,
}

/// Scan the configured media roots for mounted volumes.
///
/// Roots that do not exist (no media mounted, different platform) are
/// skipped silently; a root that exists but cannot be read is an error.
pub fn discover_targets(config: &DiscoveryConfig) -> Result<Vec<SyncTarget>> {
    let mut targets = Vec::new();
    for root in &config.media_roots {
        if !root.is_dir() {
            continue;
        }
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            targets.push(SyncTarget {
                name,
                locator: entry.path(),
            });
        }
    }
    targets.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!(count = targets.len(), "discovered sync targets");
    Ok(targets)
}
