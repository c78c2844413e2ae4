//! Sync client I/O shell.
//!
//! The state machine in [`state`] is headless; this module wires it to the
//! outside world: the one-shot `/sync_targets` fetch, the push-channel
//! subscription, and the process-boundary signal. The client never calls
//! `/replicate` itself — the driver task on the other side of the signal
//! does, mirroring how the view process hands the chosen target to the
//! process that owns the coordinator.

pub mod state;

use anyhow::Result;
use portage_core::discovery::SyncTarget;
use portage_core::hub::BroadcastEvent;
use tokio::sync::mpsc;

use state::ClientEvent;

/// Fetch the target list once, folding any failure into the same
/// error-status path a replication failure takes.
pub async fn fetch_targets(server: &str) -> ClientEvent {
    match try_fetch_targets(server).await {
        Ok(targets) => ClientEvent::TargetsLoaded(targets),
        Err(e) => ClientEvent::TargetsFailed(e.to_string()),
    }
}

async fn try_fetch_targets(server: &str) -> Result<Vec<SyncTarget>> {
    let url = format!("http://{server}/sync_targets");
    let targets = reqwest::get(&url)
        .await?
        .error_for_status()?
        .json::<Vec<SyncTarget>>()
        .await?;
    Ok(targets)
}

/// Decode the event records carried by one push-channel text frame.
///
/// Records are newline-terminated, so a frame coalescing several of them
/// still splits cleanly. Records that do not parse are dropped with a
/// warning rather than killing the subscription.
pub fn decode_records(frame: &str) -> Vec<BroadcastEvent> {
    frame
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(error = %e, "dropping unparsable push record");
                None
            }
        })
        .collect()
}

/// Spawn the coordinator-owning side of the process boundary.
///
/// Targets sent on the returned channel are turned into `POST /replicate`
/// calls. The HTTP response only acknowledges the start; the outcome
/// reaches the view through the push channel like everyone else's.
pub fn spawn_replicate_driver(server: String) -> mpsc::UnboundedSender<SyncTarget> {
    let (tx, mut rx) = mpsc::unbounded_channel::<SyncTarget>();
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        while let Some(target) = rx.recv().await {
            let body = serde_json::json!({ "source": target.locator });
            let response = client
                .post(format!("http://{server}/replicate"))
                .json(&body)
                .send()
                .await;
            match response {
                Ok(r) if r.status().is_success() => {
                    tracing::info!(target = %target.name, "replication started");
                }
                Ok(r) => {
                    let message = r.text().await.unwrap_or_default();
                    tracing::warn!(target = %target.name, "replicate rejected: {message}");
                }
                Err(e) => {
                    tracing::warn!(target = %target.name, error = %e, "replicate request failed");
                }
            }
        }
    });
    tx
}
