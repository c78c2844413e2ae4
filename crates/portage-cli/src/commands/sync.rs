//! Sync command implementation.
//!
//! Interactive front end for the sync client state machine: lists the
//! targets the service can see, lets the user pick one by number, and
//! follows the push channel until the outcome lands.

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::tungstenite::Message;

use crate::client::state::{Action, ClientEvent, ClientState, Status};
use crate::client::{decode_records, fetch_targets, spawn_replicate_driver};

use super::SyncArgs;

/// Run the sync command.
pub async fn run(args: SyncArgs) -> Result<()> {
    let mut state = ClientState::new();

    let event = fetch_targets(&args.server).await;
    state.apply(event);
    render(&state);

    let ws_url = format!("ws://{}/ws", args.server);
    let (socket, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .with_context(|| format!("cannot subscribe to {ws_url}"))?;
    let (_write, mut read) = socket.split();

    let submit = spawn_replicate_driver(args.server.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let Ok(index) = line.trim().parse::<usize>() else {
                    println!("pick a target by number");
                    continue;
                };
                if let Some(Action::SubmitTarget(target)) =
                    state.apply(ClientEvent::TargetSelected(index))
                {
                    submit
                        .send(target)
                        .context("coordinator side of the process boundary is gone")?;
                    state.apply(ClientEvent::Submitted);
                }
                render(&state);
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        for event in decode_records(text.as_str()) {
                            state.apply(ClientEvent::Push(event));
                        }
                        render(&state);
                    }
                    Some(Ok(_)) => {} // pings etc.
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "push channel failed");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}

fn render(state: &ClientState) {
    println!();
    if state.targets().is_empty() {
        println!("  no sync targets found (is a medium mounted?)");
    }
    for (i, target) in state.targets().iter().enumerate() {
        let marker = if state.affordances_enabled() { " " } else { "-" };
        println!("  {marker} [{i}] {} ({})", target.name, target.locator.display());
    }
    match state.status() {
        Some(Status::Success) => println!("  sync complete, your map is up to date"),
        Some(Status::Failed(message)) => println!("  error: {message}"),
        Some(Status::Info(message)) => println!("  {message}"),
        None => {}
    }
    if state.affordances_enabled() {
        println!("  enter a target number to sync:");
    }
}
