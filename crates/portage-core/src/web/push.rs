//! Push channel: persistent WebSocket delivering lifecycle events.
//!
//! Each server-to-client text frame carries exactly one newline-terminated
//! JSON event record. The connection is one-way; inbound frames are
//! drained and ignored so pings and client chatter cannot stall the
//! socket. Disconnection (clean or not) unregisters the client from the
//! hub.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use tokio::sync::mpsc;

use super::state::SharedState;

/// GET /ws - upgrade to the push channel.
pub async fn push_channel(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: SharedState) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let id = state.hub.register(tx);

    loop {
        tokio::select! {
            record = rx.recv() => {
                // hub dropped us (send failure on an earlier broadcast)
                let Some(record) = record else { break };
                if socket.send(Message::text(record)).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(_)) => {} // drained, the channel is one-way
                    Some(Err(_)) | None => break,
                }
            }
        }
    }

    state.hub.unregister(id);
}
