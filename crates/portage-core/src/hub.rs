//! Event broadcast hub for push clients.
//!
//! The hub owns the set of currently connected push clients and fans
//! lifecycle events out to all of them. Delivery is best-effort and
//! fire-and-forget: a write failure unregisters that client without
//! aborting delivery to the rest, and nothing is buffered for clients
//! that are not connected when an event fires.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Lifecycle event topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// Raw data copy finished; the log index may still be catching up
    DataComplete,
    /// Replication finished and the log is ready
    Complete,
    /// Replication failed; the message carries the reason
    Error,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataComplete => write!(f, "data-complete"),
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single lifecycle event.
///
/// Events are ephemeral: serialized, delivered to whoever is connected,
/// and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEvent {
    /// Event topic
    pub topic: Topic,
    /// Human-readable payload (error reason, completion note)
    pub message: String,
    /// When the event fired
    pub timestamp: DateTime<Utc>,
}

impl BroadcastEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(topic: Topic, message: impl Into<String>) -> Self {
        Self {
            topic,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Serialize to the wire form: one newline-terminated JSON record.
    ///
    /// The trailing newline makes records self-delimiting even if a proxy
    /// coalesces frames.
    #[must_use]
    pub fn to_record(&self) -> String {
        let mut record = serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"));
        record.push('\n');
        record
    }
}

/// Identifier of a connected push client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Sender half of a connected client's transport.
///
/// The receiving half is drained by the connection task that owns the
/// socket; when that task dies the sender starts failing and the hub
/// drops the client on the next broadcast.
pub type ClientSender = mpsc::UnboundedSender<String>;

/// Best-effort fan-out of lifecycle events to connected clients.
///
/// The client set is mutated only by [`register`](Self::register) and
/// [`unregister`](Self::unregister); `broadcast` iterates a snapshot taken
/// at call time, so concurrent connects and disconnects can never corrupt
/// an in-flight delivery. A client that connects during a broadcast may
/// miss that event but receives all subsequent ones.
#[derive(Debug, Default)]
pub struct EventHub {
    clients: Mutex<HashMap<ClientId, ClientSender>>,
}

impl EventHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client transport, returning its fresh identifier.
    pub fn register(&self, sender: ClientSender) -> ClientId {
        let id = ClientId::fresh();
        self.lock().insert(id, sender);
        tracing::debug!(client = %id, "push client connected");
        id
    }

    /// Remove a client. Idempotent; called on end-of-stream or transport
    /// error.
    pub fn unregister(&self, id: ClientId) {
        if self.lock().remove(&id).is_some() {
            tracing::debug!(client = %id, "push client disconnected");
        }
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver an event to every currently registered client.
    ///
    /// Returns the number of clients the record was handed to. A failed
    /// write unregisters that client; there are no retries.
    pub fn broadcast(&self, topic: Topic, message: impl Into<String>) -> usize {
        let event = BroadcastEvent::new(topic, message);
        let record = event.to_record();
        tracing::info!(topic = %event.topic, "broadcasting {}", record.trim_end());

        // Snapshot under the lock, deliver outside it.
        let snapshot: Vec<(ClientId, ClientSender)> = self
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in snapshot {
            if tx.send(record.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::warn!(client = %id, "push transport gone, dropping client");
                self.unregister(id);
            }
        }
        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ClientId, ClientSender>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
