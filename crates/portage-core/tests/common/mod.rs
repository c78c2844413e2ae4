//! Shared fixtures for integration tests.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use portage_core::config::{Config, DiscoveryConfig, ReplicationConfig};
use portage_core::hub::BroadcastEvent;
use portage_core::replicate::{MediumTransfer, ReplicationCoordinator, TransferStats};
use portage_core::web::{self, SharedState};

/// A served router bound to an ephemeral port, with its backing dirs.
pub struct TestServer {
    /// Bound address
    pub addr: SocketAddr,
    /// Shared handler state (for direct hub/coordinator access)
    pub state: SharedState,
    /// Data directory (log + features)
    pub data: tempfile::TempDir,
    /// Media root containing the mounted `usb1` volume
    pub media_root: tempfile::TempDir,
}

impl TestServer {
    /// The mounted medium tests replicate against.
    pub fn medium(&self) -> PathBuf {
        self.media_root.path().join("usb1")
    }

    /// Base HTTP URL.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Push channel URL.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Replication timings tuned for tests.
pub fn quick_replication() -> ReplicationConfig {
    ReplicationConfig {
        settle_delay_secs: 0,
        readiness_poll_ms: 1,
        readiness_timeout_secs: 5,
    }
}

/// Spin up a full server (real segment log, real syncfile transfer).
pub async fn spawn_server() -> TestServer {
    let data = tempfile::tempdir().unwrap();
    let media_root = tempfile::tempdir().unwrap();
    std::fs::create_dir(media_root.path().join("usb1")).unwrap();

    let config = Config {
        replication: quick_replication(),
        discovery: DiscoveryConfig {
            media_roots: vec![media_root.path().to_path_buf()],
        },
        ..Config::default()
    };
    let state = web::build(&config, data.path()).unwrap();
    serve(state, data, media_root).await
}

/// Spin up a server whose transfer is the given test double.
pub async fn spawn_server_with_transfer(transfer: Arc<dyn MediumTransfer>) -> TestServer {
    let data = tempfile::tempdir().unwrap();
    let media_root = tempfile::tempdir().unwrap();
    std::fs::create_dir(media_root.path().join("usb1")).unwrap();

    let log = Arc::new(portage_core::log::SegmentLog::open(data.path().join("log")).unwrap());
    let features = Arc::new(portage_core::geo::LogFeatureStore::open(data.path()).unwrap());
    let hub = Arc::new(portage_core::hub::EventHub::new());
    let coordinator =
        ReplicationCoordinator::new(log, transfer, Arc::clone(&hub), quick_replication());
    let state = web::app_state(
        coordinator,
        hub,
        features,
        DiscoveryConfig {
            media_roots: vec![media_root.path().to_path_buf()],
        },
    );
    serve(state, data, media_root).await
}

async fn serve(
    state: SharedState,
    data: tempfile::TempDir,
    media_root: tempfile::TempDir,
) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let served = Arc::clone(&state);
    tokio::spawn(async move {
        web::serve_on(listener, served).await.unwrap();
    });
    TestServer {
        addr,
        state,
        data,
        media_root,
    }
}

/// Wait until the coordinator settles back to `Idle`.
pub async fn wait_until_idle(server: &TestServer) {
    let mut rx = server.state.coordinator.subscribe();
    while *rx.borrow() != portage_core::replicate::SessionState::Idle {
        rx.changed().await.unwrap();
    }
}

/// Wait until `count` push clients are registered with the hub.
///
/// The ws handshake returns to the client slightly before the server task
/// registers the transport, so tests that broadcast right after
/// connecting poll for the registration.
pub async fn wait_for_clients(server: &TestServer, count: usize) {
    for _ in 0..1000 {
        if server.state.hub.client_count() >= count {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    panic!("push clients never registered");
}

/// Transfer double that blocks until released.
pub struct HeldTransfer {
    release: std::sync::Mutex<Option<std::sync::mpsc::Receiver<()>>>,
}

impl HeldTransfer {
    /// Returns the transfer and the sender that releases it.
    pub fn new() -> (Arc<Self>, std::sync::mpsc::Sender<()>) {
        let (tx, rx) = std::sync::mpsc::channel();
        (
            Arc::new(Self {
                release: std::sync::Mutex::new(Some(rx)),
            }),
            tx,
        )
    }
}

impl MediumTransfer for HeldTransfer {
    fn replicate(&self, _log_dir: &Path, _medium: &Path) -> portage_core::Result<TransferStats> {
        if let Some(rx) = self.release.lock().unwrap().take() {
            let _ = rx.recv();
        }
        Ok(TransferStats::default())
    }
}

/// A connected push client that yields decoded events.
pub struct PushClient {
    stream: futures::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    >,
}

impl PushClient {
    /// Connect to the server's push channel.
    pub async fn connect(server: &TestServer) -> Self {
        let (socket, _) = tokio_tungstenite::connect_async(server.ws_url())
            .await
            .expect("push channel connect");
        let (_write, stream) = socket.split();
        Self { stream }
    }

    /// Next event record, decoded.
    pub async fn next_event(&mut self) -> BroadcastEvent {
        loop {
            let frame = tokio::time::timeout(std::time::Duration::from_secs(10), self.stream.next())
                .await
                .expect("timed out waiting for push event")
                .expect("push channel closed")
                .expect("push channel errored");
            if let Message::Text(text) = frame {
                let line = text.as_str().trim_end();
                if !line.is_empty() {
                    return serde_json::from_str(line).expect("unparsable event record");
                }
            }
        }
    }
}
