//! Replication coordination.
//!
//! This module provides the [`ReplicationCoordinator`], the single-flight
//! orchestrator of a transfer-and-verify pass against the shared
//! append-only log. The session is a process-wide singleton: at most one
//! pass is in flight at any time, guarded by a mutex so the "is anything
//! running" check and the transition to `Running` are one atomic step.
//!
//! A pass has no cancellation: once running, the only ways out are natural
//! completion or a transfer-level I/O failure (e.g. the medium was
//! removed). The outcome is delivered exclusively on the push channel —
//! the HTTP response that started the pass returned long before.

pub mod transfer;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::ReplicationConfig;
use crate::error::{Error, Result};
use crate::hub::{EventHub, Topic};
use crate::log::{AppendLog, Readiness};

pub use transfer::{MediumTransfer, SyncfileTransfer, TransferStats};

/// Phase of the replication session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    /// No pass in flight; a new one may start
    Idle,
    /// Transfer against the medium is running
    Running,
    /// Raw data copy finished; log index may still lag
    DataTransferred,
    /// Waiting for the log to report readiness
    Verifying,
    /// Pass finished successfully (transient, resets to `Idle`)
    Complete,
    /// Pass failed (transient, resets to `Idle`)
    Error,
}

impl SessionState {
    /// Whether `next` is a legal successor of this state.
    ///
    /// Transitions are strictly forward, with a jump to [`Error`]
    /// (`SessionState::Error`) allowed from any non-terminal state, and
    /// both terminal states returning to `Idle`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Idle, Self::Running)
            | (Self::Running, Self::DataTransferred)
            | (Self::DataTransferred, Self::Verifying)
            | (Self::Verifying, Self::Complete)
            | (Self::Complete | Self::Error, Self::Idle) => true,
            (Self::Running | Self::DataTransferred | Self::Verifying, Self::Error) => true,
            _ => false,
        }
    }
}

/// The process-wide replication session.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicationSession {
    /// Current phase
    pub state: SessionState,
    /// Medium the in-flight pass is running against
    pub source: Option<PathBuf>,
    /// When the pass entered `Running`
    pub started_at: Option<DateTime<Utc>>,
    /// Failure reason; present only in the `Error` phase
    pub last_error: Option<String>,
}

impl ReplicationSession {
    fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            source: None,
            started_at: None,
            last_error: None,
        }
    }
}

/// Single-flight orchestrator of replication passes.
pub struct ReplicationCoordinator {
    session: Mutex<ReplicationSession>,
    state_tx: watch::Sender<SessionState>,
    hub: Arc<EventHub>,
    log: Arc<dyn AppendLog>,
    transfer: Arc<dyn MediumTransfer>,
    config: ReplicationConfig,
}

impl std::fmt::Debug for ReplicationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationCoordinator")
            .field("session", &self.session)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReplicationCoordinator {
    /// Create a coordinator in the `Idle` state.
    pub fn new(
        log: Arc<dyn AppendLog>,
        transfer: Arc<dyn MediumTransfer>,
        hub: Arc<EventHub>,
        config: ReplicationConfig,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Arc::new(Self {
            session: Mutex::new(ReplicationSession::idle()),
            state_tx,
            hub,
            log,
            transfer,
            config,
        })
    }

    /// Start a replication pass against the medium at `source`.
    ///
    /// Fails with [`Error::ReplicationInProgress`] unless the session is
    /// `Idle`; the check and the transition to `Running` happen under one
    /// lock acquisition, so two racing callers cannot both be accepted.
    /// Returns as soon as the pass is accepted — the outcome arrives on
    /// the push channel.
    pub fn start(self: &Arc<Self>, source: impl Into<PathBuf>) -> Result<()> {
        let source = source.into();
        {
            let mut session = self.lock_session();
            if session.state != SessionState::Idle {
                return Err(Error::ReplicationInProgress);
            }
            session.state = SessionState::Running;
            session.source = Some(source.clone());
            session.started_at = Some(Utc::now());
            session.last_error = None;
        }
        let _ = self.state_tx.send_replace(SessionState::Running);
        tracing::info!(source = %source.display(), "replication pass started");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = this.run_pass(&source).await {
                this.fail(&err);
            }
            this.reset_to_idle();
        });
        Ok(())
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> ReplicationSession {
        self.lock_session().clone()
    }

    /// Current session phase.
    pub fn state(&self) -> SessionState {
        self.lock_session().state
    }

    /// Subscribe to session phase changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    async fn run_pass(self: &Arc<Self>, source: &PathBuf) -> Result<()> {
        let transfer = Arc::clone(&self.transfer);
        let log_dir = self.log.storage_dir().to_path_buf();
        let medium = source.clone();

        // Medium I/O is long-running and blocking; keep it off the
        // request-handling runtime threads.
        let stats = tokio::task::spawn_blocking(move || transfer.replicate(&log_dir, &medium))
            .await
            .map_err(|e| Error::Internal(format!("transfer task panicked: {e}")))??;

        self.set_state(SessionState::DataTransferred);
        self.hub.broadcast(
            Topic::DataComplete,
            format!(
                "copied {} segments in, {} out",
                stats.segments_in, stats.segments_out
            ),
        );

        self.set_state(SessionState::Verifying);
        self.log.refresh()?;
        self.wait_for_log_ready().await?;

        self.set_state(SessionState::Complete);
        tracing::info!(source = %source.display(), "replication pass complete");
        self.hub.broadcast(Topic::Complete, "replication complete");
        Ok(())
    }

    /// Wait until the log reports readiness.
    ///
    /// A log that cannot report readiness gets the configured settling
    /// delay instead — the original design's fixed-delay heuristic, kept
    /// only as a fallback.
    async fn wait_for_log_ready(&self) -> Result<()> {
        if self.log.readiness()? == Readiness::Unsupported {
            tracing::debug!(
                delay = ?self.config.settle_delay(),
                "log has no readiness probe, applying settling delay"
            );
            tokio::time::sleep(self.config.settle_delay()).await;
            return Ok(());
        }

        let deadline = Instant::now() + self.config.readiness_timeout();
        loop {
            match self.log.readiness()? {
                Readiness::Ready => return Ok(()),
                Readiness::Pending | Readiness::Unsupported => {
                    if Instant::now() >= deadline {
                        return Err(Error::LogNotReady(self.config.readiness_timeout_secs));
                    }
                    tokio::time::sleep(self.config.readiness_poll()).await;
                }
            }
        }
    }

    fn fail(&self, err: &Error) {
        tracing::error!(error = %err, "replication pass failed");
        {
            let mut session = self.lock_session();
            session.state = SessionState::Error;
            session.last_error = Some(err.to_string());
        }
        let _ = self.state_tx.send_replace(SessionState::Error);
        self.hub.broadcast(Topic::Error, err.to_string());
    }

    /// Terminal states always return to `Idle` before any new `Running`
    /// transition is accepted.
    fn reset_to_idle(&self) {
        *self.lock_session() = ReplicationSession::idle();
        let _ = self.state_tx.send_replace(SessionState::Idle);
    }

    fn set_state(&self, next: SessionState) {
        let mut session = self.lock_session();
        debug_assert!(
            session.state.can_transition_to(next),
            "illegal transition {:?} -> {next:?}",
            session.state
        );
        session.state = next;
        drop(session);
        let _ = self.state_tx.send_replace(next);
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, ReplicationSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Log whose readiness is scripted per probe.
    struct ScriptedLog {
        dir: PathBuf,
        script: Vec<Readiness>,
        probes: AtomicU32,
    }

    impl ScriptedLog {
        fn new(script: Vec<Readiness>) -> Self {
            Self {
                dir: std::env::temp_dir(),
                script,
                probes: AtomicU32::new(0),
            }
        }
    }

    impl AppendLog for ScriptedLog {
        fn storage_dir(&self) -> &Path {
            &self.dir
        }

        fn readiness(&self) -> crate::Result<Readiness> {
            let n = self.probes.fetch_add(1, Ordering::SeqCst) as usize;
            Ok(*self.script.get(n).or_else(|| self.script.last()).unwrap())
        }

        fn refresh(&self) -> crate::Result<()> {
            Ok(())
        }
    }

    /// Transfer that blocks until released, or fails immediately.
    struct FakeTransfer {
        release: std::sync::Mutex<Option<std::sync::mpsc::Receiver<()>>>,
        fail: bool,
    }

    impl FakeTransfer {
        fn instant() -> Arc<Self> {
            Arc::new(Self {
                release: std::sync::Mutex::new(None),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                release: std::sync::Mutex::new(None),
                fail: true,
            })
        }

        fn held() -> (Arc<Self>, std::sync::mpsc::Sender<()>) {
            let (tx, rx) = std::sync::mpsc::channel();
            (
                Arc::new(Self {
                    release: std::sync::Mutex::new(Some(rx)),
                    fail: false,
                }),
                tx,
            )
        }
    }

    impl MediumTransfer for FakeTransfer {
        fn replicate(&self, _log_dir: &Path, _medium: &Path) -> crate::Result<TransferStats> {
            if let Some(rx) = self.release.lock().unwrap().take() {
                let _ = rx.recv();
            }
            if self.fail {
                Err(Error::Transfer("medium removed".into()))
            } else {
                Ok(TransferStats::default())
            }
        }
    }

    fn quick_config() -> ReplicationConfig {
        ReplicationConfig {
            settle_delay_secs: 0,
            readiness_poll_ms: 1,
            readiness_timeout_secs: 5,
        }
    }

    fn coordinator(
        transfer: Arc<dyn MediumTransfer>,
        log: ScriptedLog,
    ) -> (Arc<ReplicationCoordinator>, Arc<EventHub>) {
        let hub = Arc::new(EventHub::new());
        let coord = ReplicationCoordinator::new(
            Arc::new(log),
            transfer,
            Arc::clone(&hub),
            quick_config(),
        );
        (coord, hub)
    }

    async fn wait_until_idle(coord: &Arc<ReplicationCoordinator>) {
        let mut rx = coord.subscribe();
        while *rx.borrow() != SessionState::Idle {
            rx.changed().await.unwrap();
        }
    }

    #[test]
    fn test_transition_table() {
        use SessionState::{Complete, DataTransferred, Error, Idle, Running, Verifying};
        let forward = [Idle, Running, DataTransferred, Verifying, Complete, Idle];
        for pair in forward.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{pair:?}");
        }
        for state in [Running, DataTransferred, Verifying] {
            assert!(state.can_transition_to(Error));
        }
        assert!(Error.can_transition_to(Idle));

        // no skipping ahead, no error-from-terminal, no restart without idle
        assert!(!Idle.can_transition_to(DataTransferred));
        assert!(!Idle.can_transition_to(Error));
        assert!(!Running.can_transition_to(Verifying));
        assert!(!Complete.can_transition_to(Error));
        assert!(!Complete.can_transition_to(Running));
        assert!(!Error.can_transition_to(Running));
    }

    #[tokio::test]
    async fn test_successful_pass_returns_to_idle() {
        let (coord, _hub) = coordinator(
            FakeTransfer::instant(),
            ScriptedLog::new(vec![Readiness::Ready]),
        );
        coord.start("/media/usb1").unwrap();
        wait_until_idle(&coord).await;

        let session = coord.session();
        assert_eq!(session.state, SessionState::Idle);
        assert!(session.last_error.is_none());
        assert!(session.source.is_none());
    }

    #[tokio::test]
    async fn test_second_start_conflicts_while_running() {
        let (transfer, release) = FakeTransfer::held();
        let (coord, _hub) = coordinator(transfer, ScriptedLog::new(vec![Readiness::Ready]));

        coord.start("/media/usb1").unwrap();
        let err = coord.start("/media/usb2").unwrap_err();
        assert!(matches!(err, Error::ReplicationInProgress));

        // the rejected call did not disturb the running session
        let session = coord.session();
        assert_eq!(session.state, SessionState::Running);
        assert_eq!(session.source, Some(PathBuf::from("/media/usb1")));

        release.send(()).unwrap();
        wait_until_idle(&coord).await;
        coord.start("/media/usb2").unwrap();
        wait_until_idle(&coord).await;
    }

    #[tokio::test]
    async fn test_failed_transfer_broadcasts_error_and_resets() {
        let (coord, hub) = coordinator(
            FakeTransfer::failing(),
            ScriptedLog::new(vec![Readiness::Ready]),
        );
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        hub.register(tx);

        coord.start("/media/usb1").unwrap();
        wait_until_idle(&coord).await;

        let record = rx.recv().await.unwrap();
        let event: crate::hub::BroadcastEvent =
            serde_json::from_str(record.trim_end()).unwrap();
        assert_eq!(event.topic, Topic::Error);
        assert!(event.message.contains("medium removed"));
        assert_eq!(coord.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_success_broadcasts_data_complete_then_complete() {
        let (coord, hub) = coordinator(
            FakeTransfer::instant(),
            ScriptedLog::new(vec![Readiness::Pending, Readiness::Pending, Readiness::Ready]),
        );
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        hub.register(tx);

        coord.start("/media/usb1").unwrap();
        wait_until_idle(&coord).await;

        let topics: Vec<Topic> = [rx.recv().await.unwrap(), rx.recv().await.unwrap()]
            .iter()
            .map(|r| {
                serde_json::from_str::<crate::hub::BroadcastEvent>(r.trim_end())
                    .unwrap()
                    .topic
            })
            .collect();
        assert_eq!(topics, vec![Topic::DataComplete, Topic::Complete]);
    }

    #[tokio::test]
    async fn test_settle_delay_fallback_for_unsupported_log() {
        let (coord, _hub) = coordinator(
            FakeTransfer::instant(),
            ScriptedLog::new(vec![Readiness::Unsupported]),
        );
        coord.start("/media/usb1").unwrap();
        wait_until_idle(&coord).await;
        assert_eq!(coord.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_readiness_timeout_surfaces_as_error() {
        let hub = Arc::new(EventHub::new());
        let coord = ReplicationCoordinator::new(
            Arc::new(ScriptedLog::new(vec![Readiness::Pending])),
            FakeTransfer::instant(),
            Arc::clone(&hub),
            ReplicationConfig {
                settle_delay_secs: 0,
                readiness_poll_ms: 1,
                readiness_timeout_secs: 0,
            },
        );
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        hub.register(tx);

        coord.start("/media/usb1").unwrap();
        wait_until_idle(&coord).await;

        // first record is data-complete, second is the error
        let _ = rx.recv().await.unwrap();
        let record = rx.recv().await.unwrap();
        let event: crate::hub::BroadcastEvent =
            serde_json::from_str(record.trim_end()).unwrap();
        assert_eq!(event.topic, Topic::Error);
    }

    #[tokio::test]
    async fn test_states_follow_the_forward_sequence() {
        let (transfer, release) = FakeTransfer::held();
        let (coord, _hub) = coordinator(transfer, ScriptedLog::new(vec![Readiness::Ready]));
        let mut rx = coord.subscribe();

        let expected = [
            SessionState::Running,
            SessionState::DataTransferred,
            SessionState::Verifying,
            SessionState::Complete,
            SessionState::Idle,
        ];

        coord.start("/media/usb1").unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        release.send(()).unwrap();

        let mut seen = Vec::new();
        loop {
            rx.changed().await.unwrap();
            let state = *rx.borrow();
            seen.push(state);
            if state == SessionState::Idle {
                break;
            }
        }
        // watch may coalesce, so what we saw must be a subsequence ending
        // in Idle with no out-of-order states
        let mut cursor = 0;
        for state in &seen {
            let pos = expected[cursor..]
                .iter()
                .position(|e| e == state)
                .expect("state out of order");
            cursor += pos + 1;
        }
        assert_eq!(seen.last(), Some(&SessionState::Idle));
    }
}
