//! Sync client state machine.
//!
//! The client view has three phases. Targets are selectable only in
//! `Idle`; picking one disables every selection affordance, hands the
//! target across the process boundary, and waits for a terminal push
//! event. A successful `/replicate` response on the owning side is
//! provisional — only a `complete` or `error` broadcast resolves the
//! attempt, so nothing here re-enables affordances until one arrives.

use portage_core::discovery::SyncTarget;
use portage_core::hub::{BroadcastEvent, Topic};

/// Phase of the client view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Targets enabled, nothing chosen
    #[default]
    Idle,
    /// A target was chosen; selection affordances disabled
    Selecting,
    /// Target submitted; waiting for a terminal broadcast
    AwaitingOutcome,
}

/// Status surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Replication finished successfully
    Success,
    /// Replication (or target loading) failed with this message
    Failed(String),
    /// Informational progress note
    Info(String),
}

/// Inputs that drive the state machine.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// `/sync_targets` answered
    TargetsLoaded(Vec<SyncTarget>),
    /// `/sync_targets` failed or returned garbage
    TargetsFailed(String),
    /// User picked the target at this index
    TargetSelected(usize),
    /// The target crossed the process boundary
    Submitted,
    /// A record arrived on the push channel
    Push(BroadcastEvent),
}

/// Side effect the I/O shell must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send this target across the process boundary; the owning side is
    /// the one that calls `/replicate`
    SubmitTarget(SyncTarget),
}

/// The client view state.
#[derive(Debug, Default)]
pub struct ClientState {
    phase: Phase,
    targets: Vec<SyncTarget>,
    status: Option<Status>,
}

impl ClientState {
    /// Fresh view in the `Idle` phase with no targets yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether target selection is currently allowed.
    #[must_use]
    pub fn affordances_enabled(&self) -> bool {
        self.phase() == Phase::Idle
    }

    /// Known targets.
    #[must_use]
    pub fn targets(&self) -> &[SyncTarget] {
        &self.targets
    }

    /// Status to surface, if any.
    #[must_use]
    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    /// Apply an event, returning the side effect the shell must run.
    pub fn apply(&mut self, event: ClientEvent) -> Option<Action> {
        match event {
            ClientEvent::TargetsLoaded(targets) => {
                self.targets = targets;
                None
            }
            // a malformed target response takes the same error path as a
            // replication failure
            ClientEvent::TargetsFailed(message) => {
                self.status = Some(Status::Failed(message));
                None
            }
            ClientEvent::TargetSelected(index) => {
                if !self.affordances_enabled() {
                    return None;
                }
                let target = self.targets.get(index)?.clone();
                self.phase = Phase::Selecting;
                self.status = Some(Status::Info(format!("syncing to {}", target.name)));
                Some(Action::SubmitTarget(target))
            }
            ClientEvent::Submitted => {
                if self.phase() == Phase::Selecting {
                    self.phase = Phase::AwaitingOutcome;
                }
                None
            }
            ClientEvent::Push(event) => {
                self.apply_push(&event);
                None
            }
        }
    }

    fn apply_push(&mut self, event: &BroadcastEvent) {
        match event.topic {
            Topic::DataComplete => {
                self.status = Some(Status::Info("data transferred, verifying".into()));
            }
            Topic::Complete => {
                self.phase = Phase::Idle;
                self.status = Some(Status::Success);
            }
            Topic::Error => {
                self.phase = Phase::Idle;
                self.status = Some(Status::Failed(event.message.clone()));
            }
        }
    }
}
