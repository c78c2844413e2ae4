//! Shared application state for the HTTP handlers.

use std::sync::Arc;

use crate::config::DiscoveryConfig;
use crate::geo::FeatureStore;
use crate::hub::EventHub;
use crate::replicate::ReplicationCoordinator;

/// State every handler can reach.
pub struct AppState {
    /// Single-flight replication coordinator
    pub coordinator: Arc<ReplicationCoordinator>,
    /// Push-client broadcast hub
    pub hub: Arc<EventHub>,
    /// Feature store behind export/import
    pub features: Arc<dyn FeatureStore>,
    /// Sync target discovery settings
    pub discovery: DiscoveryConfig,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("coordinator", &self.coordinator)
            .field("discovery", &self.discovery)
            .finish_non_exhaustive()
    }
}

/// Type alias for shared state across handlers.
pub type SharedState = Arc<AppState>;
