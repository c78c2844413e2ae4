//! Configuration management for Portage.
//!
//! Configuration is loaded from a TOML file when present and falls back to
//! defaults otherwise. Every section has working defaults so a bare
//! `portage serve` needs no config file at all.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{
    DEFAULT_HTTP_PORT, DEFAULT_READINESS_POLL_MS, DEFAULT_READINESS_TIMEOUT_SECS,
    DEFAULT_SETTLE_DELAY_SECS,
};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Replication timing settings
    pub replication: ReplicationConfig,
    /// Sync target discovery settings
    pub discovery: DiscoveryConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind to localhost only
    pub localhost_only: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_HTTP_PORT,
            localhost_only: true,
        }
    }
}

impl ServerConfig {
    /// Get the bind address for the server.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        if self.localhost_only {
            SocketAddr::from(([127, 0, 0, 1], self.port))
        } else {
            SocketAddr::from(([0, 0, 0, 0], self.port))
        }
    }
}

/// Replication timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Settling delay in seconds, applied after a transfer when the log
    /// layer cannot report readiness itself (fallback heuristic)
    pub settle_delay_secs: u64,
    /// Interval in milliseconds between log readiness probes
    pub readiness_poll_ms: u64,
    /// Ceiling in seconds on waiting for log readiness
    pub readiness_timeout_secs: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: DEFAULT_SETTLE_DELAY_SECS,
            readiness_poll_ms: DEFAULT_READINESS_POLL_MS,
            readiness_timeout_secs: DEFAULT_READINESS_TIMEOUT_SECS,
        }
    }
}

impl ReplicationConfig {
    /// Settling delay as a [`Duration`].
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// Readiness poll interval as a [`Duration`].
    #[must_use]
    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }

    /// Readiness timeout as a [`Duration`].
    #[must_use]
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }
}

/// Sync target discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Directories scanned for mounted removable media
    pub media_roots: Vec<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            media_roots: default_media_roots(),
        }
    }
}

fn default_media_roots() -> Vec<PathBuf> {
    if cfg!(target_os = "macos") {
        vec![PathBuf::from("/Volumes")]
    } else {
        vec![PathBuf::from("/media"), PathBuf::from("/mnt")]
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the default configuration; a present but
    /// unparsable file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, DEFAULT_HTTP_PORT);
        assert!(config.server.localhost_only);
        assert_eq!(config.replication.settle_delay_secs, 5);
        assert!(!config.discovery.media_roots.is_empty());
    }

    #[test]
    fn test_bind_addr() {
        let server = ServerConfig {
            port: 7000,
            localhost_only: true,
        };
        assert_eq!(server.bind_addr().to_string(), "127.0.0.1:7000");

        let server = ServerConfig {
            port: 7000,
            localhost_only: false,
        };
        assert_eq!(server.bind_addr().to_string(), "0.0.0.0:7000");
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.port, DEFAULT_HTTP_PORT);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portage.toml");
        std::fs::write(
            &path,
            "[replication]\nsettle_delay_secs = 2\n\n[server]\nport = 9999\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.replication.settle_delay_secs, 2);
        // untouched section keeps its default
        assert_eq!(config.replication.readiness_poll_ms, DEFAULT_READINESS_POLL_MS);
    }

    #[test]
    fn test_load_garbage_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portage.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
