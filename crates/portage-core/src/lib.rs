//! # Portage Core Library
//!
//! `portage-core` provides the replication coordination service for Portage,
//! an offline field-mapping tool whose devices exchange data over physically
//! carried removable media ("sneakernet") instead of a live network link.
//!
//! ## Responsibilities
//!
//! - **Single-flight replication**: at most one replication pass against the
//!   shared append-only log at a time, guarded by an atomically
//!   checked-and-set session state.
//! - **Safety-file transfer**: a marker file written before any data moves so
//!   an interrupted pass (medium removed mid-copy) is detected instead of
//!   silently corrupting state.
//! - **Lifecycle broadcast**: best-effort fan-out of `data-complete`,
//!   `complete` and `error` events to every connected push client.
//! - **HTTP surface**: `/replicate`, `/export.geojson`, `/import.shp`,
//!   `/sync_targets` and the `/ws` push channel.
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`discovery`] - Removable-media sync target discovery
//! - [`error`] - Error types
//! - [`geo`] - Feature store boundary (bbox export, aggregate import)
//! - [`hub`] - Event broadcast hub for push clients
//! - [`log`] - Append-only log abstraction and segment store
//! - [`replicate`] - Replication coordinator and medium transfer
//! - [`web`] - HTTP server and request router
//!
//! ## Example
//!
//! ```rust,ignore
//! use portage_core::replicate::ReplicationCoordinator;
//!
//! let coordinator = ReplicationCoordinator::new(log, transfer, hub, config);
//! coordinator.start("/media/usb1")?;
//! // outcome arrives on the push channel, not here
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod discovery;
pub mod error;
pub mod geo;
pub mod hub;
pub mod log;
pub mod replicate;
pub mod web;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP port for the coordination service
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Default settling delay (seconds) applied after a transfer when the log
/// layer cannot report readiness itself
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 5;

/// Default interval (milliseconds) between log readiness probes
pub const DEFAULT_READINESS_POLL_MS: u64 = 250;

/// Default ceiling (seconds) on waiting for log readiness
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 60;

/// File name of the safety marker written next to a medium's log directory
pub const SAFETY_FILE_NAME: &str = ".portage-syncfile";
