//! Safety-file transfer against a removable medium.
//!
//! A replication pass exchanges content-addressed log segments between the
//! local log directory and a directory on the medium. Before anything is
//! written, a safety marker is created on the medium; it is removed only
//! after every copied segment has been re-read and verified. A marker that
//! is already present means the previous pass was interrupted (medium
//! yanked mid-copy), so the pass re-copies everything rather than trusting
//! the medium's contents — segments are content-addressed, so re-copying
//! is idempotent.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::log::{list_segments, segment_digest};
use crate::SAFETY_FILE_NAME;

/// Name of the segment directory on the medium.
const MEDIUM_LOG_DIR: &str = "portage-log";

/// What a completed transfer pass moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Segments copied from the medium into the local log
    pub segments_in: u64,
    /// Segments copied from the local log onto the medium
    pub segments_out: u64,
    /// Bytes copied in
    pub bytes_in: u64,
    /// Bytes copied out
    pub bytes_out: u64,
}

/// The transfer mechanism a replication pass runs.
///
/// Implementations perform long-running blocking I/O; the coordinator runs
/// them on a blocking task so request handling is never stalled.
pub trait MediumTransfer: Send + Sync + 'static {
    /// Exchange log segments between `log_dir` and the medium at `medium`.
    fn replicate(&self, log_dir: &Path, medium: &Path) -> Result<TransferStats>;
}

/// Production [`MediumTransfer`]: bidirectional copy-if-absent with a
/// safety marker and post-copy verification.
#[derive(Debug, Default)]
pub struct SyncfileTransfer;

impl SyncfileTransfer {
    /// Create a new transfer mechanism.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Path of the safety marker for a medium.
    #[must_use]
    pub fn safety_file(medium: &Path) -> PathBuf {
        medium.join(SAFETY_FILE_NAME)
    }

    /// Path of the segment directory on a medium.
    #[must_use]
    pub fn medium_log_dir(medium: &Path) -> PathBuf {
        medium.join(MEDIUM_LOG_DIR)
    }

    fn copy_missing(src: &Path, dst: &Path) -> Result<(u64, u64)> {
        let have = list_segments(dst)?;
        let mut segments = 0;
        let mut bytes = 0;
        for name in list_segments(src)?.difference(&have) {
            let data = fs::read(src.join(name))?;
            let out_path = dst.join(name);
            fs::write(&out_path, &data)?;

            // Re-read and verify against the content address before
            // trusting the copy. Removable media lie: a torn write can look
            // complete until the next mount. Checking the name rather than
            // the source bytes also stops a segment that was already
            // corrupt on the source side from propagating.
            let written = fs::read(&out_path)?;
            if segment_digest(&written) != *name {
                let _ = fs::remove_file(&out_path);
                return Err(Error::SegmentCorrupt { name: name.clone() });
            }

            segments += 1;
            bytes += data.len() as u64;
        }
        Ok((segments, bytes))
    }
}

impl MediumTransfer for SyncfileTransfer {
    fn replicate(&self, log_dir: &Path, medium: &Path) -> Result<TransferStats> {
        if !medium.is_dir() {
            return Err(Error::Transfer(format!(
                "medium not mounted: {}",
                medium.display()
            )));
        }

        let marker = Self::safety_file(medium);
        if marker.exists() {
            tracing::warn!(
                medium = %medium.display(),
                "stale safety file found, previous pass was interrupted; re-copying"
            );
        }
        fs::write(&marker, chrono::Utc::now().to_rfc3339())
            .map_err(|e| Error::Transfer(format!("cannot write safety file: {e}")))?;

        let medium_log = Self::medium_log_dir(medium);
        fs::create_dir_all(&medium_log)?;

        let (segments_out, bytes_out) = Self::copy_missing(log_dir, &medium_log)?;
        let (segments_in, bytes_in) = Self::copy_missing(&medium_log, log_dir)?;

        fs::remove_file(&marker)?;

        let stats = TransferStats {
            segments_in,
            segments_out,
            bytes_in,
            bytes_out,
        };
        tracing::info!(
            medium = %medium.display(),
            in_ = stats.segments_in,
            out = stats.segments_out,
            "transfer pass finished"
        );
        Ok(stats)
    }
}
