//! Append-only log abstraction.
//!
//! The underlying data store is an externally supplied append-only,
//! content-addressed log with its own consistency guarantees; this module
//! only defines the seam the coordinator needs (where the segments live and
//! whether the log's index has caught up with them) plus [`SegmentLog`], a
//! minimal directory-backed implementation used by the server binary and
//! the test suite.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::Result;

/// Name of the index file a [`SegmentLog`] keeps beside its segments.
const INDEX_FILE: &str = ".index";

/// Whether the log's local index has caught up with the raw segment data.
///
/// After a replication pass the raw copy is done before the index is, so the
/// coordinator probes this instead of declaring completion immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Index covers every segment on disk
    Ready,
    /// Segments exist that the index has not absorbed yet
    Pending,
    /// This log cannot report readiness; callers fall back to a fixed
    /// settling delay
    Unsupported,
}

/// The append-only log the coordinator replicates.
pub trait AppendLog: Send + Sync {
    /// Directory holding the log's content-addressed segment files.
    fn storage_dir(&self) -> &Path;

    /// Probe whether the log's index has caught up with the segment data.
    fn readiness(&self) -> Result<Readiness>;

    /// Absorb any segments that arrived since the last refresh.
    fn refresh(&self) -> Result<()>;
}

/// Content address (lowercase hex SHA-256) of a segment's bytes.
#[must_use]
pub fn segment_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// List the segment file names in a log directory.
///
/// Dot-files (the index, safety markers) and subdirectories are not
/// segments.
pub fn list_segments(dir: &Path) -> Result<BTreeSet<String>> {
    let mut segments = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        segments.insert(name);
    }
    Ok(segments)
}

/// A directory of content-addressed segment files with a line-per-segment
/// index file.
///
/// `readiness()` reports [`Readiness::Pending`] until `refresh()` has
/// recorded every segment on disk, mirroring how the real log's index lags
/// a raw sneakernet copy.
#[derive(Debug)]
pub struct SegmentLog {
    dir: PathBuf,
}

impl SegmentLog {
    /// Open (creating if needed) a segment log at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let log = Self { dir };
        if !log.index_path().exists() {
            log.refresh()?;
        }
        Ok(log)
    }

    /// Append a new entry, returning its content address.
    ///
    /// Appending updates the index immediately; only segments that arrive
    /// out-of-band (a replication pass) leave the index stale.
    pub fn append(&self, bytes: &[u8]) -> Result<String> {
        let digest = segment_digest(bytes);
        let path = self.dir.join(&digest);
        if !path.exists() {
            fs::write(&path, bytes)?;
            let mut index = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.index_path())?;
            writeln!(index, "{digest}")?;
        }
        Ok(digest)
    }

    /// Segment names currently recorded in the index.
    pub fn indexed_segments(&self) -> Result<BTreeSet<String>> {
        match fs::read_to_string(self.index_path()) {
            Ok(text) => Ok(text.lines().map(str::to_owned).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }
}

impl AppendLog for SegmentLog {
    fn storage_dir(&self) -> &Path {
        &self.dir
    }

    fn readiness(&self) -> Result<Readiness> {
        let on_disk = list_segments(&self.dir)?;
        let indexed = self.indexed_segments()?;
        if on_disk.is_subset(&indexed) {
            Ok(Readiness::Ready)
        } else {
            Ok(Readiness::Pending)
        }
    }

    fn refresh(&self) -> Result<()> {
        let on_disk = list_segments(&self.dir)?;
        let mut index = String::new();
        for name in &on_disk {
            index.push_str(name);
            index.push('\n');
        }
        fs::write(self.index_path(), index)?;
        Ok(())
    }
}
