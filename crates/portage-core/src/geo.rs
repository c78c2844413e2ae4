//! Feature store boundary: bbox-scoped export and aggregate import.
//!
//! The geospatial codec internals (real shapefile parsing, report
//! rendering) live outside this crate; what is specified here is the
//! boundary contract the router depends on — a bbox filter with unbounded
//! defaults, and an import that attempts every feature collection
//! independently, aggregating failures instead of aborting.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A single point feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Free-form feature tags
    #[serde(default)]
    pub tags: BTreeMap<String, Value>,
}

/// A collection of features, as exchanged on the import/export boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureCollection {
    /// Member features
    #[serde(default)]
    pub features: Vec<Feature>,
}

/// Bounding box filter. Omitted bounds are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Bbox {
    /// Southern bound
    pub minlat: f64,
    /// Northern bound
    pub maxlat: f64,
    /// Western bound
    pub minlon: f64,
    /// Eastern bound
    pub maxlon: f64,
}

impl Default for Bbox {
    fn default() -> Self {
        Self {
            minlat: f64::NEG_INFINITY,
            maxlat: f64::INFINITY,
            minlon: f64::NEG_INFINITY,
            maxlon: f64::INFINITY,
        }
    }
}

impl Bbox {
    /// Whether the box contains the given point.
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.minlat && lat <= self.maxlat && lon >= self.minlon && lon <= self.maxlon
    }
}

impl Feature {
    /// Render as a GeoJSON `Feature` object (point geometry, lon/lat order).
    #[must_use]
    pub fn to_geojson(&self) -> Value {
        serde_json::json!({
            "type": "Feature",
            "geometry": {
                "type": "Point",
                "coordinates": [self.lon, self.lat],
            },
            "properties": self.tags,
        })
    }
}

/// What an import attempt did.
#[derive(Debug, Default, Serialize)]
pub struct ImportOutcome {
    /// Features persisted across all successful collections
    pub imported: usize,
    /// One entry per collection that failed conversion or import
    pub errors: Vec<String>,
}

/// Import a request body of one or more feature collections.
///
/// The body may carry a single collection or an array of them; a single
/// collection is normalized to a one-element list. Collections are
/// attempted independently: a failure converting or importing one is
/// recorded in the outcome and the rest are still tried. Only a body that
/// is not JSON at all is an error.
pub fn import_body(store: &dyn FeatureStore, body: &[u8]) -> Result<ImportOutcome> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| Error::MalformedRequest(format!("unparsable import body: {e}")))?;
    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut outcome = ImportOutcome::default();
    for item in items {
        let collection: FeatureCollection = match serde_json::from_value(item) {
            Ok(collection) => collection,
            Err(e) => {
                outcome.errors.push(format!("not a feature collection: {e}"));
                continue;
            }
        };
        match store.import(&collection) {
            Ok(count) => outcome.imported += count,
            Err(e) => outcome.errors.push(e.to_string()),
        }
    }
    Ok(outcome)
}

/// Where exported features come from and imported ones go.
pub trait FeatureStore: Send + Sync {
    /// Features within the box, for a streamed export.
    fn export(&self, bbox: &Bbox) -> Result<Vec<Feature>>;

    /// Import one collection, returning how many features were persisted.
    ///
    /// Collections are independent: a failure here must not stop the
    /// caller from attempting the remaining ones.
    fn import(&self, collection: &FeatureCollection) -> Result<usize>;
}

/// Feature store persisting JSON-line documents beside the log.
///
/// One feature per line; append-only, matching the log's discipline. The
/// whole file is re-read per export, which is fine at field-mapping
/// dataset sizes.
#[derive(Debug)]
pub struct LogFeatureStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LogFeatureStore {
    /// Open a feature store backed by `features.jsonl` under `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join("features.jsonl"),
            write_lock: Mutex::new(()),
        })
    }

    fn read_all(&self) -> Result<Vec<Feature>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut features = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            features.push(serde_json::from_str(line)?);
        }
        Ok(features)
    }
}

impl FeatureStore for LogFeatureStore {
    fn export(&self, bbox: &Bbox) -> Result<Vec<Feature>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|f| bbox.contains(f.lat, f.lon))
            .collect())
    }

    fn import(&self, collection: &FeatureCollection) -> Result<usize> {
        for feature in &collection.features {
            if !feature.lat.is_finite() || !feature.lon.is_finite() {
                return Err(Error::MalformedRequest(format!(
                    "feature has non-finite coordinates ({}, {})",
                    feature.lat, feature.lon
                )));
            }
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for feature in &collection.features {
            let line = serde_json::to_string(feature)?;
            writeln!(file, "{line}")?;
        }
        Ok(collection.features.len())
    }
}
