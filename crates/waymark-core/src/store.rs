//! Reference Store: durable, append-only marker persistence.
//!
//! The whole collection lives as one ordered JSON list under a single storage
//! key. Reads filter linearly by event id; the only mutations are append and
//! clear-all.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::marker::Marker;

/// Durable storage collaborator.
pub trait MarkerStore {
    /// Every stored marker, in insertion order.
    fn load_all_markers(&self) -> Result<Vec<Marker>, StorageError>;

    /// Append one marker. Either the marker is durably stored or the
    /// collection is left exactly as it was. A marker whose position is not
    /// finite is refused with [`StorageError::NonFinitePosition`].
    fn append_marker(&mut self, marker: &Marker) -> Result<(), StorageError>;

    /// Remove every marker for every event.
    fn clear_all_markers(&mut self) -> Result<(), StorageError>;

    /// Markers recorded under `event_id`, in insertion order.
    fn markers_for_event(&self, event_id: &str) -> Result<Vec<Marker>, StorageError> {
        Ok(self
            .load_all_markers()?
            .into_iter()
            .filter(|m| m.belongs_to(event_id))
            .collect())
    }

    /// Counts across the whole collection.
    fn summary(&self) -> Result<StoreSummary, StorageError> {
        Ok(StoreSummary::from_markers(&self.load_all_markers()?))
    }
}

/// Aggregate counts over a marker collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub marker_count: usize,
    pub event_count: usize,
    /// Marker count per event id.
    pub per_event: BTreeMap<String, usize>,
}

impl StoreSummary {
    #[must_use]
    pub fn from_markers(markers: &[Marker]) -> Self {
        let mut per_event = BTreeMap::new();
        for marker in markers {
            *per_event.entry(marker.event_id.clone()).or_insert(0) += 1;
        }
        Self {
            marker_count: markers.len(),
            event_count: per_event.len(),
            per_event,
        }
    }

    #[must_use]
    pub fn markers_for(&self, event_id: &str) -> usize {
        self.per_event.get(event_id).copied().unwrap_or(0)
    }
}

// =============================================================================
// JSON file store
// =============================================================================

/// Default storage key, shared with existing client documents.
pub const DEFAULT_STORAGE_KEY: &str = "pontos";

/// File-backed store: `<dir>/<key>.json` holds the list, `<key>.lock` guards writers.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    document_path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    /// Open (creating the directory if needed) the store for `key` under `dir`.
    pub fn open(dir: &Path, key: &str) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|source| StorageError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let store = Self {
            document_path: dir.join(format!("{key}.json")),
            lock_path: dir.join(format!("{key}.lock")),
        };
        debug!(path = %store.document_path.display(), "Opened marker store");
        Ok(store)
    }

    /// Open the store described by the storage section of the config.
    pub fn from_config(config: &crate::config::StorageConfig) -> Result<Self, StorageError> {
        Self::open(&config.resolved_data_dir(), &config.key)
    }

    #[must_use]
    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    fn lock(&self) -> Result<File, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|source| self.lock_error(source))?;
        file.lock_exclusive().map_err(|source| self.lock_error(source))?;
        Ok(file)
    }

    fn lock_error(&self, source: io::Error) -> StorageError {
        StorageError::Lock {
            path: self.lock_path.display().to_string(),
            source,
        }
    }

    fn read_document(&self) -> Result<Vec<Marker>, StorageError> {
        let content = match fs::read_to_string(&self.document_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.document_path, e)),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| StorageError::Corruption {
            path: self.document_path.display().to_string(),
            details: e.to_string(),
        })
    }

    fn write_document(&self, markers: &[Marker]) -> Result<(), StorageError> {
        let content = serde_json::to_string(markers)?;
        let tmp_path = self.document_path.with_extension("json.tmp");
        fs::write(&tmp_path, content).map_err(|e| io_error(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.document_path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            io_error(&self.document_path, e)
        })
    }
}

impl MarkerStore for JsonFileStore {
    fn load_all_markers(&self) -> Result<Vec<Marker>, StorageError> {
        self.read_document()
    }

    fn append_marker(&mut self, marker: &Marker) -> Result<(), StorageError> {
        ensure_finite(marker)?;
        let _guard = self.lock()?;
        let mut markers = self.read_document()?;
        markers.push(marker.clone());
        self.write_document(&markers)?;
        debug!(
            marker_id = %marker.id,
            event_id = %marker.event_id,
            total = markers.len(),
            "Marker appended"
        );
        Ok(())
    }

    fn clear_all_markers(&mut self) -> Result<(), StorageError> {
        let _guard = self.lock()?;
        match fs::remove_file(&self.document_path) {
            Ok(()) => {
                info!(path = %self.document_path.display(), "Cleared all markers");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(error = %e, "Failed to clear marker store");
                Err(io_error(&self.document_path, e))
            }
        }
    }
}

/// NaN and infinity have no JSON form; serializing them would write `null`.
fn ensure_finite(marker: &Marker) -> Result<(), StorageError> {
    if marker.relative_position.is_finite() {
        return Ok(());
    }
    warn!(marker_id = %marker.id, position = %marker.relative_position, "Refusing non-finite marker");
    Err(StorageError::NonFinitePosition {
        marker_id: marker.id.clone(),
    })
}

fn io_error(path: &Path, source: io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store for tests and hosts without durable storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    markers: Vec<Marker>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_markers(markers: Vec<Marker>) -> Self {
        Self { markers }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

impl MarkerStore for MemoryStore {
    fn load_all_markers(&self) -> Result<Vec<Marker>, StorageError> {
        Ok(self.markers.clone())
    }

    fn append_marker(&mut self, marker: &Marker) -> Result<(), StorageError> {
        ensure_finite(marker)?;
        self.markers.push(marker.clone());
        Ok(())
    }

    fn clear_all_markers(&mut self) -> Result<(), StorageError> {
        self.markers.clear();
        Ok(())
    }
}
