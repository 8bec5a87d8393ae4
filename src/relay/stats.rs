//! Relay usage statistics and their JSON snapshot.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Lifetime usage counters for the relay.
///
/// Serialized as a flat JSON object with exactly these five fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayStatistics {
    /// Completed ON→OFF cycles.
    pub total_cycles: u64,
    /// Accumulated ON time of completed sessions.
    pub total_runtime_seconds: f64,
    /// Wall clock (unix seconds) of the last OFF→ON edge, 0 if never.
    pub last_on_at: f64,
    /// Wall clock (unix seconds) of the last ON→OFF edge, 0 if never.
    pub last_off_at: f64,
    /// OFF→ON edges.
    pub power_on_count: u64,
}

impl RelayStatistics {
    /// Mean duration of completed sessions, 0 with no cycles.
    pub fn average_session_duration(&self) -> f64 {
        if self.total_cycles == 0 {
            0.0
        } else {
            self.total_runtime_seconds / self.total_cycles as f64
        }
    }
}

/// Error reading or writing the snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("statistics file IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("statistics file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Best-effort persistence of [`RelayStatistics`].
#[derive(Debug, Clone)]
pub struct StatsStore {
    path: Option<PathBuf>,
}

impl StatsStore {
    /// `None` disables persistence entirely.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Build from the configured path, where empty means disabled.
    pub fn from_config_path(path: &str) -> Self {
        if path.is_empty() {
            Self::new(None)
        } else {
            Self::new(Some(PathBuf::from(path)))
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the snapshot. A missing file yields `Ok(None)`.
    pub fn load(&self) -> Result<Option<RelayStatistics>, StatsError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(path)?);
        let stats = serde_json::from_reader(reader)?;
        Ok(Some(stats))
    }

    /// Load, degrading to defaults on any failure.
    pub fn load_or_default(&self) -> RelayStatistics {
        match self.load() {
            Ok(Some(stats)) => {
                tracing::debug!(cycles = stats.total_cycles, "Relay statistics loaded");
                stats
            }
            Ok(None) => {
                tracing::debug!("No existing statistics file found, using defaults");
                RelayStatistics::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable statistics file");
                RelayStatistics::default()
            }
        }
    }

    pub fn save(&self, stats: &RelayStatistics) -> Result<(), StatsError> {
        if let Some(path) = &self.path {
            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer(writer, stats)?;
            tracing::debug!(path = %path.display(), "Relay statistics saved");
        }
        Ok(())
    }

    /// Save, logging instead of failing.
    pub fn save_best_effort(&self, stats: &RelayStatistics) {
        if let Err(e) = self.save(stats) {
            tracing::warn!(error = %e, "Failed to save relay statistics");
        }
    }
}

/// Current wall clock as fractional unix seconds.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("relay-stats-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn snapshot_is_flat_object_with_five_fields() {
        let stats = RelayStatistics {
            total_cycles: 2,
            total_runtime_seconds: 12.5,
            last_on_at: 100.0,
            last_off_at: 110.0,
            power_on_count: 3,
        };
        let value = serde_json::to_value(&stats).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 5);
        assert_eq!(object["total_cycles"], 2);
        assert_eq!(object["power_on_count"], 3);
    }

    #[test]
    fn persistence_roundtrip() {
        let path = temp_path();
        let store = StatsStore::new(Some(path.clone()));
        assert!(store.load().unwrap().is_none());

        let stats = RelayStatistics {
            total_cycles: 4,
            total_runtime_seconds: 40.0,
            ..Default::default()
        };
        store.save(&stats).unwrap();
        assert_eq!(store.load().unwrap(), Some(stats));

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn corrupt_file_degrades_to_defaults() {
        let path = temp_path();
        std::fs::write(&path, "not json").unwrap();
        let store = StatsStore::new(Some(path.clone()));

        assert!(store.load().is_err());
        assert_eq!(store.load_or_default(), RelayStatistics::default());

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn average_session_duration() {
        let mut stats = RelayStatistics::default();
        assert_eq!(stats.average_session_duration(), 0.0);
        stats.total_cycles = 4;
        stats.total_runtime_seconds = 10.0;
        assert_eq!(stats.average_session_duration(), 2.5);
    }

    #[test]
    fn disabled_store_is_noop() {
        let store = StatsStore::from_config_path("");
        assert!(store.path().is_none());
        store.save(&RelayStatistics::default()).unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
