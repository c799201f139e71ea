//! Trace-driven PU model
//!
//! Loads a deterministic map of primary-user sources from a YAML file:
//!
//! ```yaml
//! epoch: 0.0
//! num_channels: 11
//! interference_threshold_dbm: -100.0
//! sources:
//!   - id: 0
//!     x: 100.0
//!     y: 50.0
//!     radius: 250.0
//!     interference_dbm: -60.0
//!     channel: 2
//!     activity:
//!       - [0.0, 1.5]
//!       - [3.0, 4.0]
//! ```
//!
//! Times are in seconds; each `activity` pair is a half-open
//! `[arrival, departure)` period.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{PuActivity, PuModel};
use crate::error::{check_channel, CognitiveError, CognitiveResult};
use crate::time::SimTime;
use crate::types::{ChannelId, Position, MAX_PU_DATA_ENTRY};

/// On-disk PU map document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PuMapFile {
    /// Model epoch in seconds
    #[serde(default)]
    pub epoch: f64,
    pub num_channels: usize,
    #[serde(default)]
    pub interference_threshold_dbm: Option<f64>,
    #[serde(default)]
    pub sources: Vec<PuSourceSpec>,
}

/// One source entry of a PU map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PuSourceSpec {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub interference_dbm: f64,
    pub channel: ChannelId,
    /// `[arrival, departure)` pairs in seconds
    #[serde(default)]
    pub activity: Vec<[f64; 2]>,
}

impl PuSourceSpec {
    fn into_activity(self, num_channels: usize) -> CognitiveResult<PuActivity> {
        check_channel(self.channel, num_channels)
            .map_err(|e| CognitiveError::MalformedPuMap(format!("source {}: {}", self.id, e)))?;
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(CognitiveError::MalformedPuMap(format!(
                "source {}: invalid radius {}",
                self.id, self.radius
            )));
        }
        if self.activity.len() > MAX_PU_DATA_ENTRY {
            return Err(CognitiveError::MalformedPuMap(format!(
                "source {}: {} activity entries exceed the limit of {}",
                self.id,
                self.activity.len(),
                MAX_PU_DATA_ENTRY
            )));
        }

        let mut source = PuActivity::new(
            self.id,
            Position::new(self.x, self.y),
            self.radius,
            self.interference_dbm,
            self.channel,
        );
        for [arrival, departure] in self.activity {
            if !arrival.is_finite() || !departure.is_finite() || arrival < 0.0 {
                return Err(CognitiveError::MalformedPuMap(format!(
                    "source {}: invalid period [{}, {})",
                    self.id, arrival, departure
                )));
            }
            source.push_interval(
                SimTime::from_secs_f64(arrival),
                SimTime::from_secs_f64(departure),
            )?;
        }
        Ok(source)
    }
}

/// PU model backed by a fixed trace of sources.
#[derive(Debug, Clone)]
pub struct TraceDrivenPuModel {
    num_channels: usize,
    epoch: SimTime,
    interference_threshold_dbm: Option<f64>,
    sources: Vec<PuActivity>,
    map_path: Option<PathBuf>,
}

impl TraceDrivenPuModel {
    /// Empty model over `num_channels` channels.
    pub fn new(num_channels: usize) -> Self {
        Self {
            num_channels,
            epoch: SimTime::ZERO,
            interference_threshold_dbm: None,
            sources: Vec::new(),
            map_path: None,
        }
    }

    /// Load a model from a PU map file.
    pub fn from_map_file(path: impl AsRef<Path>) -> CognitiveResult<Self> {
        let mut model = Self::new(0);
        model.set_pu_map_file(path)?;
        Ok(model)
    }

    /// Parse a model from YAML text.
    pub fn from_yaml(yaml: &str) -> CognitiveResult<Self> {
        let map: PuMapFile =
            serde_yaml::from_str(yaml).map_err(|e| CognitiveError::MalformedPuMap(e.to_string()))?;
        Self::from_map(map)
    }

    pub fn from_map(map: PuMapFile) -> CognitiveResult<Self> {
        if map.num_channels == 0 || map.num_channels > ChannelId::MAX as usize + 1 {
            return Err(CognitiveError::MalformedPuMap(format!(
                "num_channels must be in 1..={}, got {}",
                ChannelId::MAX as usize + 1,
                map.num_channels
            )));
        }
        if !map.epoch.is_finite() || map.epoch < 0.0 {
            return Err(CognitiveError::MalformedPuMap(format!("invalid epoch {}", map.epoch)));
        }

        let mut seen = HashSet::new();
        let mut sources = Vec::with_capacity(map.sources.len());
        for spec in map.sources {
            if !seen.insert(spec.id) {
                return Err(CognitiveError::MalformedPuMap(format!(
                    "duplicate source id {}",
                    spec.id
                )));
            }
            sources.push(spec.into_activity(map.num_channels)?);
        }

        Ok(Self {
            num_channels: map.num_channels,
            epoch: SimTime::from_secs_f64(map.epoch),
            interference_threshold_dbm: map.interference_threshold_dbm,
            sources,
            map_path: None,
        })
    }

    /// Replace the current sources with those of a PU map file.
    ///
    /// On error the model is left unchanged.
    pub fn set_pu_map_file(&mut self, path: impl AsRef<Path>) -> CognitiveResult<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut loaded = Self::from_yaml(&content)?;
        loaded.map_path = Some(path.to_path_buf());

        tracing::info!(
            path = %path.display(),
            sources = loaded.sources.len(),
            num_channels = loaded.num_channels,
            "loaded PU map"
        );
        *self = loaded;
        Ok(())
    }

    /// Register one more source.
    pub fn add_source(&mut self, source: PuActivity) -> CognitiveResult<()> {
        check_channel(source.channel, self.num_channels)?;
        if self.sources.iter().any(|s| s.id == source.id) {
            return Err(CognitiveError::MalformedPuMap(format!(
                "duplicate source id {}",
                source.id
            )));
        }
        self.sources.push(source);
        Ok(())
    }

    pub fn set_epoch(&mut self, epoch: SimTime) {
        self.epoch = epoch;
    }

    pub fn set_interference_threshold_dbm(&mut self, threshold: Option<f64>) {
        self.interference_threshold_dbm = threshold;
    }

    /// Path of the map file this model was loaded from, if any.
    pub fn map_path(&self) -> Option<&Path> {
        self.map_path.as_deref()
    }
}

impl PuModel for TraceDrivenPuModel {
    fn name(&self) -> &str {
        "trace"
    }

    fn num_channels(&self) -> usize {
        self.num_channels
    }

    fn epoch(&self) -> SimTime {
        self.epoch
    }

    fn interference_threshold_dbm(&self) -> Option<f64> {
        self.interference_threshold_dbm
    }

    fn sources(&self) -> &[PuActivity] {
        &self.sources
    }

    fn sources_mut(&mut self) -> &mut [PuActivity] {
        &mut self.sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MAP: &str = r#"
epoch: 0.0
num_channels: 3
sources:
  - id: 0
    x: 0.0
    y: 0.0
    radius: 50.0
    interference_dbm: -60.0
    channel: 2
    activity:
      - [0.0, 0.5]
      - [1.0, 2.0]
  - id: 1
    x: 500.0
    y: 500.0
    radius: 10.0
    interference_dbm: -80.0
    channel: 0
"#;

    #[test]
    fn test_parse_map() {
        let model = TraceDrivenPuModel::from_yaml(MAP).unwrap();
        assert_eq!(model.num_channels(), 3);
        assert_eq!(model.sources().len(), 2);
        assert_eq!(model.sources()[0].intervals().len(), 2);
        assert!(model
            .is_pu_active(SimTime::from_millis(250), SimTime::ZERO, 10.0, 10.0, 2)
            .unwrap());
        assert!(!model
            .is_pu_active(SimTime::from_millis(500), SimTime::ZERO, 10.0, 10.0, 2)
            .unwrap());
    }

    #[test]
    fn test_set_pu_map_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(MAP.as_bytes()).unwrap();

        let mut model = TraceDrivenPuModel::new(1);
        model.set_pu_map_file(file.path()).unwrap();
        assert_eq!(model.num_channels(), 3);
        assert_eq!(model.map_path(), Some(file.path()));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = TraceDrivenPuModel::from_map_file("/nonexistent/pu_map.yaml").unwrap_err();
        assert!(matches!(err, CognitiveError::Io(_)));
    }

    #[test]
    fn test_reject_out_of_range_channel() {
        let yaml = r#"
num_channels: 2
sources:
  - { id: 0, x: 0, y: 0, radius: 1, interference_dbm: -60, channel: 2 }
"#;
        let err = TraceDrivenPuModel::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, CognitiveError::MalformedPuMap(_)));
    }

    #[test]
    fn test_reject_inverted_period() {
        let yaml = r#"
num_channels: 2
sources:
  - { id: 0, x: 0, y: 0, radius: 1, interference_dbm: -60, channel: 1, activity: [[2.0, 1.0]] }
"#;
        assert!(TraceDrivenPuModel::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_reject_duplicate_ids_and_zero_channels() {
        let dup = r#"
num_channels: 2
sources:
  - { id: 3, x: 0, y: 0, radius: 1, interference_dbm: -60, channel: 1 }
  - { id: 3, x: 1, y: 0, radius: 1, interference_dbm: -60, channel: 0 }
"#;
        assert!(TraceDrivenPuModel::from_yaml(dup).is_err());
        assert!(TraceDrivenPuModel::from_yaml("num_channels: 0").is_err());
        assert!(TraceDrivenPuModel::from_yaml("sources: [").is_err());
    }

    #[test]
    fn test_failed_reload_keeps_model() {
        let mut model = TraceDrivenPuModel::from_yaml(MAP).unwrap();
        assert!(model.set_pu_map_file("/nonexistent/map.yaml").is_err());
        assert_eq!(model.sources().len(), 2);
    }
}
