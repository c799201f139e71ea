//! # Configuration System
//!
//! YAML configuration for cognitive-radio scenarios:
//!
//! - Channel table (bandwidth, packet error rate)
//! - Sensing parameters (detection and false-alarm probabilities, seed)
//! - Manager timing and the busy-retry policy
//! - Decision tie-break policy
//! - Primary-user model (trace file or synthetic ON/OFF sources)
//! - Secondary-user nodes and logging
//!
//! ## Configuration Search Path
//!
//! Configuration is loaded from the first file found:
//! 1. Path specified via `COGRADIO_CONFIG` environment variable
//! 2. `./cogradio.yaml` (current directory)
//! 3. `~/.config/cogradio/config.yaml` (user config)
//! 4. `/etc/cogradio/config.yaml` (system config)
//!
//! The busy-retry bound has no built-in default, so the `manager.retry`
//! section is mandatory.
//!
//! ## Example Configuration
//!
//! ```yaml
//! spectrum:
//!   channels:
//!     - { bandwidth_hz: 2.0e7, packet_error_rate: 0.01 }
//!     - { bandwidth_hz: 2.0e7, packet_error_rate: 0.05 }
//!
//! manager:
//!   sense_duration_s: 0.01
//!   transmit_duration_s: 0.05
//!   retry:
//!     max_busy_retries: 4
//!     on_busy: handoff
//!
//! pu_model:
//!   kind: trace
//!   path: "pu_map.yaml"
//!
//! nodes:
//!   - { id: 0, x: 0.0, y: 0.0, channel: 1 }
//! ```

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::decision::TieBreak;
use crate::error::CognitiveError;
use crate::observe::LogConfig;
use crate::pu_model::{
    PuModel, SharedPuModel, SyntheticPuModel, SyntheticSourceSpec, TraceDrivenPuModel,
};
use crate::spectrum_data::{SpectrumData, SpectrumEntry};
use crate::time::SimTime;
use crate::types::{ChannelId, NodeId, Position};

/// Error type for configuration operations.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Configuration file not found
    NotFound(String),
    /// Failed to read configuration file
    ReadError(String),
    /// Failed to parse configuration
    ParseError(String),
    /// Invalid configuration value
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(msg) => write!(f, "config not found: {}", msg),
            ConfigError::ReadError(msg) => write!(f, "failed to read config: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "failed to parse config: {}", msg),
            ConfigError::ValidationError(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for CognitiveError {
    fn from(e: ConfigError) -> Self {
        CognitiveError::Config(e.to_string())
    }
}

/// Channel table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// Channel `i` is the `i`-th entry
    pub channels: Vec<SpectrumEntry>,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            // 11 x 20 MHz channels of the 2.4 GHz ISM band
            channels: vec![SpectrumEntry::new(20.0e6, 0.0); 11],
        }
    }
}

/// Sensing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensingConfig {
    /// Probability of detecting an active PU
    pub detection_probability: f64,
    /// Probability of reporting a free channel as busy
    pub false_alarm_probability: f64,
    /// Base seed; each node senses on its own stream
    pub seed: u64,
}

impl Default for SensingConfig {
    fn default() -> Self {
        Self {
            detection_probability: 1.0,
            false_alarm_probability: 0.0,
            seed: 42,
        }
    }
}

/// What a manager does after a busy sensing verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyAction {
    /// Move to another channel
    Handoff,
    /// Stay and sense the same channel again
    Resense,
}

impl Default for BusyAction {
    fn default() -> Self {
        BusyAction::Handoff
    }
}

/// Busy-retry policy.
///
/// After more than `max_busy_retries` consecutive busy verdicts the manager
/// reports prolonged unavailability to the MAC and goes idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_busy_retries: u32,
    #[serde(default)]
    pub on_busy: BusyAction,
}

impl RetryPolicy {
    pub fn new(max_busy_retries: u32, on_busy: BusyAction) -> Self {
        Self {
            max_busy_retries,
            on_busy,
        }
    }
}

/// Manager timing and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub sense_duration_s: f64,
    pub transmit_duration_s: f64,
    #[serde(default = "default_handoff_duration")]
    pub handoff_duration_s: f64,
    /// Gap the simulated MAC waits before the next transmission opportunity
    #[serde(default = "default_inter_frame_gap")]
    pub inter_frame_gap_s: f64,
    pub retry: RetryPolicy,
}

fn default_handoff_duration() -> f64 {
    0.005
}

fn default_inter_frame_gap() -> f64 {
    0.001
}

impl ManagerConfig {
    pub fn new(sense: SimTime, transmit: SimTime, retry: RetryPolicy) -> Self {
        Self {
            sense_duration_s: sense.as_secs_f64(),
            transmit_duration_s: transmit.as_secs_f64(),
            handoff_duration_s: default_handoff_duration(),
            inter_frame_gap_s: default_inter_frame_gap(),
            retry,
        }
    }

    pub fn with_handoff_duration(mut self, d: SimTime) -> Self {
        self.handoff_duration_s = d.as_secs_f64();
        self
    }

    pub fn with_inter_frame_gap(mut self, d: SimTime) -> Self {
        self.inter_frame_gap_s = d.as_secs_f64();
        self
    }

    pub fn sense_duration(&self) -> SimTime {
        SimTime::from_secs_f64(self.sense_duration_s)
    }

    pub fn transmit_duration(&self) -> SimTime {
        SimTime::from_secs_f64(self.transmit_duration_s)
    }

    pub fn handoff_duration(&self) -> SimTime {
        SimTime::from_secs_f64(self.handoff_duration_s)
    }

    pub fn inter_frame_gap(&self) -> SimTime {
        SimTime::from_secs_f64(self.inter_frame_gap_s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, v) in [
            ("sense_duration_s", self.sense_duration_s),
            ("transmit_duration_s", self.transmit_duration_s),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(ConfigError::ValidationError(format!("{} must be positive", name)));
            }
        }
        for (name, v) in [
            ("handoff_duration_s", self.handoff_duration_s),
            ("inter_frame_gap_s", self.inter_frame_gap_s),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(ConfigError::ValidationError(format!("{} must be >= 0", name)));
            }
        }
        Ok(())
    }
}

/// Decision policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub tie_break: TieBreak,
}

/// Primary-user model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PuModelConfig {
    /// Load a PU map file
    Trace { path: PathBuf },
    /// Generate exponential ON/OFF schedules
    Synthetic {
        #[serde(default)]
        seed: u64,
        horizon_s: f64,
        #[serde(default)]
        sources: Vec<SyntheticSourceSpec>,
    },
}

impl Default for PuModelConfig {
    fn default() -> Self {
        PuModelConfig::Synthetic {
            seed: 0,
            horizon_s: 10.0,
            sources: Vec::new(),
        }
    }
}

impl PuModelConfig {
    /// Instantiate the configured model. Relative trace paths resolve
    /// against `base_dir` when given.
    pub fn build(
        &self,
        num_channels: usize,
        base_dir: Option<&Path>,
    ) -> Result<SharedPuModel, CognitiveError> {
        match self {
            PuModelConfig::Trace { path } => {
                let path = match base_dir {
                    Some(dir) if path.is_relative() => dir.join(path),
                    _ => path.clone(),
                };
                let model = TraceDrivenPuModel::from_map_file(&path)?;
                if model.num_channels() != num_channels {
                    return Err(CognitiveError::Config(format!(
                        "PU map declares {} channels, spectrum has {}",
                        model.num_channels(),
                        num_channels
                    )));
                }
                let model: SharedPuModel = Rc::new(RefCell::new(model));
                Ok(model)
            }
            PuModelConfig::Synthetic {
                seed,
                horizon_s,
                sources,
            } => {
                let model = SyntheticPuModel::generate(
                    num_channels,
                    sources,
                    SimTime::from_secs_f64(*horizon_s),
                    *seed,
                )?;
                let model: SharedPuModel = Rc::new(RefCell::new(model));
                Ok(model)
            }
        }
    }
}

/// One secondary-user node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    /// Initial channel
    pub channel: ChannelId,
}

impl NodeConfig {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Scenario run control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Simulated duration in seconds
    pub duration_s: f64,
    /// Payload size of simulated data frames
    pub payload_bytes: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            duration_s: 1.0,
            payload_bytes: 1000,
        }
    }
}

impl ScenarioConfig {
    pub fn duration(&self) -> SimTime {
        SimTime::from_secs_f64(self.duration_s)
    }
}

/// Complete configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitiveConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub spectrum: SpectrumConfig,
    #[serde(default)]
    pub sensing: SensingConfig,
    pub manager: ManagerConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub pu_model: PuModelConfig,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub scenario: ScenarioConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl CognitiveConfig {
    /// Config with default sections around the mandatory manager section.
    pub fn new(manager: ManagerConfig) -> Self {
        Self {
            version: default_version(),
            spectrum: SpectrumConfig::default(),
            sensing: SensingConfig::default(),
            manager,
            decision: DecisionConfig::default(),
            pu_model: PuModelConfig::default(),
            nodes: Vec::new(),
            scenario: ScenarioConfig::default(),
            logging: LogConfig::default(),
        }
    }

    /// Load configuration from the default search path.
    ///
    /// Search order:
    /// 1. `COGRADIO_CONFIG` environment variable
    /// 2. `./cogradio.yaml`
    /// 3. `~/.config/cogradio/config.yaml`
    /// 4. `/etc/cogradio/config.yaml`
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("COGRADIO_CONFIG") {
            if Path::new(&path).exists() {
                return Self::load_from(Path::new(&path));
            }
        }

        for path in &Self::config_search_paths() {
            if path.exists() {
                return Self::load_from(path);
            }
        }

        Err(ConfigError::NotFound(
            "no cogradio.yaml in the search path".to_string(),
        ))
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))
    }

    /// Get configuration search paths.
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./cogradio.yaml")];

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "cogradio") {
            paths.push(config_dir.config_dir().join("config.yaml"));
        }

        paths.push(PathBuf::from("/etc/cogradio/config.yaml"));

        paths
    }

    pub fn num_channels(&self) -> usize {
        self.spectrum.channels.len()
    }

    /// Build the channel table.
    pub fn spectrum_data(&self) -> Result<SpectrumData, CognitiveError> {
        SpectrumData::new(self.spectrum.channels.clone())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        self.spectrum_data()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        let num_channels = self.num_channels();

        for (name, p) in [
            ("detection_probability", self.sensing.detection_probability),
            ("false_alarm_probability", self.sensing.false_alarm_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return invalid(format!("{} must be within [0, 1]", name));
            }
        }

        self.manager.validate()?;

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id) {
                return invalid(format!("duplicate node id {}", node.id));
            }
            if node.channel as usize >= num_channels {
                return invalid(format!(
                    "node {}: channel {} out of range (num_channels = {})",
                    node.id, node.channel, num_channels
                ));
            }
        }

        match &self.pu_model {
            PuModelConfig::Trace { path } if path.as_os_str().is_empty() => {
                return invalid("pu_model.path must not be empty".to_string());
            }
            PuModelConfig::Synthetic {
                horizon_s, sources, ..
            } => {
                if !(horizon_s.is_finite() && *horizon_s >= 0.0) {
                    return invalid("pu_model.horizon_s must be >= 0".to_string());
                }
                if let Some(s) = sources.iter().find(|s| s.channel as usize >= num_channels) {
                    return invalid(format!(
                        "PU source {}: channel {} out of range",
                        s.id, s.channel
                    ));
                }
            }
            _ => {}
        }

        if !(self.scenario.duration_s.is_finite() && self.scenario.duration_s >= 0.0) {
            return invalid("scenario.duration_s must be >= 0".to_string());
        }

        Ok(())
    }

    /// Generate example configuration YAML.
    pub fn example_yaml() -> String {
        let mut config = Self::new(ManagerConfig::new(
            SimTime::from_millis(10),
            SimTime::from_millis(50),
            RetryPolicy::new(4, BusyAction::Handoff),
        ));
        config.pu_model = PuModelConfig::Synthetic {
            seed: 7,
            horizon_s: 10.0,
            sources: vec![SyntheticSourceSpec {
                id: 0,
                x: 0.0,
                y: 0.0,
                radius: 500.0,
                interference_dbm: -60.0,
                channel: 1,
                alpha: 0.5,
                beta: 1.5,
            }],
        };
        config.nodes = vec![
            NodeConfig { id: 0, x: 10.0, y: 0.0, channel: 1 },
            NodeConfig { id: 1, x: -10.0, y: 5.0, channel: 6 },
        ];

        serde_yaml::to_string(&config).unwrap_or_default()
    }
}
