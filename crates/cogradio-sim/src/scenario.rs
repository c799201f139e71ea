//! Multi-node scenario runner
//!
//! Builds one [`SpectrumManager`] per configured node around a shared
//! repository, PU model and [`SimulatedMac`], then runs them on a single
//! virtual clock and summarizes what happened.
//!
//! ```rust,no_run
//! use cogradio_core::config::CognitiveConfig;
//! use cogradio_sim::scenario::Scenario;
//!
//! let config = CognitiveConfig::parse(&CognitiveConfig::example_yaml()).unwrap();
//! let mut scenario = Scenario::from_config(&config).unwrap();
//! let report = scenario.run().unwrap();
//! println!("{}", report.to_yaml().unwrap());
//! ```

use serde::Serialize;
use std::path::Path;
use std::rc::Rc;

use cogradio_core::config::CognitiveConfig;
use cogradio_core::error::{CognitiveError, CognitiveResult};
use cogradio_core::pu_model::SharedPuModel;
use cogradio_core::repository::{Repository, SharedRepository};
use cogradio_core::scheduler::{EventScheduler, SchedulerStats};
use cogradio_core::sensing::stream_seed;
use cogradio_core::{ChannelId, NodeId, SimTime, SpectrumDecision, SpectrumSensing, TieBreak};

use crate::mac::SimulatedMac;
use crate::manager::{ManagerState, ManagerStats, SpectrumManager};

/// Outcome for one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub node: NodeId,
    pub final_channel: ChannelId,
    pub final_state: ManagerState,
    #[serde(flatten)]
    pub stats: ManagerStats,
}

/// Summary of a scenario run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub duration: SimTime,
    pub nodes: Vec<NodeReport>,
    pub data_frames: u64,
    pub ctrl_frames: u64,
    /// PU activity periods detected by at least one sensing attempt
    pub pu_periods_detected: usize,
    pub scheduler: SchedulerStats,
}

impl ScenarioReport {
    /// Counters summed over all nodes.
    pub fn totals(&self) -> ManagerStats {
        self.nodes.iter().fold(ManagerStats::default(), |mut acc, n| {
            acc.senses += n.stats.senses;
            acc.busy_verdicts += n.stats.busy_verdicts;
            acc.transmissions += n.stats.transmissions;
            acc.handoffs += n.stats.handoffs;
            acc.collisions += n.stats.collisions;
            acc.prolonged_unavailability += n.stats.prolonged_unavailability;
            acc
        })
    }

    pub fn node(&self, node: NodeId) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.node == node)
    }

    pub fn to_yaml(&self) -> CognitiveResult<String> {
        serde_yaml::to_string(self).map_err(|e| CognitiveError::Config(e.to_string()))
    }
}

/// A configured set of managers on one virtual clock.
pub struct Scenario {
    scheduler: EventScheduler,
    managers: Vec<SpectrumManager>,
    repository: SharedRepository,
    pu_model: SharedPuModel,
    mac: Rc<SimulatedMac>,
    duration: SimTime,
    started: bool,
}

impl Scenario {
    /// Build a scenario. Relative trace paths resolve against the
    /// current directory.
    pub fn from_config(config: &CognitiveConfig) -> CognitiveResult<Self> {
        Self::from_config_in(config, None)
    }

    /// Load a configuration file; relative trace paths resolve against
    /// the file's directory.
    pub fn load(path: &Path) -> CognitiveResult<Self> {
        let config = CognitiveConfig::load_from(path)?;
        Self::from_config_in(&config, path.parent())
    }

    pub fn from_config_in(config: &CognitiveConfig, base_dir: Option<&Path>) -> CognitiveResult<Self> {
        config.validate()?;
        let spectrum = Rc::new(config.spectrum_data()?);
        let num_channels = spectrum.num_channels();
        let pu_model = config.pu_model.build(num_channels, base_dir)?;
        let repository = Repository::shared(num_channels);
        let mac = Rc::new(SimulatedMac::new(
            config.manager.inter_frame_gap(),
            config.scenario.payload_bytes,
        ));

        let mut managers = Vec::with_capacity(config.nodes.len());
        for node in &config.nodes {
            let stream = u64::from(node.id);
            let sensing = SpectrumSensing::with_false_alarm(
                pu_model.clone(),
                config.sensing.detection_probability,
                config.sensing.false_alarm_probability,
                config.sensing.seed,
                stream,
            )?;
            // each node breaks ties on its own stream
            let tie_break = match config.decision.tie_break {
                TieBreak::Seeded { seed } => TieBreak::Seeded {
                    seed: stream_seed(seed, stream),
                },
                other => other,
            };
            let decision = SpectrumDecision::new(spectrum.clone(), tie_break);
            let manager = SpectrumManager::new(
                node.id,
                node.position(),
                node.channel,
                &config.manager,
                sensing,
                decision,
                repository.clone(),
            )?;
            manager.set_mac_listener(mac.clone());
            managers.push(manager);
        }

        let duration = config.scenario.duration();
        tracing::info!(
            nodes = managers.len(),
            channels = num_channels,
            pu_model = pu_model.borrow().name(),
            pu_sources = pu_model.borrow().sources().len(),
            duration = %duration,
            "scenario built"
        );

        Ok(Self {
            scheduler: EventScheduler::new(),
            managers,
            repository,
            pu_model,
            mac,
            duration,
            started: false,
        })
    }

    pub fn managers(&self) -> &[SpectrumManager] {
        &self.managers
    }

    pub fn repository(&self) -> &SharedRepository {
        &self.repository
    }

    pub fn pu_model(&self) -> &SharedPuModel {
        &self.pu_model
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    /// Start every manager at the current time, then advance the clock to
    /// the configured duration.
    pub fn run(&mut self) -> CognitiveResult<ScenarioReport> {
        if !self.started {
            for manager in &self.managers {
                manager.start(&mut self.scheduler)?;
            }
            self.started = true;
        }
        self.scheduler.run_until(self.duration);
        let report = self.report();
        let totals = report.totals();
        tracing::info!(
            time = %self.scheduler.now(),
            transmissions = totals.transmissions,
            handoffs = totals.handoffs,
            collisions = totals.collisions,
            prolonged = totals.prolonged_unavailability,
            "scenario finished"
        );
        Ok(report)
    }

    /// Snapshot of the current counters.
    pub fn report(&self) -> ScenarioReport {
        let counters = self.mac.counters();
        ScenarioReport {
            duration: self.scheduler.now(),
            nodes: self
                .managers
                .iter()
                .map(|m| NodeReport {
                    node: m.node(),
                    final_channel: m.channel(),
                    final_state: m.state(),
                    stats: m.stats(),
                })
                .collect(),
            data_frames: counters.data_frames,
            ctrl_frames: counters.ctrl_frames,
            pu_periods_detected: self.pu_model.borrow().detected_count(),
            scheduler: self.scheduler.stats(),
        }
    }
}
