//! # Cognitive Radio Decision Core
//!
//! Building blocks for dynamic spectrum access by secondary users (SUs)
//! sharing channels with licensed primary users (PUs).
//!
//! ## Overview
//!
//! At every transmission opportunity a secondary interface decides whether
//! its channel is free of primary-user activity and, if it is not, where to
//! move. This crate provides:
//!
//! - **PU models**: trace-driven maps and synthetic ON/OFF sources
//! - **Spectrum sensing**: ground truth perturbed by detection probability
//! - **Spectrum decision**: switch trigger and best-channel selection
//! - **Repository**: shared per-node channel ledger
//! - **Packet tags**: channel and packet-class tags
//! - **Event scheduler**: virtual clock with cancellable timers
//!
//! ## Cycle
//!
//! ```text
//! Idle → Sensing ──free──► Transmitting → Idle
//!           │
//!           └──busy──► DecideSpectrum → Handoff → Idle
//! ```
//!
//! The state machine that drives the cycle lives in `cogradio-sim`.
//!
//! ## Example
//!
//! ```rust
//! use cogradio_core::prelude::*;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let mut model = TraceDrivenPuModel::new(4);
//! let mut pu = PuActivity::new(0, Position::new(0.0, 0.0), 100.0, -60.0, 2);
//! pu.push_interval(SimTime::ZERO, SimTime::from_millis(5)).unwrap();
//! model.add_source(pu).unwrap();
//! let model: SharedPuModel = Rc::new(RefCell::new(model));
//!
//! let mut sensing = SpectrumSensing::new(model, 1.0, 42, 0).unwrap();
//! let free = sensing
//!     .get_sense_results_future(0, SimTime::from_millis(10), SimTime::ZERO, 2, SimTime::ZERO)
//!     .unwrap();
//! assert!(!free);
//!
//! let spectrum = Rc::new(SpectrumData::uniform(4, 20.0e6, 0.0).unwrap());
//! let mut decision = SpectrumDecision::new(spectrum, TieBreak::LowestIndex);
//! let repo = Repository::new(4);
//! assert_eq!(decision.decide_spectrum(2, &repo, 0).unwrap(), 0);
//! ```

pub mod config;
pub mod decision;
pub mod error;
pub mod observe;
pub mod pu_model;
pub mod repository;
pub mod scheduler;
pub mod sensing;
pub mod spectrum_data;
pub mod tags;
pub mod time;
pub mod types;

pub use config::{BusyAction, CognitiveConfig, ConfigError, ManagerConfig, RetryPolicy};
pub use decision::{SpectrumDecision, TieBreak};
pub use error::{CognitiveError, CognitiveResult};
pub use pu_model::{PuActivity, PuModel, SharedPuModel, SyntheticPuModel, TraceDrivenPuModel};
pub use repository::{Repository, SharedRepository};
pub use scheduler::{EventId, EventScheduler};
pub use sensing::{SenseOutcome, SpectrumSensing};
pub use spectrum_data::{SpectrumData, SpectrumEntry};
pub use tags::{ChannelTag, PacketTag, PacketTypeTag, TaggedPacket};
pub use time::SimTime;
pub use types::{ChannelId, NodeId, Position};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::decision::{SpectrumDecision, TieBreak};
    pub use crate::error::{CognitiveError, CognitiveResult};
    pub use crate::pu_model::{PuActivity, PuModel, SharedPuModel, TraceDrivenPuModel};
    pub use crate::repository::{Repository, SharedRepository};
    pub use crate::scheduler::{EventId, EventScheduler};
    pub use crate::sensing::SpectrumSensing;
    pub use crate::spectrum_data::{SpectrumData, SpectrumEntry};
    pub use crate::time::SimTime;
    pub use crate::types::{ChannelId, NodeId, Position};
}
