//! # Cognitive Radio Simulation
//!
//! Drives the decision core on a virtual clock:
//!
//! - [`manager`]: per-interface spectrum manager state machine
//! - [`mac`]: listener seam towards the MAC, plus recording and simulated MACs
//! - [`scenario`]: multi-node runs built from a [`CognitiveConfig`](cogradio_core::CognitiveConfig)
//!
//! ## Example
//!
//! ```rust
//! use cogradio_core::config::{BusyAction, ManagerConfig, RetryPolicy};
//! use cogradio_core::prelude::*;
//! use cogradio_sim::manager::{ManagerState, SpectrumManager};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let pu: SharedPuModel = Rc::new(RefCell::new(TraceDrivenPuModel::new(4)));
//! let spectrum = Rc::new(SpectrumData::uniform(4, 20.0e6, 0.0).unwrap());
//! let config = ManagerConfig::new(
//!     SimTime::from_millis(10),
//!     SimTime::from_millis(20),
//!     RetryPolicy::new(3, BusyAction::Handoff),
//! );
//!
//! let manager = SpectrumManager::new(
//!     0,
//!     Position::new(0.0, 0.0),
//!     2,
//!     &config,
//!     SpectrumSensing::new(pu, 1.0, 42, 0).unwrap(),
//!     SpectrumDecision::new(spectrum, TieBreak::LowestIndex),
//!     Repository::shared(4),
//! )
//! .unwrap();
//!
//! let mut sched = EventScheduler::new();
//! manager.start(&mut sched).unwrap();
//! sched.run_until(SimTime::from_millis(10));
//! assert_eq!(manager.state(), ManagerState::Transmitting);
//! sched.run();
//! assert_eq!(manager.state(), ManagerState::Idle);
//! ```

pub mod mac;
pub mod manager;
pub mod scenario;

pub use mac::{MacEvent, MacListener, RecordingMac, SimulatedMac};
pub use manager::{ManagerState, ManagerStats, SpectrumManager, TransitionCause, TransitionRecord};
pub use scenario::{NodeReport, Scenario, ScenarioReport};
