//! Spectrum sensing with imperfect detection
//!
//! One sensing attempt combines the ground truth from the PU model with a
//! Bernoulli draw at the configured detection probability:
//!
//! - channel truly busy: reported busy with probability `p`, missed otherwise
//! - channel truly free: reported busy with the false-alarm probability
//!
//! Draws come from a `StdRng` derived from `(seed, stream)`, so a fixed seed
//! and stream reproduce every verdict. With `p = 1` and no false alarms the
//! verdict always equals ground truth.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Bernoulli, Distribution};

use crate::error::{check_probability, CognitiveError, CognitiveResult};
use crate::pu_model::SharedPuModel;
use crate::time::SimTime;
use crate::types::{ChannelId, NodeId, Position};

/// Outcome of one sensing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenseOutcome {
    /// PU actually active in the window
    pub ground_truth_busy: bool,
    /// What the detector reported
    pub reported_busy: bool,
}

impl SenseOutcome {
    pub fn available(&self) -> bool {
        !self.reported_busy
    }

    pub fn missed_detection(&self) -> bool {
        self.ground_truth_busy && !self.reported_busy
    }

    pub fn false_alarm(&self) -> bool {
        !self.ground_truth_busy && self.reported_busy
    }
}

/// Derive the RNG seed of one stream.
pub fn stream_seed(seed: u64, stream: u64) -> u64 {
    seed.wrapping_mul(0x2545_F491_4F6C_DD1D) ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Per-interface sensing procedure.
pub struct SpectrumSensing {
    pu_model: SharedPuModel,
    position: Position,
    detect: Bernoulli,
    false_alarm: Bernoulli,
    detection_probability: f64,
    false_alarm_probability: f64,
    rng: StdRng,
}

impl SpectrumSensing {
    /// Create a sensing procedure with no false alarms.
    pub fn new(
        pu_model: SharedPuModel,
        detection_probability: f64,
        seed: u64,
        stream: u64,
    ) -> CognitiveResult<Self> {
        Self::with_false_alarm(pu_model, detection_probability, 0.0, seed, stream)
    }

    pub fn with_false_alarm(
        pu_model: SharedPuModel,
        detection_probability: f64,
        false_alarm_probability: f64,
        seed: u64,
        stream: u64,
    ) -> CognitiveResult<Self> {
        Ok(Self {
            pu_model,
            position: Position::default(),
            detect: bernoulli("detection_probability", detection_probability)?,
            false_alarm: bernoulli("false_alarm_probability", false_alarm_probability)?,
            detection_probability,
            false_alarm_probability,
            rng: StdRng::seed_from_u64(stream_seed(seed, stream)),
        })
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn set_pu_model(&mut self, pu_model: SharedPuModel) {
        self.pu_model = pu_model;
    }

    pub fn pu_model(&self) -> &SharedPuModel {
        &self.pu_model
    }

    pub fn set_detection_probability(&mut self, p: f64) -> CognitiveResult<()> {
        self.detect = bernoulli("detection_probability", p)?;
        self.detection_probability = p;
        Ok(())
    }

    pub fn detection_probability(&self) -> f64 {
        self.detection_probability
    }

    pub fn false_alarm_probability(&self) -> f64 {
        self.false_alarm_probability
    }

    /// Sense `channel` over `[start, start + sense_duration + transmit_duration)`.
    ///
    /// Returns the full outcome; [`get_sense_results_future`](Self::get_sense_results_future)
    /// reduces it to the availability flag.
    pub fn sense(
        &mut self,
        node: NodeId,
        sense_duration: SimTime,
        transmit_duration: SimTime,
        channel: ChannelId,
        start: SimTime,
    ) -> CognitiveResult<SenseOutcome> {
        let window = sense_duration + transmit_duration;
        let Position { x, y } = self.position;

        let ground_truth_busy = self
            .pu_model
            .borrow()
            .is_pu_active(start, window, x, y, channel)?;

        let reported_busy = if ground_truth_busy {
            self.detect.sample(&mut self.rng)
        } else {
            self.false_alarm.sample(&mut self.rng)
        };

        if ground_truth_busy && reported_busy {
            let marked = self
                .pu_model
                .borrow_mut()
                .mark_detected(start, window, x, y, channel)?;
            tracing::trace!(node, channel, marked, "PU activity detected");
        }

        let outcome = SenseOutcome {
            ground_truth_busy,
            reported_busy,
        };
        tracing::debug!(
            node,
            channel,
            start = %start,
            window = %window,
            truth_busy = ground_truth_busy,
            reported_busy,
            "sensing complete"
        );
        Ok(outcome)
    }

    /// Whether `channel` is reported free for the entire requested window.
    pub fn get_sense_results_future(
        &mut self,
        node: NodeId,
        sense_duration: SimTime,
        transmit_duration: SimTime,
        channel: ChannelId,
        start: SimTime,
    ) -> CognitiveResult<bool> {
        self.sense(node, sense_duration, transmit_duration, channel, start)
            .map(|o| o.available())
    }
}

fn bernoulli(name: &'static str, p: f64) -> CognitiveResult<Bernoulli> {
    check_probability(name, p)?;
    Bernoulli::new(p).map_err(|_| CognitiveError::InvalidProbability { name, value: p })
}
