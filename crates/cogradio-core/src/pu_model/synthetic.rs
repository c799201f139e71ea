//! Synthetic PU model
//!
//! Each source alternates OFF and ON periods drawn from exponential
//! distributions (mean ON `alpha`, mean OFF `beta`, both in seconds) up to a
//! horizon. Every source draws from its own `StdRng` derived from the model
//! seed and the source id, so schedules are reproducible and independent of
//! source ordering.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};

use super::{PuActivity, PuModel};
use crate::error::{check_channel, CognitiveError, CognitiveResult};
use crate::time::SimTime;
use crate::types::{ChannelId, Position, MAX_PU_DATA_ENTRY};

/// Parameters of one synthetic source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticSourceSpec {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub interference_dbm: f64,
    pub channel: ChannelId,
    /// Mean ON duration in seconds
    pub alpha: f64,
    /// Mean OFF duration in seconds
    pub beta: f64,
}

/// PU model with generated exponential ON/OFF schedules.
#[derive(Debug, Clone)]
pub struct SyntheticPuModel {
    num_channels: usize,
    seed: u64,
    horizon: SimTime,
    interference_threshold_dbm: Option<f64>,
    sources: Vec<PuActivity>,
}

impl SyntheticPuModel {
    /// Generate schedules for every source over `[0, horizon)`.
    pub fn generate(
        num_channels: usize,
        specs: &[SyntheticSourceSpec],
        horizon: SimTime,
        seed: u64,
    ) -> CognitiveResult<Self> {
        let sources = specs
            .iter()
            .map(|spec| generate_source(spec, num_channels, horizon, seed))
            .collect::<CognitiveResult<Vec<_>>>()?;

        tracing::debug!(
            sources = sources.len(),
            horizon = %horizon,
            seed,
            "generated synthetic PU schedules"
        );

        Ok(Self {
            num_channels,
            seed,
            horizon,
            interference_threshold_dbm: None,
            sources,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn horizon(&self) -> SimTime {
        self.horizon
    }

    pub fn set_interference_threshold_dbm(&mut self, threshold: Option<f64>) {
        self.interference_threshold_dbm = threshold;
    }
}

fn source_seed(seed: u64, id: u32) -> u64 {
    seed ^ (id as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn exp_dist(mean_secs: f64, what: &str, id: u32) -> CognitiveResult<Exp<f64>> {
    if !(mean_secs.is_finite() && mean_secs > 0.0) {
        return Err(CognitiveError::Config(format!(
            "synthetic source {}: {} must be positive, got {}",
            id, what, mean_secs
        )));
    }
    Exp::new(1.0 / mean_secs)
        .map_err(|e| CognitiveError::Config(format!("synthetic source {}: {}", id, e)))
}

fn generate_source(
    spec: &SyntheticSourceSpec,
    num_channels: usize,
    horizon: SimTime,
    seed: u64,
) -> CognitiveResult<PuActivity> {
    check_channel(spec.channel, num_channels)?;
    let on = exp_dist(spec.alpha, "alpha", spec.id)?;
    let off = exp_dist(spec.beta, "beta", spec.id)?;
    let mut rng = StdRng::seed_from_u64(source_seed(seed, spec.id));

    let mut source = PuActivity::new(
        spec.id,
        Position::new(spec.x, spec.y),
        spec.radius,
        spec.interference_dbm,
        spec.channel,
    );

    let mut t = SimTime::ZERO;
    while t < horizon && source.intervals().len() < MAX_PU_DATA_ENTRY {
        let arrival = t + SimTime::from_secs_f64(off.sample(&mut rng));
        if arrival >= horizon {
            break;
        }
        // at least one tick long so the period is never empty
        let on_time = SimTime::from_secs_f64(on.sample(&mut rng)).max(SimTime::from_nanos(1));
        let departure = (arrival + on_time).min(horizon);
        if departure <= arrival {
            break;
        }
        source.push_interval(arrival, departure)?;
        t = departure;
    }
    Ok(source)
}

impl PuModel for SyntheticPuModel {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn num_channels(&self) -> usize {
        self.num_channels
    }

    fn epoch(&self) -> SimTime {
        SimTime::ZERO
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
