//! Primary-user occupancy models
//!
//! A [`PuModel`] answers whether a licensed incumbent occupies a channel at a
//! given place and time, and predicts when it will next be silent. Models are
//! swappable behind the trait; two variants ship here:
//!
//! - [`TraceDrivenPuModel`]: sources and schedules loaded from a PU map file
//! - [`SyntheticPuModel`]: seeded exponential ON/OFF schedules
//!
//! All activity intervals are half-open `[arrival, departure)`. Queries whose
//! start lies before the model epoch report "not active".
//!
//! ## Example
//!
//! ```rust
//! use cogradio_core::pu_model::{PuActivity, PuModel, TraceDrivenPuModel};
//! use cogradio_core::time::SimTime;
//! use cogradio_core::types::Position;
//!
//! let mut model = TraceDrivenPuModel::new(4);
//! let mut src = PuActivity::new(0, Position::new(0.0, 0.0), 100.0, -60.0, 2);
//! src.push_interval(SimTime::ZERO, SimTime::from_millis(10)).unwrap();
//! model.add_source(src).unwrap();
//!
//! assert!(model.is_pu_active(SimTime::from_millis(5), SimTime::ZERO, 10.0, 0.0, 2).unwrap());
//! assert!(!model.is_pu_active(SimTime::from_millis(10), SimTime::ZERO, 10.0, 0.0, 2).unwrap());
//! ```

pub mod synthetic;
pub mod trace;

pub use synthetic::{SyntheticPuModel, SyntheticSourceSpec};
pub use trace::{PuMapFile, PuSourceSpec, TraceDrivenPuModel};

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{check_channel, CognitiveError, CognitiveResult};
use crate::time::SimTime;
use crate::types::{ChannelId, Position, MAX_PU_DATA_ENTRY};

/// Shared handle to a PU model, injected into sensing and managers
pub type SharedPuModel = Rc<RefCell<dyn PuModel>>;

/// One `[arrival, departure)` activity period of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityInterval {
    pub arrival: SimTime,
    pub departure: SimTime,
    /// Set once a sensing attempt has correctly detected this period
    pub detected: bool,
}

impl ActivityInterval {
    /// Whether the period overlaps the query window.
    ///
    /// A zero-length window degenerates to the instant `start`.
    pub fn overlaps(&self, start: SimTime, ts: SimTime) -> bool {
        if ts.is_zero() {
            self.arrival <= start && start < self.departure
        } else {
            self.arrival < start + ts && start < self.departure
        }
    }

    #[inline]
    pub fn contains(&self, t: SimTime) -> bool {
        self.arrival <= t && t < self.departure
    }
}

/// Activity record for one primary-user source.
#[derive(Debug, Clone, PartialEq)]
pub struct PuActivity {
    pub id: u32,
    pub position: Position,
    /// Activity radius in metres
    pub radius: f64,
    /// Interference level at the edge of the radius, in dBm
    pub interference_dbm: f64,
    pub channel: ChannelId,
    intervals: Vec<ActivityInterval>,
}

impl PuActivity {
    pub fn new(
        id: u32,
        position: Position,
        radius: f64,
        interference_dbm: f64,
        channel: ChannelId,
    ) -> Self {
        Self {
            id,
            position,
            radius,
            interference_dbm,
            channel,
            intervals: Vec::new(),
        }
    }

    /// Append an activity period, keeping the list sorted by arrival.
    pub fn push_interval(&mut self, arrival: SimTime, departure: SimTime) -> CognitiveResult<()> {
        if departure <= arrival {
            return Err(CognitiveError::MalformedPuMap(format!(
                "source {}: departure {} not after arrival {}",
                self.id, departure, arrival
            )));
        }
        if self.intervals.len() >= MAX_PU_DATA_ENTRY {
            return Err(CognitiveError::MalformedPuMap(format!(
                "source {}: more than {} activity entries",
                self.id, MAX_PU_DATA_ENTRY
            )));
        }
        let idx = self.intervals.partition_point(|iv| iv.arrival <= arrival);
        self.intervals.insert(
            idx,
            ActivityInterval {
                arrival,
                departure,
                detected: false,
            },
        );
        Ok(())
    }

    pub fn intervals(&self) -> &[ActivityInterval] {
        &self.intervals
    }

    /// Whether `pos` lies within the activity radius.
    pub fn covers(&self, pos: &Position) -> bool {
        self.position.distance_to(pos) <= self.radius
    }

    pub fn active_in(&self, start: SimTime, ts: SimTime) -> bool {
        // sorted by arrival: nothing past the window end can overlap
        let end = start + ts;
        self.intervals
            .iter()
            .take_while(|iv| iv.arrival <= end)
            .any(|iv| iv.overlaps(start, ts))
    }

    fn mark_detected(&mut self, start: SimTime, ts: SimTime) -> usize {
        let mut marked = 0;
        for iv in self.intervals.iter_mut().filter(|iv| iv.overlaps(start, ts)) {
            if !iv.detected {
                iv.detected = true;
                marked += 1;
            }
        }
        marked
    }
}

/// Whether `source` is relevant to a query at `pos` on `channel`.
fn source_affects(
    source: &PuActivity,
    threshold_dbm: Option<f64>,
    pos: &Position,
    channel: ChannelId,
) -> bool {
    source.channel == channel
        && source.covers(pos)
        && threshold_dbm.map_or(true, |th| source.interference_dbm >= th)
}

/// Earliest instant `>= now` not covered by any of the given sources.
fn next_uncovered<'a, I>(now: SimTime, sources: I) -> SimTime
where
    I: Iterator<Item = &'a PuActivity> + Clone,
{
    let mut t = now;
    loop {
        let covering_end = sources
            .clone()
            .flat_map(|s| s.intervals().iter())
            .filter(|iv| iv.contains(t))
            .map(|iv| iv.departure)
            .max();
        match covering_end {
            Some(departure) => t = departure,
            None => return t,
        }
    }
}

/// Primary-user occupancy model.
///
/// Implementors only expose their source list and parameters; the query
/// logic is shared through the provided methods.
pub trait PuModel {
    /// Short model name for logs
    fn name(&self) -> &str;

    /// Number of channels the model was configured for
    fn num_channels(&self) -> usize;

    /// Queries starting before this instant report "not active"
    fn epoch(&self) -> SimTime;

    /// Sources weaker than this level are ignored; `None` keeps all
    fn interference_threshold_dbm(&self) -> Option<f64>;

    fn sources(&self) -> &[PuActivity];

    fn sources_mut(&mut self) -> &mut [PuActivity];

    /// Whether any source covering `(x, y)` on `channel` is active during
    /// `[now, now + ts)` (or at `now` when `ts` is zero).
    fn is_pu_active(
        &self,
        now: SimTime,
        ts: SimTime,
        x: f64,
        y: f64,
        channel: ChannelId,
    ) -> CognitiveResult<bool> {
        check_channel(channel, self.num_channels())?;
        if now < self.epoch() {
            return Ok(false);
        }
        let pos = Position::new(x, y);
        let threshold = self.interference_threshold_dbm();
        Ok(self
            .sources()
            .iter()
            .filter(|s| source_affects(s, threshold, &pos, channel))
            .any(|s| s.active_in(now, ts)))
    }

    /// Location- and channel-independent pre-check.
    ///
    /// When this returns `false`, every `is_pu_active` over the same window
    /// is `false` as well.
    fn check_active(&self, now: SimTime, ts: SimTime) -> bool {
        if now < self.epoch() {
            return false;
        }
        self.sources().iter().any(|s| s.active_in(now, ts))
    }

    /// Earliest instant `>= now` with no activity from any source.
    fn next_off_time(&self, now: SimTime) -> SimTime {
        if now < self.epoch() {
            return now;
        }
        next_uncovered(now, self.sources().iter())
    }

    /// Earliest instant `>= now` with no activity covering `(x, y)` on `channel`.
    fn next_off_time_at(
        &self,
        now: SimTime,
        x: f64,
        y: f64,
        channel: ChannelId,
    ) -> CognitiveResult<SimTime> {
        check_channel(channel, self.num_channels())?;
        if now < self.epoch() {
            return Ok(now);
        }
        let pos = Position::new(x, y);
        let threshold = self.interference_threshold_dbm();
        Ok(next_uncovered(
            now,
            self.sources()
                .iter()
                .filter(move |s| source_affects(s, threshold, &pos, channel)),
        ))
    }

    /// Flag every activity period that a sensing attempt over the window
    /// detected. Returns the number of newly flagged periods.
    fn mark_detected(
        &mut self,
        now: SimTime,
        ts: SimTime,
        x: f64,
        y: f64,
        channel: ChannelId,
    ) -> CognitiveResult<usize> {
        check_channel(channel, self.num_channels())?;
        if now < self.epoch() {
            return Ok(0);
        }
        let pos = Position::new(x, y);
        let threshold = self.interference_threshold_dbm();
        Ok(self
            .sources_mut()
            .iter_mut()
            .filter(|s| source_affects(s, threshold, &pos, channel))
            .map(|s| s.mark_detected(now, ts))
            .sum())
    }

    /// Total number of activity periods flagged as detected
    fn detected_count(&self) -> usize {
        self.sources()
            .iter()
            .flat_map(|s| s.intervals().iter())
            .filter(|iv| iv.detected)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> SimTime {
        SimTime::from_millis(v)
    }

    fn model_with(intervals: &[(u64, u64)]) -> TraceDrivenPuModel {
        let mut model = TraceDrivenPuModel::new(4);
        let mut src = PuActivity::new(7, Position::new(0.0, 0.0), 100.0, -50.0, 1);
        for &(a, d) in intervals {
            src.push_interval(ms(a), ms(d)).unwrap();
        }
        model.add_source(src).unwrap();
        model
    }

    #[test]
    fn test_half_open_interval() {
        let model = model_with(&[(10, 20)]);
        let q = |t| model.is_pu_active(ms(t), SimTime::ZERO, 0.0, 0.0, 1).unwrap();
        assert!(!q(9));
        assert!(q(10));
        assert!(q(19));
        assert!(!q(20));
    }

    #[test]
    fn test_window_overlap() {
        let model = model_with(&[(10, 20)]);
        // [5, 10) ends exactly at arrival
        assert!(!model.is_pu_active(ms(5), ms(5), 0.0, 0.0, 1).unwrap());
        // [5, 11) reaches into the period
        assert!(model.is_pu_active(ms(5), ms(6), 0.0, 0.0, 1).unwrap());
        // starts at departure
        assert!(!model.is_pu_active(ms(20), ms(50), 0.0, 0.0, 1).unwrap());
    }

    #[test]
    fn test_is_pu_active_deterministic() {
        let model = model_with(&[(0, 5), (8, 12)]);
        for t in 0..15 {
            let first = model.is_pu_active(ms(t), ms(1), 3.0, 4.0, 1).unwrap();
            for _ in 0..3 {
                assert_eq!(model.is_pu_active(ms(t), ms(1), 3.0, 4.0, 1).unwrap(), first);
            }
        }
    }

    #[test]
    fn test_outside_radius_or_other_channel() {
        let model = model_with(&[(0, 100)]);
        assert!(!model.is_pu_active(ms(5), SimTime::ZERO, 150.0, 0.0, 1).unwrap());
        assert!(!model.is_pu_active(ms(5), SimTime::ZERO, 0.0, 0.0, 2).unwrap());
        assert!(model.is_pu_active(ms(5), SimTime::ZERO, 100.0, 0.0, 1).unwrap());
    }

    #[test]
    fn test_out_of_range_channel_fails_fast() {
        let model = model_with(&[(0, 100)]);
        let err = model.is_pu_active(ms(5), SimTime::ZERO, 0.0, 0.0, 4).unwrap_err();
        assert!(matches!(err, CognitiveError::ChannelOutOfRange { channel: 4, .. }));
        assert!(model.next_off_time_at(ms(5), 0.0, 0.0, 9).is_err());
    }

    #[test]
    fn test_query_before_epoch_is_not_active() {
        let mut model = model_with(&[(0, 100)]);
        model.set_epoch(ms(50));
        assert!(!model.is_pu_active(ms(10), ms(5), 0.0, 0.0, 1).unwrap());
        assert!(!model.check_active(ms(10), ms(5)));
        assert_eq!(model.next_off_time(ms(10)), ms(10));
        assert!(model.is_pu_active(ms(50), SimTime::ZERO, 0.0, 0.0, 1).unwrap());
    }

    #[test]
    fn test_check_active_is_superset() {
        let model = model_with(&[(10, 20)]);
        assert!(model.check_active(ms(15), SimTime::ZERO));
        assert!(!model.check_active(ms(25), ms(5)));
        // far away: precise query false, pre-check still true
        assert!(!model.is_pu_active(ms(15), SimTime::ZERO, 1e4, 0.0, 1).unwrap());
    }

    #[test]
    fn test_next_off_time_chains_adjacent_periods() {
        let model = model_with(&[(0, 10), (10, 15), (20, 30)]);
        assert_eq!(model.next_off_time(ms(3)), ms(15));
        assert_eq!(model.next_off_time(ms(17)), ms(17));
        assert_eq!(model.next_off_time(ms(20)), ms(30));
        assert_eq!(model.next_off_time_at(ms(3), 0.0, 0.0, 1).unwrap(), ms(15));
        // other channel is idle
        assert_eq!(model.next_off_time_at(ms(3), 0.0, 0.0, 0).unwrap(), ms(3));
    }

    #[test]
    fn test_interference_threshold_filters_weak_sources() {
        let mut model = model_with(&[(0, 10)]);
        model.set_interference_threshold_dbm(Some(-40.0));
        assert!(!model.is_pu_active(ms(1), SimTime::ZERO, 0.0, 0.0, 1).unwrap());
        model.set_interference_threshold_dbm(Some(-60.0));
        assert!(model.is_pu_active(ms(1), SimTime::ZERO, 0.0, 0.0, 1).unwrap());
    }

    #[test]
    fn test_mark_detected() {
        let mut model = model_with(&[(0, 10), (20, 30)]);
        assert_eq!(model.detected_count(), 0);
        assert_eq!(model.mark_detected(ms(5), ms(20), 0.0, 0.0, 1).unwrap(), 2);
        // idempotent per period
        assert_eq!(model.mark_detected(ms(5), ms(20), 0.0, 0.0, 1).unwrap(), 0);
        assert_eq!(model.detected_count(), 2);
    }

    #[test]
    fn test_push_interval_rejects_inverted() {
        let mut src = PuActivity::new(1, Position::default(), 10.0, -70.0, 0);
        assert!(src.push_interval(ms(5), ms(5)).is_err());
        assert!(src.push_interval(ms(6), ms(2)).is_err());
        src.push_interval(ms(30), ms(40)).unwrap();
        src.push_interval(ms(10), ms(20)).unwrap();
        assert_eq!(src.intervals()[0].arrival, ms(10));
    }
}
