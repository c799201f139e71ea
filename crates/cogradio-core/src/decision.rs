//! Spectrum decision: whether to leave the current channel and where to go.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::rc::Rc;

use crate::error::{check_channel, CognitiveResult};
use crate::repository::Repository;
use crate::spectrum_data::{SpectrumData, SpectrumEntry};
use crate::types::{ChannelId, NodeId};

/// How to pick among channels with identical PER and bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TieBreak {
    /// Lowest channel index wins
    LowestIndex,
    /// Highest channel index wins
    HighestIndex,
    /// Deterministic pseudo-random pick from a seeded stream
    Seeded { seed: u64 },
}

impl Default for TieBreak {
    fn default() -> Self {
        TieBreak::LowestIndex
    }
}

/// Lower PER first, then higher bandwidth.
fn quality_order(a: &SpectrumEntry, b: &SpectrumEntry) -> Ordering {
    a.packet_error_rate
        .total_cmp(&b.packet_error_rate)
        .then_with(|| b.bandwidth_hz.total_cmp(&a.bandwidth_hz))
}

/// Per-interface decision state.
#[derive(Debug)]
pub struct SpectrumDecision {
    spectrum: Rc<SpectrumData>,
    tie_break: TieBreak,
    rng: Option<StdRng>,
    last_sense_available: Option<bool>,
    interference_detected: bool,
}

impl SpectrumDecision {
    pub fn new(spectrum: Rc<SpectrumData>, tie_break: TieBreak) -> Self {
        let rng = match tie_break {
            TieBreak::Seeded { seed } => Some(StdRng::seed_from_u64(seed)),
            _ => None,
        };
        Self {
            spectrum,
            tie_break,
            rng,
            last_sense_available: None,
            interference_detected: false,
        }
    }

    pub fn spectrum(&self) -> &SpectrumData {
        &self.spectrum
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Feed the latest sensing verdict.
    pub fn record_sensing(&mut self, available: bool) {
        self.last_sense_available = Some(available);
    }

    /// Feed the result of a post-transmission interference check.
    pub fn record_interference(&mut self, interfering: bool) {
        self.interference_detected |= interfering;
    }

    /// Clear sensing and interference state once the interface moved.
    pub fn reset_after_switch(&mut self) {
        self.last_sense_available = None;
        self.interference_detected = false;
    }

    /// Whether the current channel must be left.
    ///
    /// True after a busy sensing verdict or once a PU collision was seen
    /// since the last switch.
    pub fn decide_switch(&self) -> bool {
        self.interference_detected || self.last_sense_available == Some(false)
    }

    /// Pick the channel to adopt instead of `current`.
    ///
    /// Excludes `current` and channels the repository shows in use by any
    /// node other than `node`. Returns `current` unchanged when nothing
    /// qualifies.
    pub fn decide_spectrum(
        &mut self,
        current: ChannelId,
        repository: &Repository,
        node: NodeId,
    ) -> CognitiveResult<ChannelId> {
        check_channel(current, self.spectrum.num_channels())?;

        let candidates: Vec<(ChannelId, SpectrumEntry)> = self
            .spectrum
            .iter()
            .filter(|&(ch, _)| ch != current && !repository.is_occupied_by_other(ch, node))
            .map(|(ch, e)| (ch, *e))
            .collect();

        let Some(best) = candidates
            .iter()
            .min_by(|a, b| quality_order(&a.1, &b.1))
            .map(|c| c.1)
        else {
            tracing::debug!(node, current, "no better channel available");
            return Ok(current);
        };

        // iteration order is ascending channel index
        let tied: Vec<ChannelId> = candidates
            .iter()
            .filter(|(_, e)| quality_order(e, &best) == Ordering::Equal)
            .map(|&(ch, _)| ch)
            .collect();

        let chosen = match (self.tie_break, self.rng.as_mut()) {
            (TieBreak::HighestIndex, _) => tied[tied.len() - 1],
            (TieBreak::Seeded { .. }, Some(rng)) => tied[rng.gen_range(0..tied.len())],
            _ => tied[0],
        };

        tracing::debug!(
            node,
            current,
            chosen,
            candidates = candidates.len(),
            tied = tied.len(),
            "spectrum decision"
        );
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::SimTime;

    fn data(entries: &[(f64, f64)]) -> Rc<SpectrumData> {
        Rc::new(
            SpectrumData::new(
                entries
                    .iter()
                    .map(|&(bw, per)| SpectrumEntry::new(bw, per))
                    .collect(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_prefers_lowest_per_then_bandwidth() {
        let spectrum = data(&[(1e6, 0.1), (1e6, 0.01), (2e6, 0.01), (5e6, 0.2)]);
        let mut decision = SpectrumDecision::new(spectrum, TieBreak::LowestIndex);
        let repo = Repository::new(4);
        assert_eq!(decision.decide_spectrum(0, &repo, 0).unwrap(), 2);
        assert_eq!(decision.decide_spectrum(2, &repo, 0).unwrap(), 1);
    }

    #[test]
    fn test_ties_lowest_index() {
        let spectrum = Rc::new(SpectrumData::uniform(6, 1e6, 0.0).unwrap());
        let mut decision = SpectrumDecision::new(spectrum.clone(), TieBreak::LowestIndex);
        let repo = Repository::new(6);
        assert_eq!(decision.decide_spectrum(0, &repo, 0).unwrap(), 1);
        assert_eq!(decision.decide_spectrum(3, &repo, 0).unwrap(), 0);

        let mut high = SpectrumDecision::new(spectrum, TieBreak::HighestIndex);
        assert_eq!(high.decide_spectrum(5, &repo, 0).unwrap(), 4);
    }

    #[test]
    fn test_seeded_tie_break_is_deterministic() {
        let spectrum = Rc::new(SpectrumData::uniform(8, 1e6, 0.0).unwrap());
        let repo = Repository::new(8);
        let picks = |seed| {
            let mut d = SpectrumDecision::new(spectrum.clone(), TieBreak::Seeded { seed });
            (0..20)
                .map(|_| d.decide_spectrum(2, &repo, 0).unwrap())
                .collect::<Vec<_>>()
        };
        let a = picks(5);
        assert_eq!(a, picks(5));
        assert!(a.iter().all(|&c| c != 2 && (c as usize) < 8));
    }

    #[test]
    fn test_skips_channels_used_by_others() {
        let spectrum = Rc::new(SpectrumData::uniform(4, 1e6, 0.0).unwrap());
        let mut decision = SpectrumDecision::new(spectrum, TieBreak::LowestIndex);
        let mut repo = Repository::new(4);
        repo.set_rx_channel(7, 0).unwrap();
        repo.update_tx_channel(8, 1, SimTime::ZERO).unwrap();
        // own entry does not block
        repo.set_rx_channel(1, 2).unwrap();
        assert_eq!(decision.decide_spectrum(3, &repo, 1).unwrap(), 2);
    }

    #[test]
    fn test_no_candidate_returns_current() {
        let spectrum = Rc::new(SpectrumData::uniform(3, 1e6, 0.0).unwrap());
        let mut decision = SpectrumDecision::new(spectrum, TieBreak::LowestIndex);
        let mut repo = Repository::new(3);
        repo.set_rx_channel(10, 0).unwrap();
        repo.set_rx_channel(11, 2).unwrap();
        assert_eq!(decision.decide_spectrum(1, &repo, 0).unwrap(), 1);
    }

    #[test]
    fn test_never_out_of_range() {
        let spectrum = Rc::new(SpectrumData::uniform(5, 1e6, 0.0).unwrap());
        let mut decision = SpectrumDecision::new(spectrum, TieBreak::Seeded { seed: 1 });
        let repo = Repository::new(5);
        for ch in 0..5 {
            let chosen = decision.decide_spectrum(ch, &repo, 0).unwrap();
            assert!((chosen as usize) < 5);
        }
        assert!(decision.decide_spectrum(5, &repo, 0).is_err());
    }

    #[test]
    fn test_decide_switch() {
        let spectrum = Rc::new(SpectrumData::uniform(2, 1e6, 0.0).unwrap());
        let mut decision = SpectrumDecision::new(spectrum, TieBreak::default());
        assert!(!decision.decide_switch());
        decision.record_sensing(true);
        assert!(!decision.decide_switch());
        decision.record_sensing(false);
        assert!(decision.decide_switch());
        decision.reset_after_switch();
        assert!(!decision.decide_switch());
        decision.record_interference(true);
        decision.record_interference(false);
        assert!(decision.decide_switch());
    }

    #[test]
    fn test_tie_break_serde() {
        let tb: TieBreak = serde_yaml::from_str("kind: seeded\nseed: 4").unwrap();
        assert_eq!(tb, TieBreak::Seeded { seed: 4 });
        let tb: TieBreak = serde_yaml::from_str("kind: highest_index").unwrap();
        assert_eq!(tb, TieBreak::HighestIndex);
    }
}
