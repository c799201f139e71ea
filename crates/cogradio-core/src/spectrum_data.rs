//! Per-channel quality metrics used by the spectrum decision.

use serde::{Deserialize, Serialize};

use crate::error::{check_channel, check_probability, CognitiveError, CognitiveResult};
use crate::types::ChannelId;

/// Quality metrics for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumEntry {
    /// Usable bandwidth in Hz
    pub bandwidth_hz: f64,
    /// Packet error rate in `[0, 1]`
    pub packet_error_rate: f64,
}

impl SpectrumEntry {
    pub fn new(bandwidth_hz: f64, packet_error_rate: f64) -> Self {
        Self {
            bandwidth_hz,
            packet_error_rate,
        }
    }
}

/// Read-only table of channel metrics, indexed by channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumData {
    entries: Vec<SpectrumEntry>,
}

impl SpectrumData {
    /// Build from a list of entries; the position in the list is the channel index.
    pub fn new(entries: Vec<SpectrumEntry>) -> CognitiveResult<Self> {
        if entries.is_empty() {
            return Err(CognitiveError::Config("spectrum data needs at least one channel".into()));
        }
        if entries.len() > ChannelId::MAX as usize + 1 {
            return Err(CognitiveError::Config(format!(
                "{} channels exceed the channel id range",
                entries.len()
            )));
        }
        for (ch, e) in entries.iter().enumerate() {
            check_probability("packet_error_rate", e.packet_error_rate)?;
            if !(e.bandwidth_hz.is_finite() && e.bandwidth_hz > 0.0) {
                return Err(CognitiveError::Config(format!(
                    "channel {}: bandwidth must be positive, got {}",
                    ch, e.bandwidth_hz
                )));
            }
        }
        Ok(Self { entries })
    }

    /// `n` identical channels.
    pub fn uniform(n: usize, bandwidth_hz: f64, packet_error_rate: f64) -> CognitiveResult<Self> {
        Self::new(vec![SpectrumEntry::new(bandwidth_hz, packet_error_rate); n])
    }

    pub fn num_channels(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, channel: ChannelId) -> CognitiveResult<&SpectrumEntry> {
        check_channel(channel, self.entries.len())?;
        Ok(&self.entries[channel as usize])
    }

    pub fn bandwidth(&self, channel: ChannelId) -> CognitiveResult<f64> {
        self.entry(channel).map(|e| e.bandwidth_hz)
    }

    pub fn packet_error_rate(&self, channel: ChannelId) -> CognitiveResult<f64> {
        self.entry(channel).map(|e| e.packet_error_rate)
    }

    /// Iterate `(channel, entry)` pairs in channel order.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &SpectrumEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i as ChannelId, e))
    }
}
