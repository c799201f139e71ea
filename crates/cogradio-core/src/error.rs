//! Error types for the decision core

use std::io;
use thiserror::Error;

use crate::time::SimTime;
use crate::types::{ChannelId, NodeId};

/// Result type for cognitive-radio operations
pub type CognitiveResult<T> = Result<T, CognitiveError>;

/// Errors raised by the decision core.
///
/// Transient conditions ("channel busy", "no better channel") are never
/// errors; they come back as ordinary values.
#[derive(Error, Debug)]
pub enum CognitiveError {
    /// Channel index outside `[0, num_channels)`
    #[error("channel {channel} out of range (num_channels = {num_channels})")]
    ChannelOutOfRange { channel: ChannelId, num_channels: usize },

    /// Probability parameter outside `[0, 1]`
    #[error("{name} must be within [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },

    /// PU map file could not be parsed or failed validation
    #[error("malformed PU map: {0}")]
    MalformedPuMap(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure while loading an external file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation not allowed from the current manager state
    #[error("node {node}: cannot {operation} while {state}")]
    InvalidTransition {
        node: NodeId,
        operation: &'static str,
        state: &'static str,
    },

    /// Repository write older than the latest recorded write
    #[error("non-monotonic repository update at {attempted} (latest {latest})")]
    NonMonotonicUpdate { attempted: SimTime, latest: SimTime },

    /// Node has no repository entry
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Tag bytes could not be decoded
    #[error("malformed tag: {0}")]
    MalformedTag(String),
}

impl CognitiveError {
    /// Whether the error stems from setup rather than runtime behaviour
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CognitiveError::ChannelOutOfRange { .. }
                | CognitiveError::InvalidProbability { .. }
                | CognitiveError::MalformedPuMap(_)
                | CognitiveError::Config(_)
                | CognitiveError::Io(_)
        )
    }
}

/// Validate a channel index against the channel count.
pub fn check_channel(channel: ChannelId, num_channels: usize) -> CognitiveResult<()> {
    if (channel as usize) < num_channels {
        Ok(())
    } else {
        Err(CognitiveError::ChannelOutOfRange { channel, num_channels })
    }
}

/// Validate a probability parameter.
pub fn check_probability(name: &'static str, value: f64) -> CognitiveResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CognitiveError::InvalidProbability { name, value })
    }
}
