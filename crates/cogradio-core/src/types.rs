//! Common identifiers shared across the decision core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Secondary-user node identifier
pub type NodeId = u32;

/// Channel index in `[0, num_channels)`; matches the width of the channel tag
pub type ChannelId = u16;

/// Maximum number of activity intervals stored per primary-user source
pub const MAX_PU_DATA_ENTRY: usize = 5000;

/// Planar node or source position in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in metres.
    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}
