//! Shared channel ledger
//!
//! Records, per secondary-user node, the channel it receives on and the
//! history of its transmissions, so nodes can steer clear of each other.
//!
//! There is no global instance: callers create one and hand a
//! [`SharedRepository`] to every manager that should see it. All access
//! happens on the single scheduling thread, and ordering between nodes is
//! provided by the event queue rather than by the ledger itself.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::{check_channel, CognitiveError, CognitiveResult};
use crate::time::SimTime;
use crate::types::{ChannelId, NodeId};

/// Shared handle injected into each spectrum manager
pub type SharedRepository = Rc<RefCell<Repository>>;

/// Receive-channel assignment of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryEntryRecv {
    pub channel: ChannelId,
}

/// Transmit history of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryEntrySend {
    /// A transmission is in progress
    pub active: bool,
    /// Start time of the latest transmission
    pub last_tx_time: SimTime,
    /// Channel of the latest transmission
    pub channel: ChannelId,
}

/// Per-node channel ledger.
#[derive(Debug, Clone)]
pub struct Repository {
    num_channels: usize,
    recv: BTreeMap<NodeId, RepositoryEntryRecv>,
    send: BTreeMap<NodeId, RepositoryEntrySend>,
    /// Latest timestamp written; writes never go backwards
    last_update: SimTime,
}

impl Repository {
    pub fn new(num_channels: usize) -> Self {
        Self {
            num_channels,
            recv: BTreeMap::new(),
            send: BTreeMap::new(),
            last_update: SimTime::ZERO,
        }
    }

    /// Wrap a new repository in a shared handle.
    pub fn shared(num_channels: usize) -> SharedRepository {
        Rc::new(RefCell::new(Self::new(num_channels)))
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn last_update(&self) -> SimTime {
        self.last_update
    }

    fn advance(&mut self, time: SimTime) -> CognitiveResult<()> {
        if time < self.last_update {
            return Err(CognitiveError::NonMonotonicUpdate {
                attempted: time,
                latest: self.last_update,
            });
        }
        self.last_update = time;
        Ok(())
    }

    /// Assign the receive channel of `node`, replacing any previous one.
    pub fn set_rx_channel(&mut self, node: NodeId, channel: ChannelId) -> CognitiveResult<()> {
        check_channel(channel, self.num_channels)?;
        self.recv.insert(node, RepositoryEntryRecv { channel });
        Ok(())
    }

    pub fn get_rx_channel(&self, node: NodeId) -> Option<ChannelId> {
        self.recv.get(&node).map(|e| e.channel)
    }

    /// Record that `node` started transmitting on `channel` at `time`.
    pub fn update_tx_channel(
        &mut self,
        node: NodeId,
        channel: ChannelId,
        time: SimTime,
    ) -> CognitiveResult<()> {
        check_channel(channel, self.num_channels)?;
        self.advance(time)?;
        self.send.insert(
            node,
            RepositoryEntrySend {
                active: true,
                last_tx_time: time,
                channel,
            },
        );
        Ok(())
    }

    /// Record that the current transmission of `node` finished at `time`.
    pub fn end_tx(&mut self, node: NodeId, time: SimTime) -> CognitiveResult<()> {
        if !self.send.contains_key(&node) {
            return Err(CognitiveError::UnknownNode(node));
        }
        self.advance(time)?;
        if let Some(entry) = self.send.get_mut(&node) {
            entry.active = false;
        }
        Ok(())
    }

    pub fn tx_entry(&self, node: NodeId) -> Option<&RepositoryEntrySend> {
        self.send.get(&node)
    }

    /// Whether some node other than `node` receives on, or is actively
    /// transmitting on, `channel`.
    pub fn is_occupied_by_other(&self, channel: ChannelId, node: NodeId) -> bool {
        let receiving = self
            .recv
            .iter()
            .any(|(&n, e)| n != node && e.channel == channel);
        let sending = self
            .send
            .iter()
            .any(|(&n, e)| n != node && e.active && e.channel == channel);
        receiving || sending
    }

    /// Nodes whose latest transmission on `channel` started within
    /// `[now - window, now]`.
    pub fn recent_transmitters(&self, channel: ChannelId, now: SimTime, window: SimTime) -> Vec<NodeId> {
        let from = now - window;
        self.send
            .iter()
            .filter(|(_, e)| e.channel == channel && e.last_tx_time >= from && e.last_tx_time <= now)
            .map(|(&n, _)| n)
            .collect()
    }

    /// Nodes currently receiving on `channel`, in ascending id order.
    pub fn nodes_on_channel(&self, channel: ChannelId) -> Vec<NodeId> {
        self.recv
            .iter()
            .filter(|(_, e)| e.channel == channel)
            .map(|(&n, _)| n)
            .collect()
    }

    /// Drop every entry of `node`.
    pub fn remove_node(&mut self, node: NodeId) {
        self.recv.remove(&node);
        self.send.remove(&node);
    }
}
