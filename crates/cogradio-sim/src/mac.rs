//! MAC seam
//!
//! The spectrum manager reports its decisions to the layer above through
//! [`MacListener`]. Two listeners ship with the crate:
//!
//! - [`RecordingMac`] keeps every notification for later inspection
//! - [`SimulatedMac`] keeps the cycle running: it transmits a tagged data
//!   frame whenever the channel is free, announces channel switches with a
//!   control frame, and restarts sensing an inter-frame gap after each
//!   transmission or switch

use std::cell::{Cell, RefCell};

use cogradio_core::error::CognitiveError;
use cogradio_core::scheduler::EventScheduler;
use cogradio_core::tags::{PacketTypeTag, TaggedPacket};
use cogradio_core::{ChannelId, NodeId, SimTime};

use crate::manager::SpectrumManager;

/// Callbacks from a spectrum manager to its MAC.
///
/// Every method has an empty default so listeners only implement what they
/// care about.
pub trait MacListener {
    /// Sensing found `channel` free; the manager is now transmitting.
    fn on_channel_available(
        &self,
        _sched: &mut EventScheduler,
        _manager: &SpectrumManager,
        _channel: ChannelId,
    ) {
    }

    /// The retry bound was exceeded on `channel`; the manager is idle.
    fn on_prolonged_unavailability(
        &self,
        _sched: &mut EventScheduler,
        _manager: &SpectrumManager,
        _channel: ChannelId,
        _attempts: u32,
    ) {
    }

    /// A primary user was active during the transmission that just ended.
    fn on_pu_collision(
        &self,
        _sched: &mut EventScheduler,
        _manager: &SpectrumManager,
        _channel: ChannelId,
    ) {
    }

    /// The transmit timer expired or the transmission was ended early; the
    /// manager is idle.
    fn on_transmission_ended(
        &self,
        _sched: &mut EventScheduler,
        _manager: &SpectrumManager,
        _channel: ChannelId,
    ) {
    }

    /// A handoff from `from` to `to` completed.
    fn on_channel_switched(
        &self,
        _sched: &mut EventScheduler,
        _manager: &SpectrumManager,
        _from: ChannelId,
        _to: ChannelId,
    ) {
    }

    /// The current phase failed with `error`; the manager is idle.
    fn on_cycle_aborted(
        &self,
        _sched: &mut EventScheduler,
        _manager: &SpectrumManager,
        _error: &CognitiveError,
    ) {
    }
}

/// Notification captured by [`RecordingMac`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacEvent {
    ChannelAvailable {
        node: NodeId,
        channel: ChannelId,
        at: SimTime,
    },
    ProlongedUnavailability {
        node: NodeId,
        channel: ChannelId,
        attempts: u32,
        at: SimTime,
    },
    PuCollision {
        node: NodeId,
        channel: ChannelId,
        at: SimTime,
    },
    TransmissionEnded {
        node: NodeId,
        channel: ChannelId,
        at: SimTime,
    },
    ChannelSwitched {
        node: NodeId,
        from: ChannelId,
        to: ChannelId,
        at: SimTime,
    },
    CycleAborted {
        node: NodeId,
        channel: ChannelId,
        at: SimTime,
    },
}

/// Listener that only records.
#[derive(Debug, Default)]
pub struct RecordingMac {
    events: RefCell<Vec<MacEvent>>,
}

impl RecordingMac {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MacEvent> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    fn push(&self, event: MacEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl MacListener for RecordingMac {
    fn on_channel_available(&self, sched: &mut EventScheduler, manager: &SpectrumManager, channel: ChannelId) {
        self.push(MacEvent::ChannelAvailable {
            node: manager.node(),
            channel,
            at: sched.now(),
        });
    }

    fn on_prolonged_unavailability(
        &self,
        sched: &mut EventScheduler,
        manager: &SpectrumManager,
        channel: ChannelId,
        attempts: u32,
    ) {
        self.push(MacEvent::ProlongedUnavailability {
            node: manager.node(),
            channel,
            attempts,
            at: sched.now(),
        });
    }

    fn on_pu_collision(&self, sched: &mut EventScheduler, manager: &SpectrumManager, channel: ChannelId) {
        self.push(MacEvent::PuCollision {
            node: manager.node(),
            channel,
            at: sched.now(),
        });
    }

    fn on_transmission_ended(&self, sched: &mut EventScheduler, manager: &SpectrumManager, channel: ChannelId) {
        self.push(MacEvent::TransmissionEnded {
            node: manager.node(),
            channel,
            at: sched.now(),
        });
    }

    fn on_cycle_aborted(&self, sched: &mut EventScheduler, manager: &SpectrumManager, _error: &CognitiveError) {
        self.push(MacEvent::CycleAborted {
            node: manager.node(),
            channel: manager.channel(),
            at: sched.now(),
        });
    }

    fn on_channel_switched(
        &self,
        sched: &mut EventScheduler,
        manager: &SpectrumManager,
        from: ChannelId,
        to: ChannelId,
    ) {
        self.push(MacEvent::ChannelSwitched {
            node: manager.node(),
            from,
            to,
            at: sched.now(),
        });
    }
}

/// Frame counters of a [`SimulatedMac`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacCounters {
    pub data_frames: u64,
    pub ctrl_frames: u64,
    /// Tag and payload bytes of every frame sent
    pub bytes: u64,
}

/// MAC that drives managers indefinitely.
///
/// Shared by every manager of a scenario.
#[derive(Debug)]
pub struct SimulatedMac {
    inter_frame_gap: SimTime,
    payload_len: usize,
    counters: Cell<MacCounters>,
}

impl SimulatedMac {
    pub fn new(inter_frame_gap: SimTime, payload_len: usize) -> Self {
        Self {
            inter_frame_gap,
            payload_len,
            counters: Cell::new(MacCounters::default()),
        }
    }

    pub fn counters(&self) -> MacCounters {
        self.counters.get()
    }

    fn send(&self, node: NodeId, channel: ChannelId, kind: PacketTypeTag, payload: Vec<u8>) {
        let frame = TaggedPacket::new(channel, kind, payload);
        match frame.to_bytes() {
            Ok(bytes) => {
                let mut c = self.counters.get();
                match kind {
                    PacketTypeTag::Data => c.data_frames += 1,
                    PacketTypeTag::Ctrl => c.ctrl_frames += 1,
                }
                c.bytes += bytes.len() as u64;
                self.counters.set(c);
                tracing::trace!(node, channel, kind = %kind, len = bytes.len(), "frame sent");
            }
            Err(e) => tracing::warn!(node, channel, error = %e, "could not encode frame"),
        }
    }

    fn restart_after_gap(&self, sched: &mut EventScheduler, manager: &SpectrumManager) {
        let manager = manager.clone();
        sched.schedule(self.inter_frame_gap, move |s| {
            if let Err(e) = manager.start(s) {
                tracing::warn!(node = manager.node(), error = %e, "could not restart sensing");
            }
        });
    }
}

impl MacListener for SimulatedMac {
    fn on_channel_available(&self, _sched: &mut EventScheduler, manager: &SpectrumManager, channel: ChannelId) {
        self.send(
            manager.node(),
            channel,
            PacketTypeTag::Data,
            vec![0u8; self.payload_len],
        );
    }

    fn on_transmission_ended(&self, sched: &mut EventScheduler, manager: &SpectrumManager, _channel: ChannelId) {
        self.restart_after_gap(sched, manager);
    }

    fn on_prolonged_unavailability(
        &self,
        sched: &mut EventScheduler,
        manager: &SpectrumManager,
        _channel: ChannelId,
        _attempts: u32,
    ) {
        self.restart_after_gap(sched, manager);
    }

    fn on_channel_switched(
        &self,
        sched: &mut EventScheduler,
        manager: &SpectrumManager,
        _from: ChannelId,
        to: ChannelId,
    ) {
        // announce the new channel so peers can follow
        self.send(manager.node(), to, PacketTypeTag::Ctrl, to.to_be_bytes().to_vec());
        self.restart_after_gap(sched, manager);
    }
}
