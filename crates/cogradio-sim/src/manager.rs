//! # Spectrum Manager
//!
//! Per-interface state machine driving the sense → decide → (transmit |
//! handoff) cycle on the virtual clock.
//!
//! ```text
//!            start()                 channel free
//!   Idle ───────────────► Sensing ─────────────────► Transmitting
//!    ▲                     │  ▲                          │
//!    │        busy, policy │  │ busy, policy             │ transmit timer
//!    │             handoff │  │ resense                  │ (collision check)
//!    │                     ▼  │                          │
//!    ├──────────────────  Handoff                        │
//!    │   handoff timer                                   │
//!    └───────────────────────────────────────────────────┘
//! ```
//!
//! Sensing, transmission and handoff each complete through a timer the
//! manager posts to the [`EventScheduler`] and owns, so [`cancel`] and
//! [`force_channel`] always reach it. The `*_ended` operations finish the
//! current phase early. Every transition is logged with `tracing` and
//! appended to an in-memory [`TransitionRecord`] log.
//!
//! After more than `max_busy_retries` consecutive busy verdicts the manager
//! reports prolonged unavailability to its [`MacListener`] and goes idle.
//! A phase that fails to complete aborts the cycle: the manager goes idle
//! and the listener hears about it through `on_cycle_aborted`.
//!
//! [`cancel`]: SpectrumManager::cancel
//! [`force_channel`]: SpectrumManager::force_channel

use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use cogradio_core::config::{BusyAction, ManagerConfig, RetryPolicy};
use cogradio_core::error::{check_channel, CognitiveError, CognitiveResult};
use cogradio_core::pu_model::SharedPuModel;
use cogradio_core::repository::SharedRepository;
use cogradio_core::scheduler::{EventId, EventScheduler};
use cogradio_core::{ChannelId, NodeId, Position, SimTime, SpectrumDecision, SpectrumSensing};

use crate::mac::MacListener;

/// Manager state. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ManagerState {
    Idle,
    Sensing,
    Transmitting,
    Handoff,
}

impl ManagerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagerState::Idle => "idle",
            ManagerState::Sensing => "sensing",
            ManagerState::Transmitting => "transmitting",
            ManagerState::Handoff => "handoff",
        }
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionCause {
    Start,
    ChannelFree,
    ChannelBusy,
    Resense,
    RetryExhausted,
    TransmitEnded,
    HandoffEnded,
    Cancelled,
    Forced,
    Aborted,
}

/// One entry of the transition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionRecord {
    pub time: SimTime,
    pub from: ManagerState,
    pub to: ManagerState,
    /// Channel at the time of the transition
    pub channel: ChannelId,
    pub cause: TransitionCause,
}

/// Counters kept by a manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub senses: u64,
    pub busy_verdicts: u64,
    pub transmissions: u64,
    pub handoffs: u64,
    pub collisions: u64,
    pub prolonged_unavailability: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Sense,
    Transmit,
    Handoff,
}

/// Listener notification, delivered after the state borrow is released.
enum Notice {
    Available(ChannelId),
    Prolonged(ChannelId, u32),
    Collision(ChannelId),
    TransmissionEnded(ChannelId),
    Switched(ChannelId, ChannelId),
}

struct ManagerInner {
    node: NodeId,
    position: Position,
    channel: ChannelId,
    state: ManagerState,
    timer: Option<EventId>,
    /// Start of the current sensing window
    sense_start: SimTime,
    consecutive_busy: u32,
    /// Destination of the handoff in progress
    target: Option<ChannelId>,
    channel_available: bool,
    sense_duration: SimTime,
    transmit_duration: SimTime,
    handoff_duration: SimTime,
    retry: RetryPolicy,
    sensing: SpectrumSensing,
    decision: SpectrumDecision,
    pu_model: SharedPuModel,
    repository: SharedRepository,
    listener: Option<Rc<dyn MacListener>>,
    log: Vec<TransitionRecord>,
    stats: ManagerStats,
}

impl ManagerInner {
    fn transition(&mut self, now: SimTime, to: ManagerState, cause: TransitionCause) {
        tracing::debug!(
            node = self.node,
            channel = self.channel,
            time = %now,
            from = %self.state,
            to = %to,
            cause = ?cause,
            "state transition"
        );
        self.log.push(TransitionRecord {
            time: now,
            from: self.state,
            to,
            channel: self.channel,
            cause,
        });
        self.state = to;
    }

    fn invalid(&self, operation: &'static str) -> CognitiveError {
        CognitiveError::InvalidTransition {
            node: self.node,
            operation,
            state: self.state.as_str(),
        }
    }

    /// PU activity on the current channel during `[now - tx_duration, now)`.
    fn pu_interfering(&self, now: SimTime, tx_duration: SimTime) -> CognitiveResult<bool> {
        let from = now - tx_duration;
        self.pu_model.borrow().is_pu_active(
            from,
            now - from,
            self.position.x,
            self.position.y,
            self.channel,
        )
    }
}

/// Fail unless `what` covers the same channels as the spectrum table.
fn check_channel_count(what: &str, num_channels: usize, spectrum_channels: usize) -> CognitiveResult<()> {
    if num_channels != spectrum_channels {
        return Err(CognitiveError::Config(format!(
            "{} has {} channels, spectrum table has {}",
            what, num_channels, spectrum_channels
        )));
    }
    Ok(())
}

/// Handle to one interface's spectrum manager.
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct SpectrumManager {
    inner: Rc<RefCell<ManagerInner>>,
}

impl fmt::Debug for SpectrumManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("SpectrumManager")
            .field("node", &inner.node)
            .field("channel", &inner.channel)
            .field("state", &inner.state)
            .field("consecutive_busy", &inner.consecutive_busy)
            .finish()
    }
}

impl SpectrumManager {
    /// Create an idle manager for `node` on `channel` and register the
    /// channel in the repository.
    pub fn new(
        node: NodeId,
        position: Position,
        channel: ChannelId,
        config: &ManagerConfig,
        mut sensing: SpectrumSensing,
        decision: SpectrumDecision,
        repository: SharedRepository,
    ) -> CognitiveResult<Self> {
        config.validate()?;
        let num_channels = decision.spectrum().num_channels();
        check_channel(channel, num_channels)?;
        check_channel_count("PU model", sensing.pu_model().borrow().num_channels(), num_channels)?;
        check_channel_count("repository", repository.borrow().num_channels(), num_channels)?;
        repository.borrow_mut().set_rx_channel(node, channel)?;
        sensing.set_position(position);
        let pu_model = sensing.pu_model().clone();

        tracing::debug!(node, channel, x = position.x, y = position.y, "spectrum manager created");

        Ok(Self {
            inner: Rc::new(RefCell::new(ManagerInner {
                node,
                position,
                channel,
                state: ManagerState::Idle,
                timer: None,
                sense_start: SimTime::ZERO,
                consecutive_busy: 0,
                target: None,
                channel_available: false,
                sense_duration: config.sense_duration(),
                transmit_duration: config.transmit_duration(),
                handoff_duration: config.handoff_duration(),
                retry: config.retry,
                sensing,
                decision,
                pu_model,
                repository,
                listener: None,
                log: Vec::new(),
                stats: ManagerStats::default(),
            })),
        })
    }

    pub fn set_mac_listener(&self, listener: Rc<dyn MacListener>) {
        self.inner.borrow_mut().listener = Some(listener);
    }

    pub fn node(&self) -> NodeId {
        self.inner.borrow().node
    }

    pub fn position(&self) -> Position {
        self.inner.borrow().position
    }

    pub fn channel(&self) -> ChannelId {
        self.inner.borrow().channel
    }

    pub fn state(&self) -> ManagerState {
        self.inner.borrow().state
    }

    pub fn sense_duration(&self) -> SimTime {
        self.inner.borrow().sense_duration
    }

    pub fn transmit_duration(&self) -> SimTime {
        self.inner.borrow().transmit_duration
    }

    pub fn consecutive_busy(&self) -> u32 {
        self.inner.borrow().consecutive_busy
    }

    pub fn pending_timer(&self) -> Option<EventId> {
        self.inner.borrow().timer
    }

    pub fn stats(&self) -> ManagerStats {
        self.inner.borrow().stats
    }

    pub fn transitions(&self) -> Vec<TransitionRecord> {
        self.inner.borrow().log.clone()
    }

    pub fn repository(&self) -> SharedRepository {
        self.inner.borrow().repository.clone()
    }

    pub fn pu_model(&self) -> SharedPuModel {
        self.inner.borrow().pu_model.clone()
    }

    /// Begin sensing the current channel. Only valid while idle.
    pub fn start(&self, sched: &mut EventScheduler) -> CognitiveResult<()> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if inner.state != ManagerState::Idle {
            return Err(inner.invalid("start"));
        }
        let now = sched.now();
        inner.sense_start = now;
        inner.channel_available = false;
        inner.transition(now, ManagerState::Sensing, TransitionCause::Start);
        let at = now + inner.sense_duration;
        self.arm(inner, sched, at, Timer::Sense);
        Ok(())
    }

    /// Complete sensing now instead of waiting for the sense timer.
    pub fn sense_ended(&self, sched: &mut EventScheduler) -> CognitiveResult<()> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state != ManagerState::Sensing {
                return Err(inner.invalid("end sensing"));
            }
            if let Some(id) = inner.timer.take() {
                sched.cancel(id);
            }
        }
        let result = self.complete_sense(sched);
        self.abort_on_error(sched, result)
    }

    /// End the transmission now instead of waiting for the transmit timer.
    pub fn transmit_ended(&self, sched: &mut EventScheduler) -> CognitiveResult<()> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state != ManagerState::Transmitting {
                return Err(inner.invalid("end transmission"));
            }
            if let Some(id) = inner.timer.take() {
                sched.cancel(id);
            }
        }
        let result = self.complete_transmit(sched);
        self.abort_on_error(sched, result)
    }

    /// Complete the pending handoff now instead of waiting for its timer.
    pub fn handoff_ended(&self, sched: &mut EventScheduler) -> CognitiveResult<()> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state != ManagerState::Handoff {
                return Err(inner.invalid("end handoff"));
            }
            if let Some(id) = inner.timer.take() {
                sched.cancel(id);
            }
        }
        let result = self.complete_handoff(sched);
        self.abort_on_error(sched, result)
    }

    /// End the transmission started after a free verdict, then check
    /// retroactively whether a PU was active during it.
    fn complete_transmit(&self, sched: &mut EventScheduler) -> CognitiveResult<()> {
        let now = sched.now();
        let (listener, collision, channel) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let channel = inner.channel;
            inner.repository.borrow_mut().end_tx(inner.node, now)?;
            inner.channel_available = false;

            let interfering = inner.pu_interfering(now, inner.transmit_duration)?;
            inner.decision.record_interference(interfering);
            inner.transition(now, ManagerState::Idle, TransitionCause::TransmitEnded);

            let collision = if interfering {
                inner.stats.collisions += 1;
                tracing::warn!(node = inner.node, channel, time = %now, "collision with primary user");
                Some(Notice::Collision(channel))
            } else {
                None
            };
            (inner.listener.clone(), collision, channel)
        };
        self.notify(sched, listener.clone(), collision);
        self.notify(sched, listener, Some(Notice::TransmissionEnded(channel)));
        Ok(())
    }

    /// Result of the last sensing attempt, valid while transmitting.
    pub fn is_channel_available(&self) -> bool {
        let inner = self.inner.borrow();
        inner.state == ManagerState::Transmitting && inner.channel_available
    }

    /// Whether a PU was active on the current channel during
    /// `[now - tx_duration, now)`.
    pub fn is_pu_interfering(&self, now: SimTime, tx_duration: SimTime) -> CognitiveResult<bool> {
        self.inner.borrow().pu_interfering(now, tx_duration)
    }

    /// Replace the PU model and detection probability used for sensing.
    pub fn set_pu_model(&self, probability: f64, model: SharedPuModel) -> CognitiveResult<()> {
        let mut inner = self.inner.borrow_mut();
        check_channel_count(
            "PU model",
            model.borrow().num_channels(),
            inner.decision.spectrum().num_channels(),
        )?;
        inner.sensing.set_detection_probability(probability)?;
        inner.sensing.set_pu_model(model.clone());
        inner.pu_model = model;
        Ok(())
    }

    /// Move to another repository, registering the current channel there.
    pub fn set_repository(&self, repository: SharedRepository) -> CognitiveResult<()> {
        let mut inner = self.inner.borrow_mut();
        check_channel_count(
            "repository",
            repository.borrow().num_channels(),
            inner.decision.spectrum().num_channels(),
        )?;
        repository.borrow_mut().set_rx_channel(inner.node, inner.channel)?;
        inner.repository = repository;
        Ok(())
    }

    /// Cancel whatever is in progress and return to idle.
    ///
    /// Returns `false` when the manager was already idle. Calling it again
    /// has no further effect.
    pub fn cancel(&self, sched: &mut EventScheduler) -> bool {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if let Some(id) = inner.timer.take() {
            sched.cancel(id);
        }
        if inner.state == ManagerState::Idle {
            return false;
        }
        let now = sched.now();
        if inner.state == ManagerState::Transmitting {
            if let Err(e) = inner.repository.borrow_mut().end_tx(inner.node, now) {
                tracing::warn!(node = inner.node, error = %e, "could not end cancelled transmission");
            }
        }
        inner.target = None;
        inner.channel_available = false;
        inner.transition(now, ManagerState::Idle, TransitionCause::Cancelled);
        true
    }

    /// Cancel any activity and switch to `channel` immediately.
    pub fn force_channel(&self, sched: &mut EventScheduler, channel: ChannelId) -> CognitiveResult<()> {
        {
            let inner = self.inner.borrow();
            check_channel(channel, inner.decision.spectrum().num_channels())?;
        }
        self.cancel(sched);

        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        inner.repository.borrow_mut().set_rx_channel(inner.node, channel)?;
        let old = inner.channel;
        inner.channel = channel;
        inner.consecutive_busy = 0;
        inner.decision.reset_after_switch();
        inner.transition(sched.now(), ManagerState::Idle, TransitionCause::Forced);
        tracing::info!(node = inner.node, from = old, to = channel, "channel forced");
        Ok(())
    }

    fn arm(&self, inner: &mut ManagerInner, sched: &mut EventScheduler, at: SimTime, timer: Timer) {
        assert!(
            inner.timer.is_none(),
            "node {}: {:?} timer armed while another is pending",
            inner.node,
            timer
        );
        let weak: Weak<RefCell<ManagerInner>> = Rc::downgrade(&self.inner);
        let id = sched.schedule_at(at, move |s| {
            if let Some(inner) = weak.upgrade() {
                SpectrumManager { inner }.on_timer(s, timer);
            }
        });
        inner.timer = Some(id);
    }

    fn on_timer(&self, sched: &mut EventScheduler, timer: Timer) {
        {
            let mut inner = self.inner.borrow_mut();
            assert!(
                inner.timer.take().is_some(),
                "node {}: {:?} timer fired with none pending",
                inner.node,
                timer
            );
            let expected = match timer {
                Timer::Sense => ManagerState::Sensing,
                Timer::Transmit => ManagerState::Transmitting,
                Timer::Handoff => ManagerState::Handoff,
            };
            assert_eq!(
                inner.state, expected,
                "node {}: {:?} timer fired while {}",
                inner.node, timer, inner.state
            );
        }
        let result = match timer {
            Timer::Sense => self.complete_sense(sched),
            Timer::Transmit => self.complete_transmit(sched),
            Timer::Handoff => self.complete_handoff(sched),
        };
        // already reported to the listener
        let _ = self.abort_on_error(sched, result);
    }

    /// Return to idle when a phase failed to complete, so the next `start`
    /// is accepted, and pass the error on.
    fn abort_on_error(&self, sched: &mut EventScheduler, result: CognitiveResult<()>) -> CognitiveResult<()> {
        let Err(error) = result else {
            return Ok(());
        };
        let listener = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let now = sched.now();
            tracing::error!(node = inner.node, channel = inner.channel, state = %inner.state, error = %error, "cycle aborted");
            if let Some(id) = inner.timer.take() {
                sched.cancel(id);
            }
            if inner.state == ManagerState::Transmitting {
                if let Err(e) = inner.repository.borrow_mut().end_tx(inner.node, now) {
                    tracing::warn!(node = inner.node, error = %e, "could not end aborted transmission");
                }
            }
            inner.target = None;
            inner.channel_available = false;
            inner.consecutive_busy = 0;
            if inner.state != ManagerState::Idle {
                inner.transition(now, ManagerState::Idle, TransitionCause::Aborted);
            }
            inner.listener.clone()
        };
        if let Some(listener) = listener {
            listener.on_cycle_aborted(sched, self, &error);
        }
        Err(error)
    }

    fn complete_sense(&self, sched: &mut EventScheduler) -> CognitiveResult<()> {
        let now = sched.now();
        let (listener, notice) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let (node, channel) = (inner.node, inner.channel);

            let available = inner.sensing.get_sense_results_future(
                node,
                inner.sense_duration,
                inner.transmit_duration,
                channel,
                inner.sense_start,
            )?;
            inner.stats.senses += 1;
            inner.decision.record_sensing(available);

            let notice = if !inner.decision.decide_switch() {
                inner.repository.borrow_mut().update_tx_channel(node, channel, now)?;
                inner.consecutive_busy = 0;
                inner.channel_available = true;
                inner.stats.transmissions += 1;
                inner.transition(now, ManagerState::Transmitting, TransitionCause::ChannelFree);
                let at = now + inner.transmit_duration;
                self.arm(inner, sched, at, Timer::Transmit);
                Some(Notice::Available(channel))
            } else {
                inner.stats.busy_verdicts += 1;
                inner.consecutive_busy += 1;
                inner.channel_available = false;
                if inner.consecutive_busy > inner.retry.max_busy_retries {
                    let attempts = inner.consecutive_busy;
                    inner.consecutive_busy = 0;
                    inner.decision.reset_after_switch();
                    inner.stats.prolonged_unavailability += 1;
                    inner.transition(now, ManagerState::Idle, TransitionCause::RetryExhausted);
                    tracing::info!(node, channel, attempts, "channel unavailable for too long");
                    Some(Notice::Prolonged(channel, attempts))
                } else {
                    self.react_to_busy(inner, sched)?;
                    None
                }
            };
            (inner.listener.clone(), notice)
        };
        self.notify(sched, listener, notice);
        Ok(())
    }

    /// Hand off to a better channel, or sense again when the policy says
    /// so or no other channel qualifies.
    fn react_to_busy(&self, inner: &mut ManagerInner, sched: &mut EventScheduler) -> CognitiveResult<()> {
        let now = sched.now();
        let target = match inner.retry.on_busy {
            BusyAction::Handoff => {
                let repository = inner.repository.borrow();
                let chosen = inner
                    .decision
                    .decide_spectrum(inner.channel, &repository, inner.node)?;
                (chosen != inner.channel).then_some(chosen)
            }
            BusyAction::Resense => None,
        };

        match target {
            Some(target) => {
                assert!(
                    inner.target.is_none(),
                    "node {}: handoff started while another is pending",
                    inner.node
                );
                inner.target = Some(target);
                inner.transition(now, ManagerState::Handoff, TransitionCause::ChannelBusy);
                tracing::info!(node = inner.node, from = inner.channel, to = target, "handing off");
                let at = now + inner.handoff_duration;
                self.arm(inner, sched, at, Timer::Handoff);
            }
            None => {
                let Position { x, y } = inner.position;
                let off = inner
                    .pu_model
                    .borrow()
                    .next_off_time_at(now, x, y, inner.channel)?;
                let resume = off.clamp(now, now + inner.sense_duration);
                inner.sense_start = resume;
                inner.transition(now, ManagerState::Sensing, TransitionCause::Resense);
                let at = resume + inner.sense_duration;
                self.arm(inner, sched, at, Timer::Sense);
            }
        }
        Ok(())
    }

    fn complete_handoff(&self, sched: &mut EventScheduler) -> CognitiveResult<()> {
        let now = sched.now();
        let (listener, notice) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let target = match inner.target.take() {
                Some(target) => target,
                None => panic!("node {}: handoff completed without a target", inner.node),
            };
            inner.repository.borrow_mut().set_rx_channel(inner.node, target)?;
            let old = inner.channel;
            inner.channel = target;
            inner.decision.reset_after_switch();
            inner.stats.handoffs += 1;
            inner.transition(now, ManagerState::Idle, TransitionCause::HandoffEnded);
            (inner.listener.clone(), Some(Notice::Switched(old, target)))
        };
        self.notify(sched, listener, notice);
        Ok(())
    }

    fn notify(
        &self,
        sched: &mut EventScheduler,
        listener: Option<Rc<dyn MacListener>>,
        notice: Option<Notice>,
    ) {
        let (Some(listener), Some(notice)) = (listener, notice) else {
            return;
        };
        match notice {
            Notice::Available(channel) => listener.on_channel_available(sched, self, channel),
            Notice::Prolonged(channel, attempts) => {
                listener.on_prolonged_unavailability(sched, self, channel, attempts)
            }
            Notice::Collision(channel) => listener.on_pu_collision(sched, self, channel),
            Notice::TransmissionEnded(channel) => listener.on_transmission_ended(sched, self, channel),
            Notice::Switched(from, to) => listener.on_channel_switched(sched, self, from, to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::{MacEvent, RecordingMac};
    use cogradio_core::pu_model::{PuActivity, TraceDrivenPuModel};
    use cogradio_core::{Repository, SpectrumData, TieBreak};

    const D: u64 = 10;

    fn ms(v: u64) -> SimTime {
        SimTime::from_millis(v)
    }

    struct Fixture {
        manager: SpectrumManager,
        mac: Rc<RecordingMac>,
        repo: SharedRepository,
        sched: EventScheduler,
    }

    /// Node 0 at the origin on channel 2 of 4. One PU at the origin on
    /// channel 2 active during each of `busy`.
    fn fixture(busy: &[(u64, u64)], p: f64, retry: RetryPolicy) -> Fixture {
        let mut model = TraceDrivenPuModel::new(4);
        let mut pu = PuActivity::new(0, Position::new(0.0, 0.0), 100.0, -60.0, 2);
        for &(a, d) in busy {
            pu.push_interval(ms(a), ms(d)).unwrap();
        }
        model.add_source(pu).unwrap();
        let model: SharedPuModel = Rc::new(RefCell::new(model));

        let config = ManagerConfig::new(ms(D), ms(5), retry).with_handoff_duration(ms(2));
        let sensing = SpectrumSensing::new(model, p, 11, 0).unwrap();
        let spectrum = Rc::new(SpectrumData::uniform(4, 20.0e6, 0.0).unwrap());
        let decision = SpectrumDecision::new(spectrum, TieBreak::LowestIndex);
        let repo = Repository::shared(4);
        let manager = SpectrumManager::new(
            0,
            Position::new(0.0, 0.0),
            2,
            &config,
            sensing,
            decision,
            repo.clone(),
        )
        .unwrap();
        let mac = Rc::new(RecordingMac::new());
        manager.set_mac_listener(mac.clone());
        Fixture {
            manager,
            mac,
            repo,
            sched: EventScheduler::new(),
        }
    }

    fn handoff_policy(max: u32) -> RetryPolicy {
        RetryPolicy::new(max, BusyAction::Handoff)
    }

    #[test]
    fn test_busy_channel_triggers_handoff() {
        let mut f = fixture(&[(0, D / 2)], 1.0, handoff_policy(3));
        f.manager.start(&mut f.sched).unwrap();
        assert_eq!(f.manager.state(), ManagerState::Sensing);
        f.sched.run();

        assert_eq!(f.manager.state(), ManagerState::Idle);
        assert_ne!(f.manager.channel(), 2);
        assert_eq!(f.manager.channel(), 0);
        assert_eq!(f.repo.borrow().get_rx_channel(0), Some(0));
        assert_eq!(
            f.mac.events(),
            vec![MacEvent::ChannelSwitched {
                node: 0,
                from: 2,
                to: 0,
                at: ms(D + 2)
            }]
        );

        let causes: Vec<_> = f.manager.transitions().iter().map(|r| r.cause).collect();
        assert_eq!(
            causes,
            vec![TransitionCause::Start, TransitionCause::ChannelBusy, TransitionCause::HandoffEnded]
        );
        assert_eq!(f.manager.stats().handoffs, 1);
    }

    #[test]
    fn test_free_channel_transmits() {
        let mut f = fixture(&[(100, 200)], 1.0, handoff_policy(3));
        f.manager.start(&mut f.sched).unwrap();
        f.sched.run_until(ms(D));

        assert_eq!(f.manager.state(), ManagerState::Transmitting);
        assert!(f.manager.is_channel_available());
        assert!(f.manager.pending_timer().is_some());
        let tx = *f.repo.borrow().tx_entry(0).unwrap();
        assert!(tx.active);
        assert_eq!(tx.last_tx_time, ms(D));
        assert_eq!(
            f.mac.events(),
            vec![MacEvent::ChannelAvailable { node: 0, channel: 2, at: ms(D) }]
        );

        // the transmit timer ends the transmission
        f.sched.run();
        assert_eq!(f.sched.now(), ms(D + 5));
        assert_eq!(f.manager.state(), ManagerState::Idle);
        assert!(!f.manager.is_channel_available());
        assert!(!f.repo.borrow().tx_entry(0).unwrap().active);
        assert_eq!(f.manager.stats().collisions, 0);
        assert_eq!(
            f.mac.events().last(),
            Some(&MacEvent::TransmissionEnded { node: 0, channel: 2, at: ms(D + 5) })
        );
    }

    #[test]
    fn test_transmit_ended_early_cancels_timer() {
        let mut f = fixture(&[], 1.0, handoff_policy(3));
        f.manager.start(&mut f.sched).unwrap();
        f.sched.run_until(ms(D + 2));
        let timer = f.manager.pending_timer().unwrap();

        f.manager.transmit_ended(&mut f.sched).unwrap();
        assert_eq!(f.manager.state(), ManagerState::Idle);
        assert!(!f.sched.is_pending(timer));
        assert_eq!(f.sched.pending(), 0);
        assert!(!f.repo.borrow().tx_entry(0).unwrap().active);
    }

    #[test]
    fn test_cancel_before_sense_timer_fires() {
        let mut f = fixture(&[(0, D / 2)], 1.0, handoff_policy(3));
        f.manager.start(&mut f.sched).unwrap();
        let timer = f.manager.pending_timer().unwrap();

        f.sched.run_until(ms(D / 2));
        assert!(f.manager.cancel(&mut f.sched));
        assert!(!f.manager.cancel(&mut f.sched));
        assert!(!f.sched.is_pending(timer));

        f.sched.run();
        assert_eq!(f.manager.state(), ManagerState::Idle);
        assert_eq!(f.manager.stats().senses, 0);
        assert_eq!(f.sched.stats().events_fired, 0);
        assert!(f.mac.events().is_empty());
        assert_eq!(
            f.manager.transitions().last().map(|r| r.cause),
            Some(TransitionCause::Cancelled)
        );
    }

    #[test]
    fn test_retry_bound_reports_prolonged_unavailability() {
        let mut f = fixture(&[(0, 10_000)], 1.0, RetryPolicy::new(2, BusyAction::Resense));
        f.manager.start(&mut f.sched).unwrap();
        f.sched.run();

        assert_eq!(f.manager.state(), ManagerState::Idle);
        assert_eq!(f.manager.channel(), 2);
        assert_eq!(f.manager.consecutive_busy(), 0);
        // verdicts at 10, 30 and 50 ms: each resense waits one sensing period
        assert_eq!(
            f.mac.events(),
            vec![MacEvent::ProlongedUnavailability {
                node: 0,
                channel: 2,
                attempts: 3,
                at: ms(50)
            }]
        );
        let stats = f.manager.stats();
        assert_eq!(stats.busy_verdicts, 3);
        assert_eq!(stats.prolonged_unavailability, 1);
        assert_eq!(stats.handoffs, 0);
    }

    #[test]
    fn test_resense_waits_for_pu_departure() {
        let mut f = fixture(&[(0, 14)], 1.0, RetryPolicy::new(5, BusyAction::Resense));
        f.manager.start(&mut f.sched).unwrap();
        f.sched.run_until(ms(24));

        // busy at 10 ms; PU leaves at 14 ms, so the next window is [14, 29)
        assert_eq!(f.manager.state(), ManagerState::Transmitting);
        assert_eq!(
            f.mac.events(),
            vec![MacEvent::ChannelAvailable { node: 0, channel: 2, at: ms(24) }]
        );
    }

    #[test]
    fn test_zero_retries_gives_up_on_first_busy() {
        let mut f = fixture(&[(0, D)], 1.0, handoff_policy(0));
        f.manager.start(&mut f.sched).unwrap();
        f.sched.run();
        assert_eq!(f.manager.channel(), 2);
        assert!(matches!(
            f.mac.events().as_slice(),
            [MacEvent::ProlongedUnavailability { attempts: 1, .. }]
        ));
    }

    #[test]
    fn test_collision_detected_after_transmission() {
        // PU appears mid-window; p = 0 misses it
        let mut f = fixture(&[(11, 13)], 0.0, handoff_policy(3));
        f.manager.start(&mut f.sched).unwrap();
        f.sched.run_until(ms(D));
        assert_eq!(f.manager.state(), ManagerState::Transmitting);

        f.sched.run_until(ms(D + 5));
        assert_eq!(f.manager.state(), ManagerState::Idle);
        assert_eq!(f.manager.stats().collisions, 1);
        assert_eq!(
            f.mac.events()[1..],
            [
                MacEvent::PuCollision { node: 0, channel: 2, at: ms(D + 5) },
                MacEvent::TransmissionEnded { node: 0, channel: 2, at: ms(D + 5) },
            ]
        );

        // the recorded collision forces a switch on the next cycle
        f.manager.start(&mut f.sched).unwrap();
        f.sched.run();
        assert_eq!(f.manager.channel(), 0);
        assert_eq!(f.manager.stats().handoffs, 1);
    }

    #[test]
    fn test_is_pu_interfering_looks_back() {
        let f = fixture(&[(20, 30)], 1.0, handoff_policy(3));
        assert!(f.manager.is_pu_interfering(ms(25), ms(5)).unwrap());
        assert!(f.manager.is_pu_interfering(ms(35), ms(10)).unwrap());
        assert!(!f.manager.is_pu_interfering(ms(20), ms(5)).unwrap());
        assert!(!f.manager.is_pu_interfering(ms(40), ms(10)).unwrap());
    }

    #[test]
    fn test_invalid_external_calls() {
        let mut f = fixture(&[], 1.0, handoff_policy(3));
        assert!(matches!(
            f.manager.transmit_ended(&mut f.sched),
            Err(CognitiveError::InvalidTransition { operation: "end transmission", state: "idle", .. })
        ));
        assert!(f.manager.handoff_ended(&mut f.sched).is_err());
        assert!(f.manager.sense_ended(&mut f.sched).is_err());

        f.manager.start(&mut f.sched).unwrap();
        assert!(matches!(
            f.manager.start(&mut f.sched),
            Err(CognitiveError::InvalidTransition { state: "sensing", .. })
        ));
    }

    #[test]
    fn test_sense_ended_early_cancels_timer() {
        let mut f = fixture(&[], 1.0, handoff_policy(3));
        f.manager.start(&mut f.sched).unwrap();
        f.sched.run_until(ms(3));
        f.manager.sense_ended(&mut f.sched).unwrap();
        assert_eq!(f.manager.state(), ManagerState::Transmitting);
        // only the transmit timer is left
        assert_eq!(f.sched.pending(), 1);
        f.sched.run();
        assert_eq!(f.sched.now(), ms(8));
        assert_eq!(f.manager.stats().senses, 1);
        assert_eq!(f.manager.state(), ManagerState::Idle);
    }

    #[test]
    fn test_force_channel() {
        let mut f = fixture(&[], 1.0, handoff_policy(3));
        f.manager.start(&mut f.sched).unwrap();
        f.manager.force_channel(&mut f.sched, 1).unwrap();
        assert_eq!(f.manager.state(), ManagerState::Idle);
        assert_eq!(f.manager.channel(), 1);
        assert_eq!(f.sched.pending(), 0);
        assert_eq!(f.repo.borrow().get_rx_channel(0), Some(1));
        assert!(matches!(
            f.manager.force_channel(&mut f.sched, 4),
            Err(CognitiveError::ChannelOutOfRange { .. })
        ));
    }

    #[test]
    fn test_force_channel_cancels_transmit_timer() {
        let mut f = fixture(&[], 1.0, handoff_policy(3));
        f.manager.start(&mut f.sched).unwrap();
        f.sched.run_until(ms(D + 2));
        assert_eq!(f.manager.state(), ManagerState::Transmitting);
        let stale = f.manager.pending_timer().unwrap();

        f.manager.force_channel(&mut f.sched, 1).unwrap();
        assert!(!f.sched.is_pending(stale));
        assert_eq!(f.sched.pending(), 0);

        // a new cycle on channel 1 keeps its full transmission
        f.manager.start(&mut f.sched).unwrap();
        f.sched.run_until(ms(2 * D + 2));
        assert_eq!(f.manager.state(), ManagerState::Transmitting);
        f.sched.run_until(ms(2 * D + 6));
        assert_eq!(f.manager.state(), ManagerState::Transmitting);
        f.sched.run();
        assert_eq!(f.sched.now(), ms(2 * D + 7));
        assert_eq!(f.manager.state(), ManagerState::Idle);
        assert_eq!(
            f.manager.transitions().last().map(|r| (r.cause, r.channel)),
            Some((TransitionCause::TransmitEnded, 1))
        );
    }

    #[test]
    fn test_channel_count_mismatch_is_rejected() {
        let config = ManagerConfig::new(ms(D), ms(5), handoff_policy(3));
        let spectrum = Rc::new(SpectrumData::uniform(4, 20.0e6, 0.0).unwrap());
        let narrow: SharedPuModel = Rc::new(RefCell::new(TraceDrivenPuModel::new(2)));
        let wide: SharedPuModel = Rc::new(RefCell::new(TraceDrivenPuModel::new(4)));
        let build = |model: SharedPuModel, repo: SharedRepository| {
            SpectrumManager::new(
                0,
                Position::new(0.0, 0.0),
                3,
                &config,
                SpectrumSensing::new(model, 1.0, 0, 0).unwrap(),
                SpectrumDecision::new(spectrum.clone(), TieBreak::LowestIndex),
                repo,
            )
        };

        assert!(matches!(
            build(narrow.clone(), Repository::shared(4)),
            Err(CognitiveError::Config(_))
        ));
        assert!(matches!(
            build(wide.clone(), Repository::shared(6)),
            Err(CognitiveError::Config(_))
        ));

        let manager = build(wide.clone(), Repository::shared(4)).unwrap();
        assert!(matches!(
            manager.set_pu_model(1.0, narrow),
            Err(CognitiveError::Config(_))
        ));
        assert!(Rc::ptr_eq(&manager.pu_model(), &wide));
        let spare = Repository::shared(2);
        assert!(matches!(
            manager.set_repository(spare.clone()),
            Err(CognitiveError::Config(_))
        ));
        assert_eq!(spare.borrow().get_rx_channel(0), None);
    }

    #[test]
    fn test_failed_sense_returns_to_idle() {
        let mut f = fixture(&[], 1.0, handoff_policy(3));
        f.manager.start(&mut f.sched).unwrap();
        // a later write by another node makes the tx record at 10 ms go backwards
        f.repo.borrow_mut().update_tx_channel(7, 0, ms(50)).unwrap();
        f.sched.run();

        assert_eq!(f.manager.state(), ManagerState::Idle);
        assert_eq!(f.manager.pending_timer(), None);
        assert_eq!(
            f.manager.transitions().last().map(|r| r.cause),
            Some(TransitionCause::Aborted)
        );
        assert_eq!(
            f.mac.events(),
            vec![MacEvent::CycleAborted { node: 0, channel: 2, at: ms(D) }]
        );

        // the manager accepts a new cycle
        f.sched.run_until(ms(60));
        f.manager.start(&mut f.sched).unwrap();
        f.sched.run_until(ms(70));
        assert_eq!(f.manager.state(), ManagerState::Transmitting);
    }

    #[test]
    fn test_failed_early_end_reports_error() {
        let mut f = fixture(&[], 1.0, handoff_policy(3));
        f.manager.start(&mut f.sched).unwrap();
        f.sched.run_until(ms(2));
        f.repo.borrow_mut().update_tx_channel(7, 0, ms(50)).unwrap();
        assert!(matches!(
            f.manager.sense_ended(&mut f.sched),
            Err(CognitiveError::NonMonotonicUpdate { .. })
        ));
        assert_eq!(f.manager.state(), ManagerState::Idle);
        assert_eq!(f.sched.pending(), 0);
    }

    #[test]
    fn test_set_pu_model_and_repository() {
        let mut f = fixture(&[], 1.0, handoff_policy(3));

        let mut busy = TraceDrivenPuModel::new(4);
        let mut pu = PuActivity::new(1, Position::new(0.0, 0.0), 50.0, -60.0, 2);
        pu.push_interval(ms(0), ms(1_000)).unwrap();
        busy.add_source(pu).unwrap();
        let busy: SharedPuModel = Rc::new(RefCell::new(busy));
        assert!(f.manager.set_pu_model(1.5, busy.clone()).is_err());
        f.manager.set_pu_model(1.0, busy).unwrap();

        let other = Repository::shared(4);
        f.manager.set_repository(other.clone()).unwrap();
        assert_eq!(other.borrow().get_rx_channel(0), Some(2));

        f.manager.start(&mut f.sched).unwrap();
        f.sched.run();
        assert_eq!(f.manager.channel(), 0);
        assert_eq!(other.borrow().get_rx_channel(0), Some(0));
        assert_eq!(f.repo.borrow().get_rx_channel(0), Some(2));
    }

    #[test]
    fn test_repository_write_invisible_before_it_fires() {
        let mut f = fixture(&[], 1.0, handoff_policy(3));
        let repo = f.repo.clone();
        f.sched.schedule_at(ms(10), move |_| {
            repo.borrow_mut().set_rx_channel(9, 0).unwrap();
        });

        f.sched.run_until(ms(5));
        assert_eq!(f.repo.borrow().get_rx_channel(9), None);
        assert!(!f.repo.borrow().is_occupied_by_other(0, 0));

        f.sched.run_until(ms(10));
        assert_eq!(f.repo.borrow().get_rx_channel(9), Some(0));
        assert!(f.repo.borrow().is_occupied_by_other(0, 0));
    }

    #[test]
    fn test_states_follow_recorded_log() {
        let mut f = fixture(&[(0, D / 2)], 1.0, handoff_policy(3));
        f.manager.start(&mut f.sched).unwrap();
        f.sched.run();
        let log = f.manager.transitions();
        for pair in log.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
            assert!(pair[0].time <= pair[1].time);
        }
        assert_eq!(log.last().map(|r| r.to), Some(f.manager.state()));
    }
}
