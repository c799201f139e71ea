//! # Discrete Event Scheduler
//!
//! Single-threaded virtual-time event queue. Components never block: they
//! post closures with [`EventScheduler::schedule`] and the scheduler runs
//! them in virtual-time order, advancing the clock as it goes.
//!
//! ## Ordering
//!
//! ```text
//!  schedule(delay, f) ──► ┌──────────────────────────────┐
//!                         │ EventQueue (min-heap)        │
//!                         │ key = (time, sequence no.)   │
//!  cancel(id) ──────────► │ cancelled ids never fire     │
//!                         └──────────────┬───────────────┘
//!                                        ▼
//!                               now := event.time
//!                               f(&mut scheduler)
//! ```
//!
//! Events at the same instant fire in the order they were scheduled.
//! Cancellation is idempotent: cancelling twice, or cancelling an event that
//! already fired, is a no-op.
//!
//! ## Example
//!
//! ```rust
//! use cogradio_core::scheduler::EventScheduler;
//! use cogradio_core::time::SimTime;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let mut sched = EventScheduler::new();
//!
//! let l = log.clone();
//! sched.schedule(SimTime::from_millis(5), move |s| l.borrow_mut().push(s.now()));
//! let l = log.clone();
//! let id = sched.schedule(SimTime::from_millis(2), move |s| l.borrow_mut().push(s.now()));
//! sched.cancel(id);
//!
//! sched.run();
//! assert_eq!(*log.borrow(), vec![SimTime::from_millis(5)]);
//! ```

use serde::Serialize;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;

use crate::time::SimTime;

/// Handle of a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ev#{}", self.0)
    }
}

type Callback = Box<dyn FnOnce(&mut EventScheduler)>;

/// Queue entry; the callback lives in a side table so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduledEvent {
    time: SimTime,
    id: EventId,
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Min-heap: earliest time first, then earliest scheduled
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Statistics about scheduler operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub events_scheduled: u64,
    pub events_fired: u64,
    pub events_cancelled: u64,
    /// Events still waiting to fire
    pub pending: usize,
}

/// Virtual-time event scheduler.
pub struct EventScheduler {
    now: SimTime,
    queue: BinaryHeap<ScheduledEvent>,
    callbacks: HashMap<EventId, Callback>,
    next_id: u64,
    stop_requested: bool,
    stats: SchedulerStats,
}

impl Default for EventScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventScheduler {
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            queue: BinaryHeap::new(),
            callbacks: HashMap::new(),
            next_id: 0,
            stop_requested: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Current virtual time.
    #[inline]
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Run `f` after `delay` of virtual time.
    pub fn schedule<F>(&mut self, delay: SimTime, f: F) -> EventId
    where
        F: FnOnce(&mut EventScheduler) + 'static,
    {
        let at = self.now + delay;
        self.schedule_at(at, f)
    }

    /// Run `f` at absolute time `at`. Past times are clamped to now.
    pub fn schedule_at<F>(&mut self, at: SimTime, f: F) -> EventId
    where
        F: FnOnce(&mut EventScheduler) + 'static,
    {
        let time = if at < self.now {
            tracing::warn!(requested = %at, now = %self.now, "event scheduled in the past; clamping");
            self.now
        } else {
            at
        };
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.queue.push(ScheduledEvent { time, id });
        self.callbacks.insert(id, Box::new(f));
        self.stats.events_scheduled += 1;
        id
    }

    /// Cancel a pending event.
    ///
    /// Returns `true` if the event was pending. Unknown, fired, or already
    /// cancelled ids return `false` and leave the queue untouched.
    pub fn cancel(&mut self, id: EventId) -> bool {
        let removed = self.callbacks.remove(&id).is_some();
        if removed {
            self.stats.events_cancelled += 1;
        }
        removed
    }

    pub fn is_pending(&self, id: EventId) -> bool {
        self.callbacks.contains_key(&id)
    }

    /// Number of events still waiting to fire.
    pub fn pending(&self) -> usize {
        self.callbacks.len()
    }

    /// Time of the next live event, if any.
    pub fn next_event_time(&mut self) -> Option<SimTime> {
        self.discard_cancelled();
        self.queue.peek().map(|e| e.time)
    }

    fn discard_cancelled(&mut self) {
        while let Some(head) = self.queue.peek() {
            if self.callbacks.contains_key(&head.id) {
                break;
            }
            self.queue.pop();
        }
    }

    /// Fire the next live event. Returns `false` when the queue is empty.
    pub fn step(&mut self) -> bool {
        self.discard_cancelled();
        let Some(event) = self.queue.pop() else {
            return false;
        };
        let Some(callback) = self.callbacks.remove(&event.id) else {
            return true;
        };
        debug_assert!(event.time >= self.now, "virtual time went backwards");
        self.now = event.time;
        self.stats.events_fired += 1;
        tracing::trace!(event = %event.id, now = %self.now, "firing event");
        callback(self);
        true
    }

    /// Run until the queue drains or [`stop`](Self::stop) is called.
    pub fn run(&mut self) {
        self.stop_requested = false;
        while !self.stop_requested && self.step() {}
    }

    /// Fire every event with time `<= until`, then advance the clock to `until`.
    pub fn run_until(&mut self, until: SimTime) {
        self.stop_requested = false;
        while !self.stop_requested {
            match self.next_event_time() {
                Some(t) if t <= until => {
                    self.step();
                }
                _ => break,
            }
        }
        if !self.stop_requested && until > self.now {
            self.now = until;
        }
    }

    /// Ask a running `run`/`run_until` loop to return after the current event.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut stats = self.stats.clone();
        stats.pending = self.callbacks.len();
        stats
    }
}
