//! Timer abstraction.
//!
//! Rooms never sleep or spawn timers themselves. They ask a [`Scheduler`] to
//! deliver an event after a delay and get back a [`TimerHandle`] for
//! cancellation. [`VirtualScheduler`] holds the queue and only moves time
//! when told to, so pacing timeouts and CPU ticks are deterministic in tests.

use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

pub trait Scheduler<T> {
    /// Time since the scheduler started.
    fn now(&self) -> Duration;

    /// Deliver `event` once `delay` has passed.
    fn after(&mut self, delay: Duration, event: T) -> TimerHandle;

    /// Drop a pending event. Returns false if it already fired or was cancelled.
    fn cancel(&mut self, handle: TimerHandle) -> bool;
}

/// Scheduler driven by explicit [`advance`](VirtualScheduler::advance) calls.
#[derive(Debug)]
pub struct VirtualScheduler<T> {
    now: Duration,
    next_id: u64,
    pending: BTreeMap<(Duration, TimerHandle), T>,
}

impl<T> Default for VirtualScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> VirtualScheduler<T> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            pending: BTreeMap::new(),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Pop the earliest event due at or before `deadline`, moving time to it.
    pub fn pop_due(&mut self, deadline: Duration) -> Option<T> {
        let (&(due, handle), _) = self.pending.first_key_value()?;
        if due > deadline {
            return None;
        }
        self.now = self.now.max(due);
        self.pending.remove(&(due, handle))
    }

    /// Move time forward by `by`, returning every event that fell due in order.
    ///
    /// Events scheduled while handling the result are not included; use
    /// [`pop_due`](Self::pop_due) in a loop when handlers reschedule.
    pub fn advance(&mut self, by: Duration) -> Vec<T> {
        let deadline = self.now + by;
        let mut fired = Vec::new();
        while let Some(event) = self.pop_due(deadline) {
            fired.push(event);
        }
        self.now = deadline;
        fired
    }

    /// Set the clock without firing anything.
    pub fn set_now(&mut self, now: Duration) {
        self.now = now;
    }
}

impl<T> Scheduler<T> for VirtualScheduler<T> {
    fn now(&self) -> Duration {
        self.now
    }

    fn after(&mut self, delay: Duration, event: T) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.pending.insert((self.now + delay, handle), event);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        let key = self.pending.keys().find(|(_, h)| *h == handle).copied();
        match key {
            Some(key) => self.pending.remove(&key).is_some(),
            None => false,
        }
    }
}
