//! Clocks, fire-once timers and next-frame callbacks.
//!
//! Everything runs on the caller's thread. The session polls the scheduler once
//! per rendered frame: due timers fire first, then the callbacks that asked for
//! "the next render tick".

use std::{
    cell::Cell,
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    rc::Rc,
    time::{Duration, Instant},
};

pub trait Clock {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

/// Liveness flag for a self-rescheduling frame loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    pub fn is_live(&self) -> bool {
        !self.cancelled.get()
    }
}

#[derive(Debug)]
struct Pending<T> {
    due: Duration,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Pending<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Pending<T> {}

impl<T> PartialOrd for Pending<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Pending<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

#[derive(Debug)]
pub struct Scheduler<T> {
    timers: BinaryHeap<Reverse<Pending<T>>>,
    next_frame: Vec<T>,
    seq: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            timers: BinaryHeap::new(),
            next_frame: Vec::new(),
            seq: 0,
        }
    }

    /// Arm a fire-once timer `delay` after `now`.
    pub fn after(&mut self, now: Duration, delay: Duration, item: T) {
        self.seq += 1;
        self.timers.push(Reverse(Pending {
            due: now + delay,
            seq: self.seq,
            item,
        }));
    }

    /// Run `item` on the next rendered frame.
    pub fn next_frame(&mut self, item: T) {
        self.next_frame.push(item);
    }

    /// Pops the earliest timer due at or before `now`. Timers with equal due
    /// times come out in the order they were armed.
    pub fn pop_due(&mut self, now: Duration) -> Option<(Duration, T)> {
        let ready = self
            .timers
            .peek()
            .map(|Reverse(p)| p.due <= now)
            .unwrap_or(false);
        if !ready {
            return None;
        }
        self.timers.pop().map(|Reverse(p)| (p.due, p.item))
    }

    /// Callbacks queued during this frame run on the next one.
    pub fn take_frame_callbacks(&mut self) -> Vec<T> {
        std::mem::take(&mut self.next_frame)
    }

    pub fn pending(&self) -> usize {
        self.timers.len() + self.next_frame.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn timers_fire_in_due_order_then_insertion_order() {
        let mut s = Scheduler::new();
        s.after(ms(0), ms(300), "c");
        s.after(ms(0), ms(100), "a");
        s.after(ms(0), ms(100), "b");

        assert!(s.pop_due(ms(99)).is_none());
        assert_eq!(s.pop_due(ms(100)).map(|(_, i)| i), Some("a"));
        assert_eq!(s.pop_due(ms(100)).map(|(_, i)| i), Some("b"));
        assert!(s.pop_due(ms(299)).is_none());
        assert_eq!(s.pop_due(ms(1000)), Some((ms(300), "c")));
        assert!(s.is_idle());
    }

    #[test]
    fn frame_callbacks_are_drained_once() {
        let mut s = Scheduler::new();
        s.next_frame(1);
        s.next_frame(2);
        assert_eq!(s.take_frame_callbacks(), vec![1, 2]);
        assert!(s.take_frame_callbacks().is_empty());
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let view = clock.clone();
        clock.advance(ms(16));
        clock.advance(ms(16));
        assert_eq!(view.now(), ms(32));
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let loop_side = token.clone();
        assert!(loop_side.is_live());
        token.cancel();
        assert!(loop_side.is_cancelled());
    }
}
