//! Last-write-wins debouncing over an injectable clock.
//!
//! Time is a `Duration` since the host's epoch. Tests and replays drive a
//! [`ManualClock`]; the HTTP adapter uses [`SystemClock`].

use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ManualClock {
    now: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Single-slot cancellable timer. Scheduling replaces whatever was pending.
#[derive(Debug)]
pub struct Debouncer<T> {
    pending: Option<Pending<T>>,
    superseded: u64,
}

#[derive(Debug)]
struct Pending<T> {
    deadline: Duration,
    payload: T,
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self {
            pending: None,
            superseded: 0,
        }
    }
}

impl<T> Debouncer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the payload that was cancelled, if any.
    pub fn schedule(&mut self, now: Duration, delay: Duration, payload: T) -> Option<T> {
        let previous = self.pending.replace(Pending {
            deadline: now + delay,
            payload,
        });
        previous.map(|p| {
            self.superseded += 1;
            p.payload
        })
    }

    /// Takes the payload once its deadline has passed.
    pub fn poll(&mut self, now: Duration) -> Option<T> {
        match &self.pending {
            Some(pending) if pending.deadline <= now => self.pending.take().map(|p| p.payload),
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    pub fn peek(&self) -> Option<&T> {
        self.pending.as_ref().map(|p| &p.payload)
    }

    /// How many scheduled payloads were replaced before firing.
    pub fn superseded(&self) -> u64 {
        self.superseded
    }
}
