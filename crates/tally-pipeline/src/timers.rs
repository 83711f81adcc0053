//! Named event timers with pause/resume, on the monotonic clock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Unit in which an ended timer reports `event_duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeUnit {
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    /// `duration` in this unit, rounded to three decimals.
    pub fn convert(self, duration: Duration) -> f64 {
        let secs = duration.as_secs_f64();
        let value = match self {
            Self::Milliseconds => secs * 1000.0,
            Self::Seconds => secs,
            Self::Minutes => secs / 60.0,
            Self::Hours => secs / 3600.0,
        };
        (value * 1000.0).round() / 1000.0
    }
}

/// One running or paused timer.
#[derive(Debug, Clone)]
pub struct EventTimer {
    unit: TimeUnit,
    start: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl EventTimer {
    fn new(unit: TimeUnit, start: Instant) -> Self {
        Self {
            unit,
            start,
            paused_at: None,
            paused_total: Duration::ZERO,
        }
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    fn pause(&mut self, at: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(at);
        }
    }

    fn resume(&mut self, at: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += at.saturating_duration_since(paused_at);
        }
    }

    /// Active time up to `at`. Time since an open pause is excluded.
    pub fn elapsed(&self, at: Instant) -> Duration {
        let end = self.paused_at.unwrap_or(at);
        end.saturating_duration_since(self.start)
            .saturating_sub(self.paused_total)
    }
}

/// Reading taken when a timer ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerReading {
    pub elapsed: Duration,
    pub unit: TimeUnit,
}

impl TimerReading {
    /// Elapsed time in the timer's unit, three decimals.
    pub fn value(&self) -> f64 {
        self.unit.convert(self.elapsed)
    }
}

/// All timers, behind one lock.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    timers: Mutex<HashMap<String, EventTimer>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, EventTimer>> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start (or restart) `name`.
    pub fn start(&self, name: &str, unit: TimeUnit) {
        self.start_at(name, unit, Instant::now());
    }

    pub fn start_at(&self, name: &str, unit: TimeUnit, at: Instant) {
        self.lock().insert(name.to_string(), EventTimer::new(unit, at));
    }

    /// Pause `name`. No-op if unknown or already paused.
    pub fn pause(&self, name: &str) {
        self.pause_at(name, Instant::now());
    }

    pub fn pause_at(&self, name: &str, at: Instant) {
        if let Some(timer) = self.lock().get_mut(name) {
            timer.pause(at);
        }
    }

    /// Resume `name`. No-op if unknown or running.
    pub fn resume(&self, name: &str) {
        self.resume_at(name, Instant::now());
    }

    pub fn resume_at(&self, name: &str, at: Instant) {
        if let Some(timer) = self.lock().get_mut(name) {
            timer.resume(at);
        }
    }

    /// End and remove `name`, returning its reading if it existed.
    pub fn end(&self, name: &str) -> Option<TimerReading> {
        self.end_at(name, Instant::now())
    }

    pub fn end_at(&self, name: &str, at: Instant) -> Option<TimerReading> {
        self.lock().remove(name).map(|timer| TimerReading {
            elapsed: timer.elapsed(at),
            unit: timer.unit,
        })
    }

    /// Drop `name` without reporting. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
