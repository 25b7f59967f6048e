//! Request quota bookkeeping for the metered quote API.
//!
//! The tracker enforces three limits: a daily request cap, a per-minute cap over
//! a trailing 60 second window, and a fixed delay in front of every call. The
//! daily cap is a hard stop; the minute cap only ever makes the caller wait.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use log::{debug, info, warn};
use tokio::time::Instant;

/// Length of the sliding per-minute window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Twelve Data free tier allows 8/min and 800/day; keep headroom below both.
const DEFAULT_PER_MINUTE: usize = 7;
const DEFAULT_PER_DAY: u32 = 750;
const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(8);

/// Source of the current calendar date used for the daily reset.
pub trait Calendar: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Calendar backed by the local system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCalendar;

impl Calendar for LocalCalendar {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// Calendar whose date only changes when told to. Clones share the same date.
#[derive(Debug, Clone)]
pub struct ManualCalendar(Arc<Mutex<NaiveDate>>);

impl ManualCalendar {
    pub fn new(date: NaiveDate) -> Self {
        Self(Arc::new(Mutex::new(date)))
    }

    pub fn set(&self, date: NaiveDate) {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = date;
    }

    pub fn advance_days(&self, days: u64) {
        let mut guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = *guard + chrono::Days::new(days);
    }
}

impl Calendar for ManualCalendar {
    fn today(&self) -> NaiveDate {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaLimits {
    pub per_minute: usize,
    pub per_day: u32,
    /// Fixed pause before every attempted call.
    pub request_delay: Duration,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            per_minute: DEFAULT_PER_MINUTE,
            per_day: DEFAULT_PER_DAY,
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }
}

/// Per-minute and per-day request accounting for one API.
///
/// Owned by whoever issues the requests; there is no process-wide state, so a
/// fresh tracker per test is fully isolated.
pub struct QuotaTracker {
    limits: QuotaLimits,
    calendar: Arc<dyn Calendar>,
    day: NaiveDate,
    daily_count: u32,
    /// Timestamps of recorded requests, oldest first.
    window: VecDeque<Instant>,
}

impl QuotaTracker {
    pub fn new(limits: QuotaLimits) -> Self {
        Self::with_calendar(limits, Arc::new(LocalCalendar))
    }

    pub fn with_calendar(limits: QuotaLimits, calendar: Arc<dyn Calendar>) -> Self {
        let day = calendar.today();
        Self {
            limits,
            calendar,
            day,
            daily_count: 0,
            window: VecDeque::new(),
        }
    }

    pub fn limits(&self) -> &QuotaLimits {
        &self.limits
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Requests recorded since the last daily reset.
    pub fn daily_count(&self) -> u32 {
        self.daily_count
    }

    /// Recorded requests still inside the trailing window.
    pub fn minute_count(&self) -> usize {
        let now = Instant::now();
        self.window
            .iter()
            .filter(|t| now.duration_since(**t) < WINDOW)
            .count()
    }

    /// Decide whether one more request may go out.
    ///
    /// Returns `false` only when the daily cap is spent. A full minute window
    /// is waited out here and the whole check re-run, so the caller never sees
    /// that condition.
    pub async fn admit(&mut self) -> bool {
        loop {
            self.roll_day();

            if self.daily_count >= self.limits.per_day {
                warn!(
                    "Daily quote limit reached ({}/{}), no more requests today",
                    self.daily_count, self.limits.per_day
                );
                return false;
            }

            let now = Instant::now();
            self.prune(now);
            if self.window.len() < self.limits.per_minute {
                return true;
            }

            let wait = match self.window.front() {
                Some(oldest) => WINDOW.saturating_sub(now.duration_since(*oldest)),
                None => Duration::ZERO,
            };
            warn!(
                "Minute limit reached ({}/{}), waiting {:.0}s",
                self.window.len(),
                self.limits.per_minute,
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Sleep for the configured fixed delay.
    pub async fn pace(&self) {
        if !self.limits.request_delay.is_zero() {
            tokio::time::sleep(self.limits.request_delay).await;
        }
    }

    /// Count one request that reached the provider.
    pub fn record(&mut self) {
        self.daily_count = self.daily_count.saturating_add(1);
        self.window.push_back(Instant::now());
        debug!(
            "Request recorded: {}/{} daily, {}/{} per minute",
            self.daily_count,
            self.limits.per_day,
            self.window.len(),
            self.limits.per_minute
        );
    }

    fn roll_day(&mut self) {
        let today = self.calendar.today();
        if today != self.day {
            info!(
                "New day {} detected, resetting quote counters (was {} on {})",
                today, self.daily_count, self.day
            );
            self.daily_count = 0;
            self.day = today;
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.window.front() {
            if now.duration_since(*oldest) >= WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}
