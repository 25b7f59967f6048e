//! Round-robin rotation over a pool of API keys with a per-key daily budget.

use std::sync::Arc;

use chrono::NaiveDate;
use log::{debug, info, warn};

use crate::quota::{Calendar, LocalCalendar};

pub struct KeyRing {
    keys: Vec<String>,
    /// Checkouts per key since the last daily reset, indexed like `keys`.
    used: Vec<u32>,
    next: usize,
    per_key: Option<u32>,
    calendar: Arc<dyn Calendar>,
    day: NaiveDate,
}

impl KeyRing {
    pub fn new(keys: Vec<String>, per_key: Option<u32>) -> Self {
        Self::with_calendar(keys, per_key, Arc::new(LocalCalendar))
    }

    pub fn with_calendar(keys: Vec<String>, per_key: Option<u32>, calendar: Arc<dyn Calendar>) -> Self {
        let day = calendar.today();
        Self {
            used: vec![0; keys.len()],
            keys,
            next: 0,
            per_key,
            calendar,
            day,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn used(&self, index: usize) -> u32 {
        self.used.get(index).copied().unwrap_or(0)
    }

    /// Hand out the next key with budget left, counting it as used.
    /// Returns `None` once every key has spent its budget for the day.
    pub fn checkout(&mut self) -> Option<&str> {
        self.roll_day();
        for _ in 0..self.keys.len() {
            let idx = self.next;
            self.next = (self.next + 1) % self.keys.len();
            if self.per_key.map_or(true, |cap| self.used[idx] < cap) {
                self.used[idx] += 1;
                debug!(
                    "Using API key {} ({}) request {}",
                    idx + 1,
                    mask_key(&self.keys[idx]),
                    self.used[idx]
                );
                return Some(&self.keys[idx]);
            }
        }
        warn!("All {} API keys at their daily budget", self.keys.len());
        None
    }

    fn roll_day(&mut self) {
        let today = self.calendar.today();
        if today != self.day {
            info!("New day {} detected, resetting API key budgets", today);
            self.used.iter_mut().for_each(|u| *u = 0);
            self.day = today;
        }
    }
}

/// Show only the last four characters of a key. Keys that short are hidden entirely.
pub fn mask_key(key: &str) -> String {
    if key.chars().count() <= 4 {
        return "****".to_string();
    }
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::ManualCalendar;

    fn ring(n: usize, per_key: Option<u32>, cal: &ManualCalendar) -> KeyRing {
        let keys = (1..=n).map(|i| format!("key-{i}")).collect();
        KeyRing::with_calendar(keys, per_key, Arc::new(cal.clone()))
    }

    fn cal() -> ManualCalendar {
        ManualCalendar::new(NaiveDate::from_ymd_opt(2025, 3, 3).unwrap())
    }

    #[test]
    fn rotates_round_robin() {
        let c = cal();
        let mut r = ring(3, None, &c);
        let got: Vec<String> = (0..4).map(|_| r.checkout().unwrap().to_string()).collect();
        assert_eq!(got, vec!["key-1", "key-2", "key-3", "key-1"]);
        assert_eq!(r.used(0), 2);
    }

    #[test]
    fn skips_spent_keys_then_exhausts() {
        let c = cal();
        let mut r = ring(2, Some(2), &c);
        for _ in 0..4 {
            assert!(r.checkout().is_some());
        }
        assert!(r.checkout().is_none());
        assert_eq!(r.used(0), 2);
        assert_eq!(r.used(1), 2);
    }

    #[test]
    fn uneven_budget_skips_to_next_key() {
        let c = cal();
        let mut r = ring(2, Some(1), &c);
        assert_eq!(r.checkout(), Some("key-1"));
        assert_eq!(r.checkout(), Some("key-2"));
        assert_eq!(r.checkout(), None);
    }

    #[test]
    fn budgets_reset_on_new_day() {
        let c = cal();
        let mut r = ring(1, Some(1), &c);
        assert!(r.checkout().is_some());
        assert!(r.checkout().is_none());
        c.advance_days(1);
        assert_eq!(r.checkout(), Some("key-1"));
    }

    #[test]
    fn masks_all_but_tail() {
        assert_eq!(mask_key("75f27ed4144449b1"), "...49b1");
        assert_eq!(mask_key("ab"), "****");
        assert_eq!(mask_key("abcd"), "****");
        assert_eq!(mask_key("abcde"), "...bcde");
    }
}
