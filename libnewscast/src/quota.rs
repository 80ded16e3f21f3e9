//! Local call quotas for the external APIs
//!
//! Each quota is a fixed-length window that opens on the first check after the
//! previous one expired. The limit is enforced before a call is made; a call
//! only counts once it has been recorded.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Which window blocked a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaKind {
    Minute,
    Day,
}

impl fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaKind::Minute => write!(f, "per-minute"),
            QuotaKind::Day => write!(f, "per-day"),
        }
    }
}

/// A single counting window
#[derive(Debug, Clone)]
pub struct QuotaWindow {
    limit: u32,
    length: Duration,
    count: u32,
    started_at: Option<DateTime<Utc>>,
}

impl QuotaWindow {
    pub fn new(limit: u32, length: Duration) -> Self {
        Self {
            limit,
            length,
            count: 0,
            started_at: None,
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::minutes(1))
    }

    pub fn per_day(limit: u32) -> Self {
        Self::new(limit, Duration::days(1))
    }

    /// Reset the window if `now` is past its end
    fn roll(&mut self, now: DateTime<Utc>) {
        match self.started_at {
            Some(start) if now < start + self.length => {}
            _ => {
                self.count = 0;
                self.started_at = Some(now);
            }
        }
    }

    /// Check if a call is allowed (without recording)
    pub fn check(&mut self, now: DateTime<Utc>) -> bool {
        self.roll(now);
        self.count < self.limit
    }

    /// Record a call against the current window
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.roll(now);
        self.count += 1;
    }

    /// Check and record in one step
    ///
    /// Returns true if the call is allowed and has been counted.
    pub fn check_and_record(&mut self, now: DateTime<Utc>) -> bool {
        if !self.check(now) {
            return false;
        }
        self.count += 1;
        true
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }

    /// Instant at which the current window closes, if one is open
    pub fn resets_at(&self) -> Option<DateTime<Utc>> {
        self.started_at.map(|start| start + self.length)
    }
}

/// Nested minute and day windows for the text generation service
#[derive(Debug, Clone)]
pub struct ClassifierQuota {
    pub minute: QuotaWindow,
    pub day: QuotaWindow,
}

impl ClassifierQuota {
    pub fn new(per_minute: u32, per_day: u32) -> Self {
        Self {
            minute: QuotaWindow::per_minute(per_minute),
            day: QuotaWindow::per_day(per_day),
        }
    }

    /// Returns the first window that blocks a call at `now`, if any
    pub fn blocked_by(&mut self, now: DateTime<Utc>) -> Option<QuotaKind> {
        // Evaluate both so each window rolls over on the same clock read.
        let day_ok = self.day.check(now);
        let minute_ok = self.minute.check(now);
        if !day_ok {
            Some(QuotaKind::Day)
        } else if !minute_ok {
            Some(QuotaKind::Minute)
        } else {
            None
        }
    }

    /// Count one successful call in both windows
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.minute.record(now);
        self.day.record(now);
    }

    pub fn window(&self, kind: QuotaKind) -> &QuotaWindow {
        match kind {
            QuotaKind::Minute => &self.minute,
            QuotaKind::Day => &self.day,
        }
    }
}

/// All quota state carried across cycles
#[derive(Debug, Clone)]
pub struct QuotaBook {
    pub classifier: ClassifierQuota,
    pub publisher: QuotaWindow,
}

impl QuotaBook {
    pub fn new(classifier_per_minute: u32, classifier_per_day: u32, posts_per_day: u32) -> Self {
        Self {
            classifier: ClassifierQuota::new(classifier_per_minute, classifier_per_day),
            publisher: QuotaWindow::per_day(posts_per_day),
        }
    }
}
