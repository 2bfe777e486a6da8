//! Per-category crawl bookkeeping.
//!
//! `CrawlState` lives for one category crawl and dies with it — progress is
//! never persisted across runs; a fresh invocation always starts at page 1.

use crate::features::antibot::JitterSource;

/// The driver's three states. `Restarting` always resumes at the page that
/// was in flight, never at page 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Paging,
    Restarting,
    Done,
}

#[derive(Debug, Clone)]
pub struct CrawlState {
    /// 1-based page index currently being worked.
    pub current_page: u32,
    /// Pages successfully processed in the current session.
    pub pages_since_rotation: u32,
    /// Fetch failures since the last success.
    pub consecutive_failures: u32,
    /// Pages this session may process before a forced rotation. Redrawn on
    /// every rotation.
    pub rotation_threshold: u32,
}

impl CrawlState {
    pub fn new(rotation_threshold: u32) -> Self {
        Self {
            current_page: 1,
            pages_since_rotation: 0,
            consecutive_failures: 0,
            rotation_threshold,
        }
    }

    /// Note a transient fetch failure; returns the updated streak.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    /// The failure streak has exceeded the cap — time to restart.
    pub fn failures_exhausted(&self, cap: u32) -> bool {
        self.consecutive_failures > cap
    }

    /// Any successful fetch resets the failure streak and counts toward the
    /// rotation interval.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.pages_since_rotation += 1;
    }

    pub fn advance_page(&mut self) {
        self.current_page += 1;
    }

    pub fn rotation_due(&self) -> bool {
        self.pages_since_rotation >= self.rotation_threshold
    }

    /// A fresh session is live: reset the per-session counters and install
    /// the newly drawn threshold. `current_page` is untouched.
    pub fn note_rotation(&mut self, new_threshold: u32) {
        self.pages_since_rotation = 0;
        self.consecutive_failures = 0;
        self.rotation_threshold = new_threshold;
    }
}

/// Draw the next rotation threshold from the configured page range.
pub fn draw_rotation_threshold(jitter: &mut dyn JitterSource, min: u32, max: u32) -> u32 {
    jitter.sample(u64::from(min), u64::from(max)) as u32
}
