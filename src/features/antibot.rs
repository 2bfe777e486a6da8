//! Session identity pool and human-pace jitter.
//!
//! Every randomized quantity in the crawler — scroll distance, read pause,
//! post-navigation delay, rotation interval — is drawn through the
//! [`JitterSource`] seam. Production uses the thread RNG; tests plug in a
//! scripted source and the whole crawl becomes deterministic. The
//! randomness itself is load-bearing: uniform scroll distances and fixed
//! delays are exactly what bot heuristics key on.

use std::time::Duration;

/// Realistic desktop User-Agent pool. One is drawn per session; rotation
/// gives the next session a fresh identity.
pub const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Firefox 133 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Firefox 133 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.7; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Safari 17 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
    // Edge 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Returns a randomly-chosen realistic desktop User-Agent string.
pub fn random_user_agent() -> &'static str {
    use rand::prelude::*;
    let mut rng = rand::rng();
    let index = rng.random_range(0..DESKTOP_USER_AGENTS.len());
    DESKTOP_USER_AGENTS[index]
}

/// Uniform draw from an inclusive range. The single seam through which all
/// crawl randomness flows.
pub trait JitterSource: Send + Sync {
    fn sample(&mut self, min: u64, max: u64) -> u64;
}

/// Production source backed by the thread RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        use rand::prelude::*;
        let mut rng = rand::rng();
        rng.random_range(min..=max)
    }
}

/// Deterministic source for tests: replays a fixed sequence, clamping each
/// value into the requested range, and cycles when exhausted.
#[derive(Debug, Clone)]
pub struct FixedJitter {
    values: Vec<u64>,
    next: usize,
}

impl FixedJitter {
    pub fn new(values: Vec<u64>) -> Self {
        Self { values, next: 0 }
    }

    /// Always answers with the range minimum — zero-delay crawls in tests.
    pub fn floor() -> Self {
        Self::new(Vec::new())
    }
}

impl JitterSource for FixedJitter {
    fn sample(&mut self, min: u64, max: u64) -> u64 {
        if self.values.is_empty() {
            return min;
        }
        let v = self.values[self.next % self.values.len()];
        self.next += 1;
        v.clamp(min, max)
    }
}

/// Human-pace delay range, in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        let (min_ms, max_ms) = if min_ms > max_ms {
            (max_ms, min_ms)
        } else {
            (min_ms, max_ms)
        };
        Self { min_ms, max_ms }
    }

    /// Build from the config's second-denominated knobs.
    pub fn from_secs(min: f64, max: f64) -> Self {
        Self::new((min.max(0.0) * 1000.0) as u64, (max.max(0.0) * 1000.0) as u64)
    }

    pub fn sample(&self, jitter: &mut dyn JitterSource) -> Duration {
        Duration::from_millis(jitter.sample(self.min_ms, self.max_ms))
    }
}

/// Sleep a human-looking interval drawn from `range`.
pub async fn human_pause(range: DelayRange, jitter: &mut dyn JitterSource) {
    let delay = range.sample(jitter);
    if !delay.is_zero() {
        tracing::debug!("pacing delay: {}ms", delay.as_millis());
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agents_look_real() {
        assert!(DESKTOP_USER_AGENTS.iter().all(|ua| ua.contains("Mozilla")));
        assert!(DESKTOP_USER_AGENTS.contains(&random_user_agent()));
    }

    #[test]
    fn thread_rng_respects_bounds() {
        let mut jitter = ThreadRngJitter;
        for _ in 0..100 {
            let v = jitter.sample(200, 400);
            assert!((200..=400).contains(&v));
        }
        assert_eq!(jitter.sample(7, 7), 7);
    }

    #[test]
    fn fixed_jitter_replays_and_clamps() {
        let mut jitter = FixedJitter::new(vec![3, 999]);
        assert_eq!(jitter.sample(2, 5), 3);
        assert_eq!(jitter.sample(2, 5), 5); // clamped
        assert_eq!(jitter.sample(2, 5), 3); // cycles
        assert_eq!(FixedJitter::floor().sample(10, 20), 10);
    }

    #[test]
    fn delay_range_from_secs() {
        let range = DelayRange::from_secs(1.5, 4.0);
        assert_eq!(range.min_ms, 1500);
        assert_eq!(range.max_ms, 4000);

        // inverted input is swapped, not rejected
        let swapped = DelayRange::new(500, 100);
        assert_eq!((swapped.min_ms, swapped.max_ms), (100, 500));
    }
}
