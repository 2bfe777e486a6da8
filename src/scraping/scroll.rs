//! Scroll-convergence detection for infinite-scroll catalogs.
//!
//! The detector keeps nudging the page down in randomized increments until
//! the rendered item count stops growing and the "loading more" indicator is
//! gone. It talks to the page through [`ScrollSurface`], so the convergence
//! loop is testable against a fake surface — including the pathological page
//! that never settles.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::config::ScrollSettings;
use crate::core::types::CancelFlag;
use crate::features::antibot::JitterSource;

/// Minimal view of a scrollable page: advance it, then sample the two
/// convergence signals.
#[async_trait]
pub trait ScrollSurface: Sync {
    async fn scroll_by(&self, pixels: u64);
    /// Count of currently rendered item nodes.
    async fn rendered_items(&self) -> u64;
    /// Whether the "loading more" indicator is visible.
    async fn loader_visible(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    pub passes: u32,
    pub items: u64,
    /// False when the pass bound (or a cancellation) cut the loop short.
    pub converged: bool,
}

/// Drive `surface` until the item count is unchanged for
/// `stability_threshold` consecutive passes and the loader is hidden, or
/// until `max_passes` — whichever comes first. The pass bound is the
/// liveness guarantee: a page that mutates forever still terminates here.
pub async fn stabilize<S: ScrollSurface + ?Sized>(
    surface: &S,
    settings: &ScrollSettings,
    jitter: &mut dyn JitterSource,
    cancel: &CancelFlag,
) -> ScrollOutcome {
    let mut previous_count = 0u64;
    let mut unchanged_streak = 0u32;
    let mut passes = 0u32;

    while passes < settings.max_passes {
        if cancel.is_set() {
            info!("scroll interrupted after {} passes", passes);
            return ScrollOutcome {
                passes,
                items: previous_count,
                converged: false,
            };
        }
        passes += 1;

        let distance = jitter.sample(settings.min_scroll_px, settings.max_scroll_px);
        surface.scroll_by(distance).await;

        let pause = jitter.sample(settings.min_pause_ms, settings.max_pause_ms);
        if pause > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(pause)).await;
        }

        let count = surface.rendered_items().await;
        if count == previous_count {
            unchanged_streak += 1;
        } else {
            unchanged_streak = 0;
        }
        previous_count = count;
        debug!(
            "scroll pass {}: {}px, {} items, streak {}",
            passes, distance, count, unchanged_streak
        );

        if unchanged_streak >= settings.stability_threshold && !surface.loader_visible().await {
            debug!("scroll converged: {} items after {} passes", count, passes);
            return ScrollOutcome {
                passes,
                items: count,
                converged: true,
            };
        }
    }

    info!(
        "scroll pass bound reached ({} passes, {} items) — capturing as-is",
        passes, previous_count
    );
    ScrollOutcome {
        passes,
        items: previous_count,
        converged: false,
    }
}
