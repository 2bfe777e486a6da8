use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One product tile from a catalog page.
///
/// Every field defaults to the empty string — absence in the markup is not an
/// error, and a record with a few blank cells is still worth keeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub review_count: String,
    /// Free-form activity blurb some shops render ("1.2k sold last month").
    #[serde(default)]
    pub recent_activity: String,
}

impl ProductRecord {
    /// True when no selector matched anything inside the item node.
    pub fn is_blank(&self) -> bool {
        self.url.is_empty()
            && self.title.is_empty()
            && self.image_url.is_empty()
            && self.price.is_empty()
            && self.rating.is_empty()
            && self.review_count.is_empty()
            && self.recent_activity.is_empty()
    }
}

/// Fully rendered page content, after scroll convergence.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// URL the page settled on (redirects included).
    pub url: String,
    pub html: String,
}

/// Counters reported at the end of a crawl.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlSummary {
    pub fetches: u64,
    pub pages_scraped: u64,
    pub records: usize,
    pub restarts: u32,
}

/// Cooperative cancellation handle, checked at page and scroll boundaries.
///
/// Set from the Ctrl-C handler in `main`; an interrupt loses at most the
/// in-progress page since snapshots land after every completed one.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A page-level fetch failure. Every variant is transient: the driver retries
/// the same page up to the failure cap, then forces a session restart.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("navigation to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("could not capture page content for {url}: {reason}")]
    Capture { url: String, reason: String },
}

/// Snapshot persistence failure. Surfaced to the caller — a crawl that cannot
/// write its snapshot is silently losing data.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("could not create {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("csv write to {path} failed: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[cfg(feature = "columnar")]
    #[error("parquet write to {path} failed: {reason}")]
    Columnar { path: String, reason: String },
}

/// Errors that end the crawl (as opposed to `FetchError`, which never does).
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// No render session could be created at all. Not retried; the process
    /// exits non-zero.
    #[error("could not open a render session: {0}")]
    FatalStartup(String),
    #[error(transparent)]
    Sink(#[from] SinkError),
}
