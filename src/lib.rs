pub mod core;
pub mod crawl;
pub mod features;
pub mod scraping;
pub mod sink;

// --- Primary exports ---
pub use self::core::config::{CrawlConfig, FetchMode, PaginationMode, ScrollSettings, SelectorSpec};
pub use self::core::types::{
    CancelFlag, CrawlError, CrawlSummary, FetchError, ProductRecord, RenderedPage, SinkError,
};
pub use crawl::{CrawlDriver, CrawlReport, CrawlState, DriverState};

// --- Convenience module paths ---
pub use features::antibot;
pub use scraping::extract::CatalogExtractor;
pub use scraping::http::HttpSource;
pub use scraping::session::{PageSource, RotatingSession};
pub use sink::{RecordSink, SnapshotSink};
