//! The crawl control loop.
//!
//! An explicit three-state machine per category: `Paging` fetches, extracts,
//! and snapshots; `Restarting` rotates the session and resumes at the same
//! page; `Done` is terminal. Transient fetch failures retry the same page
//! until the failure cap tips the machine into `Restarting` — a failure
//! never ends the crawl, only a missing next affordance (or an operator
//! interrupt) does.

use tracing::{info, warn};

use crate::core::config::{CrawlConfig, PaginationMode};
use crate::core::types::{CancelFlag, CrawlError, CrawlSummary, ProductRecord};
use crate::crawl::state::{draw_rotation_threshold, CrawlState, DriverState};
use crate::features::antibot::JitterSource;
use crate::scraping::extract::CatalogExtractor;
use crate::scraping::session::PageSource;
use crate::sink::RecordSink;

/// Accumulated result of a finished crawl.
#[derive(Debug)]
pub struct CrawlReport {
    pub records: Vec<ProductRecord>,
    pub summary: CrawlSummary,
}

pub struct CrawlDriver<P: PageSource, S: RecordSink> {
    source: P,
    sink: S,
    extractor: CatalogExtractor,
    pagination: PaginationMode,
    page_param: String,
    failure_cap: u32,
    rotation_range: (u32, u32),
    expand_subcategories: bool,
    jitter: Box<dyn JitterSource>,
    cancel: CancelFlag,
    records: Vec<ProductRecord>,
    summary: CrawlSummary,
}

impl<P: PageSource, S: RecordSink> CrawlDriver<P, S> {
    pub fn new(
        config: &CrawlConfig,
        source: P,
        sink: S,
        extractor: CatalogExtractor,
        jitter: Box<dyn JitterSource>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            source,
            sink,
            extractor,
            pagination: config.pagination,
            page_param: config.page_param.clone(),
            failure_cap: config.failure_cap,
            rotation_range: (config.rotation_min_pages, config.rotation_max_pages),
            expand_subcategories: config.expand_subcategories,
            jitter,
            cancel,
            records: Vec::new(),
            summary: CrawlSummary::default(),
        }
    }

    /// Crawl every category to completion and return the accumulated
    /// records. Snapshots are written after every page, so an interrupt
    /// loses at most the page in flight.
    pub async fn run(mut self, categories: &[String]) -> Result<CrawlReport, CrawlError> {
        let targets = if self.expand_subcategories {
            self.discover_targets(categories).await
        } else {
            categories.to_vec()
        };

        for target in &targets {
            if self.cancel.is_set() {
                break;
            }
            self.crawl_category(target).await?;
        }

        self.source.shutdown().await;
        self.summary.records = self.records.len();
        info!(
            "🏁 crawl finished: {} records across {} page(s), {} restart(s)",
            self.summary.records, self.summary.pages_scraped, self.summary.restarts
        );
        Ok(CrawlReport {
            records: self.records,
            summary: self.summary,
        })
    }

    /// Expand category landing pages into subcategory links. A category with
    /// no discoverable links (or a failed landing fetch) is crawled directly.
    async fn discover_targets(&mut self, categories: &[String]) -> Vec<String> {
        let mut targets = Vec::new();
        for category in categories {
            self.summary.fetches += 1;
            match self.source.fetch_page(category).await {
                Ok(page) => {
                    let links = self.extractor.subcategory_links(&page);
                    if links.is_empty() {
                        targets.push(category.clone());
                    } else {
                        info!("📂 {}: {} subcategories", category, links.len());
                        targets.extend(links.into_iter().map(|l| l.url));
                    }
                }
                Err(e) => {
                    warn!("subcategory discovery failed for {}: {}", category, e);
                    targets.push(category.clone());
                }
            }
        }
        targets
    }

    async fn crawl_category(&mut self, category: &str) -> Result<(), CrawlError> {
        let (rot_min, rot_max) = self.rotation_range;
        let mut state = CrawlState::new(draw_rotation_threshold(
            self.jitter.as_mut(),
            rot_min,
            rot_max,
        ));
        let mut machine = DriverState::Paging;

        loop {
            match machine {
                DriverState::Paging => {
                    if self.cancel.is_set() {
                        info!("⏹ interrupt — stopping after last completed page");
                        machine = DriverState::Done;
                        continue;
                    }
                    machine = self.process_page(category, &mut state).await?;
                }
                DriverState::Restarting => {
                    self.summary.restarts += 1;
                    info!(
                        "🔁 restarting session — will resume at page {}",
                        state.current_page
                    );
                    self.source.restart().await?;
                    let threshold =
                        draw_rotation_threshold(self.jitter.as_mut(), rot_min, rot_max);
                    state.note_rotation(threshold);
                    machine = DriverState::Paging;
                }
                DriverState::Done => break,
            }
        }
        Ok(())
    }

    async fn process_page(
        &mut self,
        category: &str,
        state: &mut CrawlState,
    ) -> Result<DriverState, CrawlError> {
        let url = self.page_url(category, state.current_page);
        info!("🌐 loading page {} → {}", state.current_page, url);
        self.summary.fetches += 1;

        let page = match self.source.fetch_page(&url).await {
            Ok(page) => page,
            Err(e) => {
                let streak = state.record_failure();
                warn!(
                    "⚠️ page {} fetch failed ({} consecutive, cap {}): {}",
                    state.current_page, streak, self.failure_cap, e
                );
                return Ok(if state.failures_exhausted(self.failure_cap) {
                    DriverState::Restarting
                } else {
                    DriverState::Paging
                });
            }
        };

        state.record_success();
        self.summary.pages_scraped += 1;

        let scan = self.extractor.scan(&page);
        if let (1, Some(total)) = (state.current_page, scan.total_results) {
            info!("🧮 shop advertises {} products in this category", total);
        }

        let fresh = scan.records.len();
        if fresh == 0 {
            warn!("no products found on page {}", state.current_page);
        }
        self.records.extend(scan.records);
        self.sink.write_snapshot(&self.records)?;
        info!(
            "🧾 page {} scraped: {} product(s) (total: {})",
            state.current_page,
            fresh,
            self.records.len()
        );

        let more_pages = match self.pagination {
            PaginationMode::NextControl => scan.has_next,
            PaginationMode::PageParam => fresh > 0,
        };
        if !more_pages {
            info!("🚩 no more pages for {}", category);
            return Ok(DriverState::Done);
        }

        state.advance_page();
        Ok(if state.rotation_due() {
            DriverState::Restarting
        } else {
            DriverState::Paging
        })
    }

    /// Pages are addressed by query parameter regardless of pagination mode;
    /// the mode only changes the continuation signal.
    fn page_url(&self, category: &str, page: u32) -> String {
        let separator = if category.contains('?') { '&' } else { '?' };
        format!("{}{}{}={}", category, separator, self.page_param, page)
    }
}
