//! End-to-end state-machine scenarios against a scripted page source.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use shelf_scout::antibot::FixedJitter;
use shelf_scout::{
    CancelFlag, CatalogExtractor, CrawlConfig, CrawlDriver, CrawlError, FetchError, PageSource,
    ProductRecord, RecordSink, RenderedPage, SinkError,
};

const CATEGORY: &str = "https://shop.example/c/vitamins";

/// Shared log of fetches and restarts, in order.
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn fetches(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e != "<restart>")
            .collect()
    }
}

/// Page source that replays a per-URL script. Each URL maps to a queue of
/// outcomes; the final entry repeats if the URL is fetched again.
struct ScriptedSource {
    responses: HashMap<String, VecDeque<Result<String, String>>>,
    journal: Journal,
}

impl ScriptedSource {
    fn new(journal: Journal) -> Self {
        Self {
            responses: HashMap::new(),
            journal,
        }
    }

    fn page(mut self, url: &str, outcomes: Vec<Result<String, String>>) -> Self {
        self.responses.insert(url.to_string(), outcomes.into());
        self
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&mut self, url: &str) -> Result<RenderedPage, FetchError> {
        self.journal.push(url);
        let queue = self
            .responses
            .get_mut(url)
            .unwrap_or_else(|| panic!("unscripted URL fetched: {}", url));
        let outcome = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        };
        match outcome {
            Ok(html) => Ok(RenderedPage {
                url: url.to_string(),
                html,
            }),
            Err(reason) => Err(FetchError::Navigation {
                url: url.to_string(),
                reason,
            }),
        }
    }

    async fn restart(&mut self) -> Result<(), CrawlError> {
        self.journal.push("<restart>");
        Ok(())
    }

    async fn shutdown(&mut self) {}
}

/// Sink that records the size of every snapshot it is handed.
#[derive(Clone, Default)]
struct CountingSink(Arc<Mutex<Vec<usize>>>);

impl RecordSink for CountingSink {
    fn write_snapshot(&mut self, records: &[ProductRecord]) -> Result<(), SinkError> {
        self.0.lock().unwrap().push(records.len());
        Ok(())
    }
}

fn catalog_page(ids: &[&str], has_next: bool) -> String {
    let mut body = String::new();
    for id in ids {
        body.push_str(&format!(
            r#"<div class="product-inner">
                 <a class="product-link" href="/p/{id}"></a>
                 <div class="product-title">{id}</div>
                 <div class="product-price"><span class="price">$5.00</span></div>
               </div>"#
        ));
    }
    if has_next {
        body.push_str(r##"<a class="pagination-next" href="#">Next</a>"##);
    }
    format!("<html><body>{body}</body></html>")
}

fn page_url(page: u32) -> String {
    format!("{CATEGORY}?p={page}")
}

fn test_config() -> CrawlConfig {
    let mut config = CrawlConfig::default();
    config.category_urls = vec![CATEGORY.to_string()];
    // keep rotation out of the way unless a test wants it
    config.rotation_min_pages = 50;
    config.rotation_max_pages = 50;
    config
}

fn driver(
    config: &CrawlConfig,
    source: ScriptedSource,
    sink: CountingSink,
    jitter: FixedJitter,
) -> CrawlDriver<ScriptedSource, CountingSink> {
    CrawlDriver::new(
        config,
        source,
        sink,
        CatalogExtractor::new(&config.selectors).unwrap(),
        Box::new(jitter),
        CancelFlag::new(),
    )
}

#[tokio::test]
async fn three_page_category_ends_done_with_four_records() {
    let journal = Journal::default();
    let source = ScriptedSource::new(journal.clone())
        .page(&page_url(1), vec![Ok(catalog_page(&["a1", "a2"], true))])
        .page(&page_url(2), vec![Ok(catalog_page(&["b1", "b2"], true))])
        .page(&page_url(3), vec![Ok(catalog_page(&[], false))]);
    let sink = CountingSink::default();
    let config = test_config();

    let report = driver(&config, source, sink.clone(), FixedJitter::floor())
        .run(&config.category_urls)
        .await
        .unwrap();

    assert_eq!(report.records.len(), 4);
    assert_eq!(report.summary.fetches, 3);
    assert_eq!(report.summary.restarts, 0);
    assert_eq!(
        journal.fetches(),
        vec![page_url(1), page_url(2), page_url(3)]
    );
    // snapshot after every page, including the empty final one
    assert_eq!(sink.0.lock().unwrap().clone(), vec![2, 4, 4]);
}

#[tokio::test]
async fn failure_cap_restarts_session_and_retries_same_page() {
    let journal = Journal::default();
    let fail = || Err("connection reset".to_string());
    let source = ScriptedSource::new(journal.clone())
        .page(&page_url(1), vec![Ok(catalog_page(&["a1", "a2"], true))])
        .page(
            &page_url(2),
            vec![fail(), fail(), fail(), fail(), Ok(catalog_page(&[], false))],
        );
    let sink = CountingSink::default();
    let config = test_config(); // failure_cap = 3

    let report = driver(&config, source, sink.clone(), FixedJitter::floor())
        .run(&config.category_urls)
        .await
        .unwrap();

    assert_eq!(report.summary.restarts, 1);
    assert_eq!(report.records.len(), 2);

    let entries = journal.entries();
    // page 2 fails four times (cap 3 exceeded), restart, then page 2 again —
    // never page 1
    assert_eq!(
        entries,
        vec![
            page_url(1),
            page_url(2),
            page_url(2),
            page_url(2),
            page_url(2),
            "<restart>".to_string(),
            page_url(2),
        ]
    );
}

#[tokio::test]
async fn rotation_thresholds_are_redrawn_after_each_restart() {
    let journal = Journal::default();
    let mut source = ScriptedSource::new(journal.clone());
    for page in 1..=6u32 {
        source = source.page(&page_url(page), vec![Ok(catalog_page(&["x"], true))]);
    }
    source = source.page(&page_url(7), vec![Ok(catalog_page(&[], false))]);
    let sink = CountingSink::default();

    let mut config = test_config();
    config.rotation_min_pages = 2;
    config.rotation_max_pages = 5;

    // scripted draws: first threshold 2, then 3, then 5 (clamped from 50)
    let report = driver(
        &config,
        source,
        sink.clone(),
        FixedJitter::new(vec![2, 3, 50]),
    )
    .run(&config.category_urls)
    .await
    .unwrap();

    assert_eq!(report.records.len(), 6);
    assert_eq!(report.summary.restarts, 2);

    let entries = journal.entries();
    // threshold 2 → rotate after pages 1–2; threshold 3 → rotate after 3–5;
    // threshold 5 (clamped) outlives the remaining pages
    assert_eq!(
        entries,
        vec![
            page_url(1),
            page_url(2),
            "<restart>".to_string(),
            page_url(3),
            page_url(4),
            page_url(5),
            "<restart>".to_string(),
            page_url(6),
            page_url(7),
        ]
    );
}

#[tokio::test]
async fn empty_first_page_finishes_cleanly_with_snapshot() {
    let journal = Journal::default();
    let source = ScriptedSource::new(journal.clone())
        .page(&page_url(1), vec![Ok(catalog_page(&[], false))]);
    let sink = CountingSink::default();
    let config = test_config();

    let report = driver(&config, source, sink.clone(), FixedJitter::floor())
        .run(&config.category_urls)
        .await
        .unwrap();

    assert!(report.records.is_empty());
    assert_eq!(report.summary.pages_scraped, 1);
    assert_eq!(sink.0.lock().unwrap().clone(), vec![0]);
}
