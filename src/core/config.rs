use std::path::{Path, PathBuf};

use serde::Deserialize;

// ---------------------------------------------------------------------------
// CrawlConfig — file-based config loader (shelf-scout.json) with env-var
// fallbacks for the knobs people actually tune from CI.
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "SHELF_SCOUT_CONFIG";
pub const ENV_CATEGORY_URLS: &str = "SHELF_SCOUT_CATEGORIES";
pub const ENV_CSV_PATH: &str = "SHELF_SCOUT_CSV";
pub const ENV_DELAY_MIN_SECS: &str = "SHELF_SCOUT_DELAY_MIN_SECS";
pub const ENV_DELAY_MAX_SECS: &str = "SHELF_SCOUT_DELAY_MAX_SECS";

/// How catalog pages are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Headless Chromium with scroll convergence (default).
    #[default]
    Browser,
    /// Plain HTTP GET — enough for catalogs that render server-side.
    Http,
}

/// How the driver decides whether more pages exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaginationMode {
    /// An explicit "next" control must be present in the DOM.
    #[default]
    NextControl,
    /// Pages are addressed by index; the first empty page ends the crawl.
    PageParam,
}

/// Scroll-convergence tuning. All randomized quantities are ranges; the
/// actual draw goes through the crawl's jitter source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrollSettings {
    /// Consecutive passes with an unchanged item count before the page is
    /// considered converged.
    pub stability_threshold: u32,
    /// Hard bound on scroll passes — termination is guaranteed even when the
    /// page keeps mutating.
    pub max_passes: u32,
    pub min_scroll_px: u64,
    pub max_scroll_px: u64,
    pub min_pause_ms: u64,
    pub max_pause_ms: u64,
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self {
            stability_threshold: 5,
            max_passes: 100,
            min_scroll_px: 200,
            max_scroll_px: 400,
            min_pause_ms: 400,
            max_pause_ms: 800,
        }
    }
}

/// CSS selectors describing one shop's catalog markup. Only `item` is
/// structural; each field selector fails independently to an empty value.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorSpec {
    /// Candidate product tile.
    pub item: String,
    pub url: String,
    pub title: String,
    pub image: String,
    pub price: String,
    pub rating: String,
    pub review_count: String,
    pub recent_activity: String,
    /// Explicit "next page" control.
    pub next: String,
    /// "Loading more…" indicator consulted by scroll convergence.
    pub loader: String,
    /// Node carrying the "(N Products found)" style total.
    pub total: String,
    /// Subcategory links on a category landing page.
    pub subcategory: String,
}

impl Default for SelectorSpec {
    fn default() -> Self {
        Self {
            item: ".product-inner".into(),
            url: "a.product-link".into(),
            title: ".product-title".into(),
            image: ".product-image img".into(),
            price: ".product-price .price".into(),
            rating: ".stars".into(),
            review_count: ".rating-count span".into(),
            recent_activity: ".recent-activity-message-wrapper".into(),
            next: "a.pagination-next".into(),
            loader: ".infinite-scroll-loader".into(),
            total: ".found-text".into(),
            subcategory: "h2 a".into(),
        }
    }
}

/// Top-level configuration, merged from `shelf-scout.json`, environment
/// variables, and command-line flags (flags win).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub category_urls: Vec<String>,
    pub csv_path: String,
    /// Columnar snapshot path. Requires the `columnar` feature; without it
    /// the sink degrades to CSV-only with a warning.
    pub parquet_path: Option<String>,
    /// Hosts whose requests are aborted at the network layer. Substring
    /// match against the full request URL.
    pub blocked_hosts: Vec<String>,
    /// Human-pace delay applied after each navigation, in seconds.
    pub delay_min_secs: f64,
    pub delay_max_secs: f64,
    /// Pages processed per session before a forced rotation; the concrete
    /// threshold is redrawn from this range on every rotation.
    pub rotation_min_pages: u32,
    pub rotation_max_pages: u32,
    /// Consecutive fetch failures tolerated before a forced restart.
    pub failure_cap: u32,
    pub nav_timeout_secs: u64,
    pub fetch_mode: FetchMode,
    pub pagination: PaginationMode,
    /// Query parameter used to address pages ("p" → `?p=3`).
    pub page_param: String,
    /// Expand each category page into subcategory links before crawling.
    pub expand_subcategories: bool,
    pub scroll: ScrollSettings,
    pub selectors: SelectorSpec,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            category_urls: Vec::new(),
            csv_path: "products.csv".into(),
            parquet_path: None,
            blocked_hosts: default_blocked_hosts(),
            delay_min_secs: 1.5,
            delay_max_secs: 4.0,
            rotation_min_pages: 2,
            rotation_max_pages: 5,
            failure_cap: 3,
            nav_timeout_secs: 60,
            fetch_mode: FetchMode::default(),
            pagination: PaginationMode::default(),
            page_param: "p".into(),
            expand_subcategories: false,
            scroll: ScrollSettings::default(),
            selectors: SelectorSpec::default(),
        }
    }
}

/// Tracking/analytics hosts worth dropping on any shop. Fewer requests, less
/// noise, faster loads.
fn default_blocked_hosts() -> Vec<String> {
    [
        "googletagmanager.com",
        "google-analytics.com",
        "doubleclick.net",
        "googlesyndication.com",
        "v.clarity.ms",
        "fullstory.com",
        "nr-data.net",
        "hotjar.com",
        "connect.facebook.net",
        "criteo.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl CrawlConfig {
    /// Load an explicitly named config file. Unlike discovery, a broken file
    /// here is an error — the operator asked for exactly this one.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
        let mut cfg: CrawlConfig = serde_json::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("cannot parse {}: {}", path.display(), e))?;
        cfg.apply_env();
        cfg.normalize();
        Ok(cfg)
    }

    /// Discover `shelf-scout.json` in the usual spots.
    ///
    /// Search order (first found wins):
    /// 1. `SHELF_SCOUT_CONFIG` env var path
    /// 2. `./shelf-scout.json`
    /// 3. `../shelf-scout.json`
    ///
    /// Missing file → defaults. Parse error → warn and fall back to defaults,
    /// so a half-edited config never bricks a scheduled run.
    pub fn discover() -> Self {
        let mut candidates = vec![
            PathBuf::from("shelf-scout.json"),
            PathBuf::from("../shelf-scout.json"),
        ];
        if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
            candidates.insert(0, PathBuf::from(env_path));
        }

        for path in &candidates {
            let Ok(contents) = std::fs::read_to_string(path) else {
                continue;
            };
            match serde_json::from_str::<CrawlConfig>(&contents) {
                Ok(mut cfg) => {
                    tracing::info!("shelf-scout.json loaded from {}", path.display());
                    cfg.apply_env();
                    cfg.normalize();
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "shelf-scout.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    break;
                }
            }
        }

        let mut cfg = Self::default();
        cfg.apply_env();
        cfg.normalize();
        cfg
    }

    fn apply_env(&mut self) {
        if let Ok(urls) = std::env::var(ENV_CATEGORY_URLS) {
            let urls: Vec<String> = urls
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !urls.is_empty() {
                self.category_urls = urls;
            }
        }
        if let Ok(path) = std::env::var(ENV_CSV_PATH) {
            if !path.trim().is_empty() {
                self.csv_path = path.trim().to_string();
            }
        }
        if let Some(min) = env_f64(ENV_DELAY_MIN_SECS) {
            self.delay_min_secs = min;
        }
        if let Some(max) = env_f64(ENV_DELAY_MAX_SECS) {
            self.delay_max_secs = max;
        }
    }

    /// Clamp inverted ranges instead of erroring, mirroring how the delay
    /// envs are sanitized.
    fn normalize(&mut self) {
        if self.delay_min_secs > self.delay_max_secs {
            std::mem::swap(&mut self.delay_min_secs, &mut self.delay_max_secs);
        }
        if self.rotation_min_pages > self.rotation_max_pages {
            std::mem::swap(&mut self.rotation_min_pages, &mut self.rotation_max_pages);
        }
        if self.rotation_min_pages == 0 {
            self.rotation_min_pages = 1;
        }
        if self.rotation_max_pages < self.rotation_min_pages {
            self.rotation_max_pages = self.rotation_min_pages;
        }
        if self.scroll.min_scroll_px > self.scroll.max_scroll_px {
            std::mem::swap(&mut self.scroll.min_scroll_px, &mut self.scroll.max_scroll_px);
        }
        if self.scroll.min_pause_ms > self.scroll.max_pause_ms {
            std::mem::swap(&mut self.scroll.min_pause_ms, &mut self.scroll.max_pause_ms);
        }
        if self.scroll.max_passes == 0 {
            self.scroll.max_passes = 1;
        }
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
