//! Session ownership and rotation.
//!
//! A [`CatalogSession`] is one headless browser with one page and one
//! user-agent identity. [`RotatingSession`] owns at most one of them at a
//! time and is the only thing that opens or closes them: the driver asks for
//! pages and restarts, never for browsers. Sessions are torn down on every
//! exit path — explicit close on rotation and shutdown, and a best-effort
//! `Drop` so an early return cannot leak a Chromium process.

use std::time::Duration;

use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::config::{CrawlConfig, ScrollSettings};
use crate::core::types::{CancelFlag, CrawlError, FetchError, RenderedPage};
use crate::features::antibot::{self, DelayRange, JitterSource};
use crate::scraping::browser::{self, PageSurface};
use crate::scraping::scroll;

/// Where the driver gets rendered pages from. The live implementations are
/// [`RotatingSession`] (headless browser) and [`crate::scraping::http::HttpSource`];
/// tests script their own.
#[async_trait]
pub trait PageSource: Send {
    /// Fetch `url`, wait for render, run scroll convergence, and return the
    /// final DOM.
    async fn fetch_page(&mut self, url: &str) -> Result<RenderedPage, FetchError>;

    /// Tear down the current session and open a fresh one with a new
    /// identity.
    async fn restart(&mut self) -> Result<(), CrawlError>;

    /// Final teardown at crawl end.
    async fn shutdown(&mut self);
}

/// One live render session: browser process, page, identity, and the two
/// background tasks (CDP event drain, request filter).
struct CatalogSession {
    browser: Option<Browser>,
    page: chromiumoxide::Page,
    handler_task: JoinHandle<()>,
    filter_task: JoinHandle<()>,
    user_agent: &'static str,
}

impl CatalogSession {
    async fn open(exe: &str, blocklist: AhoCorasick) -> anyhow::Result<Self> {
        let user_agent = antibot::random_user_agent();
        info!("🌐 opening session (UA: {}…)", &user_agent[..40.min(user_agent.len())]);

        let (browser, handler_task) = browser::launch(exe, user_agent).await?;

        let session = async {
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| anyhow::anyhow!("failed to open page: {}", e))?;
            browser::apply_stealth(&page).await?;
            let filter_task = browser::install_request_filter(&page, blocklist).await?;
            Ok::<_, anyhow::Error>((page, filter_task))
        }
        .await;

        match session {
            Ok((page, filter_task)) => Ok(Self {
                browser: Some(browser),
                page,
                handler_task,
                filter_task,
                user_agent,
            }),
            Err(e) => {
                // launched but could not finish setup — don't leak the process
                let mut browser = browser;
                let _ = browser.close().await;
                handler_task.abort();
                Err(e)
            }
        }
    }

    async fn close(mut self) {
        self.filter_task.abort();
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("browser close error (non-fatal): {}", e);
            }
        }
        self.handler_task.abort();
    }
}

impl Drop for CatalogSession {
    fn drop(&mut self) {
        // Drop cannot await; if a runtime is still up, hand the close to a
        // task so no zombie Chromium outlives us.
        self.filter_task.abort();
        self.handler_task.abort();
        if let Some(mut browser) = self.browser.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = browser.close().await;
                });
            }
        }
    }
}

/// Browser-backed [`PageSource`] with identity rotation.
pub struct RotatingSession {
    exe: String,
    blocked_hosts: Vec<String>,
    pacing: DelayRange,
    nav_timeout: Duration,
    scroll: ScrollSettings,
    item_selector: String,
    loader_selector: String,
    jitter: Box<dyn JitterSource>,
    cancel: CancelFlag,
    session: Option<CatalogSession>,
}

impl RotatingSession {
    /// Discover a browser and open the first session. Failure here is
    /// `FatalStartup`: no render capability, no crawl.
    pub async fn open(
        config: &CrawlConfig,
        jitter: Box<dyn JitterSource>,
        cancel: CancelFlag,
    ) -> Result<Self, CrawlError> {
        let exe = browser::find_chrome_executable().ok_or_else(|| {
            CrawlError::FatalStartup(
                "no Chromium-family browser found; install one or set CHROME_EXECUTABLE".into(),
            )
        })?;

        let mut source = Self {
            exe,
            blocked_hosts: config.blocked_hosts.clone(),
            pacing: DelayRange::from_secs(config.delay_min_secs, config.delay_max_secs),
            nav_timeout: Duration::from_secs(config.nav_timeout_secs),
            scroll: config.scroll.clone(),
            item_selector: config.selectors.item.clone(),
            loader_selector: config.selectors.loader.clone(),
            jitter,
            cancel,
            session: None,
        };
        source.session = Some(source.open_session().await?);
        Ok(source)
    }

    async fn open_session(&self) -> Result<CatalogSession, CrawlError> {
        let blocklist = browser::build_blocklist(&self.blocked_hosts)
            .map_err(|e| CrawlError::FatalStartup(e.to_string()))?;
        CatalogSession::open(&self.exe, blocklist)
            .await
            .map_err(|e| CrawlError::FatalStartup(e.to_string()))
    }

    pub fn current_user_agent(&self) -> Option<&'static str> {
        self.session.as_ref().map(|s| s.user_agent)
    }
}

#[async_trait]
impl PageSource for RotatingSession {
    async fn fetch_page(&mut self, url: &str) -> Result<RenderedPage, FetchError> {
        let session = match &self.session {
            Some(s) => s,
            None => {
                // a prior restart failed mid-way; treat like navigation loss
                return Err(FetchError::Navigation {
                    url: url.to_string(),
                    reason: "no live session".into(),
                });
            }
        };

        browser::navigate(&session.page, url, self.nav_timeout).await?;
        antibot::human_pause(self.pacing, self.jitter.as_mut()).await;
        browser::wait_for_ready(&session.page, 1500, 8000).await;

        let surface = PageSurface::new(&session.page, &self.item_selector, &self.loader_selector);
        let outcome =
            scroll::stabilize(&surface, &self.scroll, self.jitter.as_mut(), &self.cancel).await;
        info!(
            "📜 scroll settled: {} items in {} passes{}",
            outcome.items,
            outcome.passes,
            if outcome.converged { "" } else { " (bound hit)" }
        );

        browser::capture(&session.page, url).await
    }

    async fn restart(&mut self) -> Result<(), CrawlError> {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        let fresh = self.open_session().await?;
        info!("🔄 session rotated (new UA: {}…)", &fresh.user_agent[..40.min(fresh.user_agent.len())]);
        self.session = Some(fresh);
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
            info!("🛑 session closed");
        }
    }
}
