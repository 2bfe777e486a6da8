//! Headless-Chromium render client.
//!
//! Owns browser executable discovery, the stealth launch profile, the
//! tracking-host request filter, and the page-level fetch primitives the
//! session layer composes. Stealth model: process-level flags and a
//! per-session user-agent here, plus a navigator-hardening init script
//! injected before any document runs.

use std::path::Path;
use std::time::Duration;

use aho_corasick::AhoCorasick;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::ErrorReason;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::types::{FetchError, RenderedPage};
use crate::scraping::scroll::ScrollSurface;

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan — catches package-manager installs on all platforms
/// 3. OS-specific well-known install paths
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    let names = [
        "chromium",
        "chromium-browser",
        "google-chrome",
        "chrome",
        "brave-browser",
        "brave",
    ];
    if let Ok(path_var) = std::env::var("PATH") {
        for dir in std::env::split_paths(&path_var) {
            for exe in names {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "linux")]
    let well_known: &[&str] = &[
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/bin/google-chrome",
        "/usr/bin/brave-browser",
        "/usr/local/bin/chromium",
    ];
    #[cfg(target_os = "macos")]
    let well_known: &[&str] = &[
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
    ];
    #[cfg(target_os = "windows")]
    let well_known: &[&str] = &[
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
    ];
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    let well_known: &[&str] = &[];

    well_known
        .iter()
        .find(|c| Path::new(c).exists())
        .map(|c| c.to_string())
}

/// Build a `BrowserConfig` for headless operation with stealth defaults.
///
/// `--disable-blink-features=AutomationControlled` hides the
/// `navigator.webdriver` flag; the user-agent is the session's identity and
/// changes on every rotation.
pub fn build_headless_config(exe: &str, user_agent: &str) -> Result<BrowserConfig> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: 1920,
            height: 1080,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(1920, 1080)
        .arg("--disable-gpu")
        .arg("--no-sandbox") // often required in CI / restricted environments
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", user_agent))
        .build()
        .map_err(|e| anyhow!("failed to build browser config: {}", e))
}

/// Drain CDP events for a launched browser. The task ends when the browser
/// process does.
pub fn spawn_cdp_handler(
    mut handler: chromiumoxide::handler::Handler,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("CDP handler error: {}", e);
            }
        }
    })
}

/// Substring automaton over the configured tracking-host fragments.
pub fn build_blocklist(hosts: &[String]) -> Result<AhoCorasick> {
    AhoCorasick::new(hosts).map_err(|e| anyhow!("invalid blocklist patterns: {}", e))
}

/// Returns `true` if this request URL should be aborted.
pub fn should_block_url(matcher: &AhoCorasick, url: &str) -> bool {
    matcher.is_match(url)
}

/// Enable CDP request interception on `page` and abort anything matching the
/// blocklist. Returns the filter task; aborted when the session closes.
pub async fn install_request_filter(page: &Page, matcher: AhoCorasick) -> Result<JoinHandle<()>> {
    page.execute(FetchEnableParams::default())
        .await
        .map_err(|e| anyhow!("failed to enable request interception: {}", e))?;

    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| anyhow!("failed to listen for paused requests: {}", e))?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let request_id = event.request_id.clone();
            let url = event.request.url.clone();
            let verdict = if should_block_url(&matcher, &url) {
                debug!("🚫 blocked: {}", url);
                page.execute(FailRequestParams::new(request_id, ErrorReason::Aborted))
                    .await
                    .map(|_| ())
            } else {
                page.execute(ContinueRequestParams::new(request_id))
                    .await
                    .map(|_| ())
            };
            if let Err(e) = verdict {
                // page likely mid-teardown; the filter dies with it
                debug!("request filter: {}", e);
            }
        }
    }))
}

/// Navigator hardening injected before any site script runs. Condensed to the
/// checks shops actually make; full fingerprint spoofing is out of scope.
const STEALTH_INIT_SCRIPT: &str = r#"
(() => {
    try {
        Object.defineProperty(Navigator.prototype, 'webdriver', {
            get: () => undefined,
            configurable: true,
        });
        delete navigator.webdriver;
    } catch (e) {}
    try {
        Object.defineProperty(Navigator.prototype, 'languages', {
            get: () => ['en-US', 'en'],
            configurable: true,
        });
        Object.defineProperty(Navigator.prototype, 'plugins', {
            get: () => [1, 2, 3, 4, 5],
            configurable: true,
        });
    } catch (e) {}
    if (!window.chrome) { window.chrome = {}; }
    if (!window.chrome.runtime) { window.chrome.runtime = { sendMessage: function() {} }; }
})();
"#;

/// Inject the navigator-hardening script so it runs on every new document.
pub async fn apply_stealth(page: &Page) -> Result<()> {
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
        STEALTH_INIT_SCRIPT,
    ))
    .await
    .map_err(|e| anyhow!("failed to inject stealth script: {}", e))?;
    Ok(())
}

/// Navigate with a hard timeout. Both timeout and navigation failure are
/// transient `FetchError`s — the driver decides how many to tolerate.
pub async fn navigate(page: &Page, url: &str, timeout: Duration) -> Result<(), FetchError> {
    match tokio::time::timeout(timeout, page.goto(url)).await {
        Err(_) => Err(FetchError::Timeout {
            url: url.to_string(),
            timeout,
        }),
        Ok(Err(e)) => Err(FetchError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        }),
        Ok(Ok(_)) => Ok(()),
    }
}

/// Wait until the DOM is complete and the network goes quiet (no new resource
/// entries for `quiet_ms`) or until `timeout_ms` elapses.
///
/// Polls `performance.getEntriesByType("resource").length` every 250 ms — a
/// networkidle heuristic that needs no CDP Network events.
pub async fn wait_for_ready(page: &Page, quiet_ms: u64, timeout_ms: u64) {
    let poll = Duration::from_millis(250);
    let start = std::time::Instant::now();
    let mut last_count = 0u64;
    let mut quiet_since = std::time::Instant::now();

    loop {
        if start.elapsed().as_millis() as u64 >= timeout_ms {
            debug!("wait_for_ready: timeout after {}ms", timeout_ms);
            return;
        }

        let count = eval_u64(page, "performance.getEntriesByType('resource').length").await;
        let complete = eval_bool(page, "document.readyState === 'complete'").await;

        if !complete || count != last_count {
            last_count = count;
            quiet_since = std::time::Instant::now();
        } else if quiet_since.elapsed().as_millis() as u64 >= quiet_ms {
            debug!(
                "wait_for_ready: idle after {}ms ({} resources)",
                start.elapsed().as_millis(),
                count
            );
            return;
        }

        tokio::time::sleep(poll).await;
    }
}

/// Capture the rendered DOM as HTML.
pub async fn capture(page: &Page, url: &str) -> Result<RenderedPage, FetchError> {
    let final_url = page
        .url()
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| url.to_string());
    let html = page.content().await.map_err(|e| FetchError::Capture {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    info!("✅ captured {} ({} chars)", final_url, html.len());
    Ok(RenderedPage {
        url: final_url,
        html,
    })
}

async fn eval_u64(page: &Page, js: &str) -> u64 {
    page.evaluate(js)
        .await
        .ok()
        .and_then(|v| v.into_value::<serde_json::Value>().ok())
        .and_then(|j| j.as_u64())
        .unwrap_or(0)
}

async fn eval_bool(page: &Page, js: &str) -> bool {
    page.evaluate(js)
        .await
        .ok()
        .and_then(|v| v.into_value::<serde_json::Value>().ok())
        .and_then(|j| j.as_bool())
        .unwrap_or(false)
}

/// Live [`ScrollSurface`] over a CDP page. Evaluate failures collapse to
/// neutral readings; the scroll loop's pass bound handles the rest.
pub struct PageSurface<'a> {
    page: &'a Page,
    item_selector: String,
    loader_selector: String,
}

impl<'a> PageSurface<'a> {
    pub fn new(page: &'a Page, item_selector: &str, loader_selector: &str) -> Self {
        Self {
            page,
            // JSON-quote once so selectors embed safely into JS
            item_selector: serde_json::Value::String(item_selector.to_string()).to_string(),
            loader_selector: serde_json::Value::String(loader_selector.to_string()).to_string(),
        }
    }
}

#[async_trait]
impl ScrollSurface for PageSurface<'_> {
    async fn scroll_by(&self, pixels: u64) {
        let js = format!("window.scrollBy({{top: {}, behavior: 'smooth'}});", pixels);
        if let Err(e) = self.page.evaluate(js).await {
            warn!("scroll step error: {}", e);
        }
    }

    async fn rendered_items(&self) -> u64 {
        let js = format!("document.querySelectorAll({}).length", self.item_selector);
        eval_u64(self.page, &js).await
    }

    async fn loader_visible(&self) -> bool {
        let js = format!(
            "(() => {{ const el = document.querySelector({}); \
             if (!el) return false; \
             const s = window.getComputedStyle(el); \
             return s.display !== 'none' && s.visibility !== 'hidden'; }})()",
            self.loader_selector
        );
        eval_bool(self.page, &js).await
    }
}

/// Launch a stealth-configured headless browser. The caller owns both the
/// browser and the returned handler task.
pub async fn launch(exe: &str, user_agent: &str) -> Result<(Browser, JoinHandle<()>)> {
    let config = build_headless_config(exe, user_agent)?;
    let (browser, handler) = Browser::launch(config)
        .await
        .map_err(|e| anyhow!("failed to launch browser ({}): {}", exe, e))?;
    let handler_task = spawn_cdp_handler(handler);
    Ok((browser, handler_task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocklist_matches_substrings() {
        let matcher = build_blocklist(&[
            "googletagmanager.com".to_string(),
            "v.clarity.ms".to_string(),
        ])
        .unwrap();
        assert!(should_block_url(
            &matcher,
            "https://www.googletagmanager.com/gtm.js?id=GTM-XYZ"
        ));
        assert!(should_block_url(&matcher, "https://v.clarity.ms/collect"));
        assert!(!should_block_url(
            &matcher,
            "https://shop.example/c/vitamins?p=2"
        ));
    }

    #[test]
    fn selectors_are_json_quoted_for_js() {
        // a selector with quotes must not break the generated JS
        let quoted =
            serde_json::Value::String(r#"div[data-role="tile"]"#.to_string()).to_string();
        assert!(quoted.starts_with('"') && quoted.ends_with('"'));
        assert!(quoted.contains(r#"\""#));
    }

    #[test]
    fn stealth_script_hardens_navigator() {
        assert!(STEALTH_INIT_SCRIPT.contains("webdriver"));
        assert!(STEALTH_INIT_SCRIPT.contains("languages"));
    }
}
