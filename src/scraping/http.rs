//! Plain-HTTP page source for catalogs that render server-side.
//!
//! No browser, no scrolling — just a paced GET with a rotating user-agent.
//! Rotation rebuilds the client from scratch, which also drops its cookie
//! and connection state.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::core::config::CrawlConfig;
use crate::core::types::{CrawlError, FetchError, RenderedPage};
use crate::features::antibot::{self, DelayRange, JitterSource};
use crate::scraping::session::PageSource;

pub struct HttpSource {
    client: reqwest::Client,
    user_agent: &'static str,
    timeout: Duration,
    pacing: DelayRange,
    jitter: Box<dyn JitterSource>,
}

fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, CrawlError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| CrawlError::FatalStartup(format!("cannot build HTTP client: {}", e)))
}

impl HttpSource {
    pub fn new(config: &CrawlConfig, jitter: Box<dyn JitterSource>) -> Result<Self, CrawlError> {
        let user_agent = antibot::random_user_agent();
        let timeout = Duration::from_secs(config.nav_timeout_secs);
        Ok(Self {
            client: build_client(user_agent, timeout)?,
            user_agent,
            timeout,
            pacing: DelayRange::from_secs(config.delay_min_secs, config.delay_max_secs),
            jitter,
        })
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn fetch_page(&mut self, url: &str) -> Result<RenderedPage, FetchError> {
        antibot::human_pause(self.pacing, self.jitter.as_mut()).await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        url: url.to_string(),
                        timeout: self.timeout,
                    }
                } else {
                    FetchError::Navigation {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Navigation {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        let final_url = response.url().to_string();
        let html = response.text().await.map_err(|e| FetchError::Capture {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(RenderedPage {
            url: final_url,
            html,
        })
    }

    async fn restart(&mut self) -> Result<(), CrawlError> {
        self.user_agent = antibot::random_user_agent();
        self.client = build_client(self.user_agent, self.timeout)?;
        info!("🔄 HTTP client rebuilt (new UA: {}…)", &self.user_agent[..40.min(self.user_agent.len())]);
        Ok(())
    }

    async fn shutdown(&mut self) {}
}
