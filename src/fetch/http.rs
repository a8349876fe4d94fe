// src/fetch/http.rs
use anyhow::{Context, Result};
use reqwest::Client;
use tokio::time::sleep;
use tracing::{debug, error, warn};
use url::Url;

use crate::browser::PageSource;
use crate::config::{BrowserConfig, WaitPolicy};

/// Plain HTTP page source, for pages whose markup is served without scripting.
pub struct HttpPage {
    client: Client,
    retry: WaitPolicy,
}

impl HttpPage {
    /// Build a client that identifies itself with the same user agent as the
    /// browser and retries failed requests the way a stalled render is retried.
    pub fn new(cfg: &BrowserConfig, retry: &WaitPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .cookie_store(true)
            .timeout(retry.timeout())
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            retry: retry.clone(),
        })
    }

    async fn get(&self, url: &Url) -> Result<String> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        let status = resp.status();
        let resp = resp
            .error_for_status()
            .with_context(|| format!("{} answered {}", url, status))?;
        resp.text()
            .await
            .with_context(|| format!("reading body of {}", url))
    }
}

impl PageSource for HttpPage {
    async fn fetch_html(&mut self, url: &Url) -> Result<String> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            debug!(%url, attempt, "fetching page");
            match self.get(url).await {
                Ok(html) => return Ok(html),
                Err(e) if attempt < attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(%url, attempt, delay_ms = delay.as_millis() as u64, error = %e, "page fetch failed, retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(%url, attempts, error = %e, "page fetch failed");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_fails_after_configured_attempts() -> Result<()> {
        let wait = WaitPolicy {
            timeout_ms: 500,
            poll_interval_ms: 1,
            max_attempts: 2,
            backoff_ms: 1,
        };
        let mut page = HttpPage::new(&BrowserConfig::default(), &wait)?;
        // port 9 (discard) on loopback refuses the connection
        let url = Url::parse("http://127.0.0.1:9/exchange-volume.html")?;
        let err = page.fetch_html(&url).await.unwrap_err();
        assert!(format!("{:#}", err).contains("GET http://127.0.0.1:9/exchange-volume.html"));
        Ok(())
    }
}
